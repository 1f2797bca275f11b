use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{songbird_sink::SongbirdSink, transcode::FfmpegTranscoder};
use crate::bot::TuneboxBot;
use crate::config::Config;
use crate::sources::{SponsorBlockClient, YtDlpProvider, YtDlpResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tunebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Tunebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Componentes de audio compartidos por todas las guilds
    let songbird = Songbird::serenity();
    let sink = Arc::new(SongbirdSink::new(songbird.clone(), config.voice_connect_timeout()));
    let provider = Arc::new(YtDlpProvider::new(config.ytdlp_path.clone()));
    let transcoder = Arc::new(FfmpegTranscoder::new(config.transcode_config(), provider));
    let sponsorblock = config
        .enable_sponsorblock
        .then(|| SponsorBlockClient::new(reqwest::Client::new()));
    let resolver = Arc::new(YtDlpResolver::new(
        config.ytdlp_path.clone(),
        config.playlist_limit,
        sponsorblock,
    ));

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = Arc::new(TuneboxBot::new(config.clone(), sink, transcoder, resolver));

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler_arc(handler.clone())
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let bot = handler.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        bot.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = tokio::process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = tokio::process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
