//! # Bot Module
//!
//! Thin serenity layer over the audio core. It registers the slash
//! commands, keeps one [`AudioPlayer`] per guild and turns interactions into
//! player calls.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, info_span, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{player::AudioPlayer, sink::Sink, transcode::Transcoder},
    config::Config,
    sources::SourceResolver,
};

/// Main Discord bot handler.
///
/// Owns the shared audio components and the per-guild players built from
/// them. Players are created lazily on the first command of a guild.
pub struct TuneboxBot {
    config: Arc<Config>,
    sink: Arc<dyn Sink>,
    transcoder: Arc<dyn Transcoder>,
    resolver: Arc<dyn SourceResolver>,
    players: DashMap<GuildId, AudioPlayer>,
}

impl TuneboxBot {
    pub fn new(
        config: Config,
        sink: Arc<dyn Sink>,
        transcoder: Arc<dyn Transcoder>,
        resolver: Arc<dyn SourceResolver>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            sink,
            transcoder,
            resolver,
            players: DashMap::new(),
        }
    }

    /// Player de la guild, creado si no existe
    pub fn player(&self, guild_id: GuildId) -> AudioPlayer {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                info!("🎛️ Creando player para guild {}", guild_id);
                AudioPlayer::spawn(
                    self.config.player_config(),
                    self.sink.clone(),
                    self.transcoder.clone(),
                    self.resolver.clone(),
                    info_span!("player", guild = %guild_id),
                )
            })
            .clone()
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands go to a single guild when `GUILD_ID` is set (instant
    /// propagation, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Desconecta todos los players
    pub async fn shutdown(&self) {
        let players: Vec<AudioPlayer> = self.players.iter().map(|p| p.value().clone()).collect();
        for player in players {
            if let Err(e) = player.disconnect().await {
                warn!("Error al desconectar player: {}", e);
            }
        }
        self.players.clear();
    }
}

#[async_trait]
impl EventHandler for TuneboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Sincroniza el player cuando alguien saca al bot del canal.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };
        info!("🔌 Bot desconectado en guild {}", guild_id);

        let player = self.players.get(&guild_id).map(|p| p.value().clone());
        if let Some(player) = player {
            if let Err(e) = player.disconnect().await {
                error!("Error al detener reproducción: {:?}", e);
            }
        }
    }
}
