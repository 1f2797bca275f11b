use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    audio::{
        effects::AudioFilter,
        error::PlayerError,
        item::{format_timestamp, TrackDuration},
        player::{AudioPlayer, Placement, PlayRequest},
        radio::RadioStation,
        sink::Destination,
    },
    bot::TuneboxBot,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &TuneboxBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let player = bot.player(guild_id);
    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, guild_id, &player).await?,
        "playcustom" => handle_playcustom(ctx, &command, guild_id, &player).await?,
        "radio" => handle_radio(ctx, &command, guild_id, &player).await?,
        "skip" => {
            let reply = outcome(player.skip().await, "⏭️ Saltado");
            respond(ctx, &command, reply).await?
        }
        "pause" => {
            let reply = outcome(player.pause().await, "⏸️ Reproducción pausada");
            respond(ctx, &command, reply).await?
        }
        "resume" => {
            let reply = outcome(player.resume().await, "▶️ Reproducción reanudada");
            respond(ctx, &command, reply).await?
        }
        "seek" => handle_seek(ctx, &command, &player).await?,
        "shuffle" => {
            let reply = match player.shuffle().await {
                Ok(0) => Reply::error("La cola está vacía"),
                Ok(count) => Reply::ok(format!("🔀 {} canciones mezcladas", count)),
                Err(e) => Reply::error(describe(&e)),
            };
            respond(ctx, &command, reply).await?
        }
        "clear" => {
            let reply = match player.clear().await {
                Ok(count) => Reply::ok(format!("🗑️ {} canciones quitadas de la cola", count)),
                Err(e) => Reply::error(describe(&e)),
            };
            respond(ctx, &command, reply).await?
        }
        "remove" => handle_remove(ctx, &command, &player).await?,
        "queue" => handle_queue(ctx, &command, &player).await?,
        "np" => handle_now_playing(ctx, &command, &player).await?,
        "join" => {
            let reply = match connect(ctx, &command, guild_id, &player).await {
                Ok(()) => Reply::ok("🔊 Conectado"),
                Err(e) => Reply::error(e.to_string()),
            };
            respond(ctx, &command, reply).await?
        }
        "leave" => {
            let reply = match player.disconnect().await {
                Ok(true) => Reply::ok("👋 Desconectado, la cola se conserva"),
                Ok(false) => Reply::error("No estoy en un canal de voz"),
                Err(e) => Reply::error(describe(&e)),
            };
            respond(ctx, &command, reply).await?
        }
        "shutdown" => {
            let reply = match player.shutdown().await {
                Ok(cleared) => Reply::ok(format!("🛑 Apagando... {} canciones descartadas", cleared)),
                Err(e) => Reply::error(describe(&e)),
            };
            respond(ctx, &command, reply).await?
        }
        _ => respond(ctx, &command, Reply::error("Comando no reconocido")).await?,
    }

    Ok(())
}

/// Respuesta simple a un comando.
struct Reply {
    content: String,
    ephemeral: bool,
}

impl Reply {
    fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    fn error(content: impl Into<String>) -> Self {
        Self {
            content: format!("❌ {}", content.into()),
            ephemeral: true,
        }
    }
}

fn outcome(result: Result<(), PlayerError>, success: &str) -> Reply {
    match result {
        Ok(()) => Reply::ok(success),
        Err(e) => Reply::error(describe(&e)),
    }
}

/// Texto para el usuario según el error del player
fn describe(error: &PlayerError) -> String {
    match error {
        PlayerError::ConnectionFailure(_) => "No pude conectarme al canal de voz".into(),
        PlayerError::PipelineFailure(_) => "No se pudo reproducir el audio".into(),
        PlayerError::InvalidOperation("nothing is playing") => "No hay nada reproduciéndose".into(),
        PlayerError::InvalidOperation("already paused") => "Ya está en pausa".into(),
        PlayerError::InvalidOperation("not paused") => "No está en pausa".into(),
        PlayerError::InvalidOperation("not connected to a voice channel") => {
            "No estoy en un canal de voz, usa `/join`".into()
        }
        PlayerError::InvalidOperation("live streams cannot seek") => "No se puede adelantar una transmisión en vivo".into(),
        PlayerError::InvalidOperation("position is past the end of the track") => {
            "La posición está después del final".into()
        }
        PlayerError::InvalidOperation("the queue is full") => "La cola está llena".into(),
        PlayerError::InvalidOperation(other) => format!("Operación inválida: {}", other),
        PlayerError::ResolveFailure(_) => "No se encontraron resultados".into(),
        PlayerError::Closed => "El reproductor no está disponible".into(),
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, reply: Reply) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(reply.content)
                    .ephemeral(reply.ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, response: EditInteractionResponse) -> Result<()> {
    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn option_bool(command: &CommandInteraction, name: &str) -> bool {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
        .unwrap_or(false)
}

fn volume_percent(command: &CommandInteraction) -> Option<u16> {
    option_i64(command, "volume").and_then(|v| u16::try_from(v).ok())
}

/// Conecta al canal de voz del usuario
async fn connect(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, player: &AudioPlayer) -> Result<()> {
    let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    player
        .connect(Destination { guild_id, channel_id })
        .await
        .map_err(|e| {
            warn!("Error al conectar en guild {}: {}", guild_id, e);
            anyhow::anyhow!(describe(&e))
        })
}

async fn handle_play(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, player: &AudioPlayer) -> Result<()> {
    let query = option_str(command, "query").ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;
    let filters = match option_str(command, "filter") {
        Some(key) => vec![key.parse::<AudioFilter>()?],
        None => Vec::new(),
    };
    let request = PlayRequest {
        filters,
        force_play_next: option_bool(command, "next"),
        volume_percent: volume_percent(command),
    };

    // Defer la respuesta ya que puede tomar tiempo
    defer(ctx, command).await?;

    if let Err(e) = connect(ctx, command, guild_id, player).await {
        return edit(ctx, command, EditInteractionResponse::new().content(format!("❌ {}", e))).await;
    }

    match player.play(query, request).await {
        Ok(reports) => {
            edit(
                ctx,
                command,
                EditInteractionResponse::new().embed(embeds::create_added_embed(&reports)),
            )
            .await
        }
        Err(e) => {
            edit(
                ctx,
                command,
                EditInteractionResponse::new().embed(embeds::create_error_embed("Error", &describe(&e))),
            )
            .await
        }
    }
}

async fn handle_playcustom(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    player: &AudioPlayer,
) -> Result<()> {
    let url = option_str(command, "url").ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?;
    let title = option_str(command, "title").unwrap_or(url);
    let duration = match option_str(command, "duration") {
        Some(text) => match parse_position(text) {
            Some(duration) => TrackDuration::Finite(duration),
            None => return respond(ctx, command, Reply::error("Duración inválida")).await,
        },
        None => TrackDuration::Unbounded,
    };

    defer(ctx, command).await?;
    if let Err(e) = connect(ctx, command, guild_id, player).await {
        return edit(ctx, command, EditInteractionResponse::new().content(format!("❌ {}", e))).await;
    }

    let result = player
        .play_custom(url, title, duration, option_bool(command, "next"), volume_percent(command))
        .await;
    edit(ctx, command, EditInteractionResponse::new().content(placement_message(title, result))).await
}

async fn handle_radio(ctx: &Context, command: &CommandInteraction, guild_id: GuildId, player: &AudioPlayer) -> Result<()> {
    let station: RadioStation = option_str(command, "station")
        .ok_or_else(|| anyhow::anyhow!("Estación no proporcionada"))?
        .parse()?;

    defer(ctx, command).await?;
    if let Err(e) = connect(ctx, command, guild_id, player).await {
        return edit(ctx, command, EditInteractionResponse::new().content(format!("❌ {}", e))).await;
    }

    let result = player.play_radio(station, option_bool(command, "next")).await;
    edit(
        ctx,
        command,
        EditInteractionResponse::new().content(placement_message(&format!("📻 {}", station), result)),
    )
    .await
}

fn placement_message(title: &str, result: Result<Placement, PlayerError>) -> String {
    match result {
        Ok(Placement::PlayingNow) => format!("▶️ Reproduciendo **{}**", title),
        Ok(Placement::Queued { position }) => format!("✅ **{}** agregado en la posición #{}", title, position),
        Err(e) => format!("❌ {}", describe(&e)),
    }
}

async fn handle_seek(ctx: &Context, command: &CommandInteraction, player: &AudioPlayer) -> Result<()> {
    let Some(position) = option_str(command, "position").and_then(parse_position) else {
        return respond(ctx, command, Reply::error("Posición inválida")).await;
    };

    let reply = outcome(
        player.seek(position).await,
        &format!("⏩ Saltando a {}", format_timestamp(position)),
    );
    respond(ctx, command, reply).await
}

async fn handle_remove(ctx: &Context, command: &CommandInteraction, player: &AudioPlayer) -> Result<()> {
    let position = option_i64(command, "position")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(0);

    let reply = match player.remove(position).await {
        Ok(Some(item)) => Reply::ok(format!("🗑️ Quitado: **{}**", item.title())),
        Ok(None) => Reply::error(format!("No hay nada en la posición {}", position)),
        Err(e) => Reply::error(describe(&e)),
    };
    respond(ctx, command, reply).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, player: &AudioPlayer) -> Result<()> {
    let page = option_i64(command, "page")
        .and_then(|p| usize::try_from(p).ok())
        .unwrap_or(1);

    let snapshot = match player.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => return respond(ctx, command, Reply::error(describe(&e))).await,
    };

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().embed(embeds::create_queue_embed(&snapshot, page)),
            ),
        )
        .await?;
    Ok(())
}

async fn handle_now_playing(ctx: &Context, command: &CommandInteraction, player: &AudioPlayer) -> Result<()> {
    let snapshot = match player.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => return respond(ctx, command, Reply::error(describe(&e))).await,
    };
    let Some(item) = &snapshot.now_playing else {
        return respond(ctx, command, Reply::error("No hay nada reproduciéndose")).await;
    };

    let embed = embeds::create_now_playing_embed(item, snapshot.elapsed, snapshot.is_paused());
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

/// Acepta `HH:MM:SS`, `MM:SS`, segundos sueltos o formato humantime (`1m30s`).
pub fn parse_position(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.contains(':') {
        let parts: Vec<u64> = text
            .split(':')
            .map(|part| part.trim().parse::<u64>().ok())
            .collect::<Option<_>>()?;
        if parts.len() > 3 || parts.iter().skip(1).any(|p| *p >= 60) {
            return None;
        }
        let secs = parts
            .iter()
            .try_fold(0u64, |acc, part| acc.checked_mul(60)?.checked_add(*part))?;
        return Some(Duration::from_secs(secs));
    }

    if let Ok(secs) = text.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    humantime::parse_duration(text).ok()
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
