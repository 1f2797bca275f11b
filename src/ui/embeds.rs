use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    item::{format_timestamp, PlayableItem},
    player::{Placement, PlayReport, PlayerSnapshot},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Tunebox";

const ITEMS_PER_PAGE: usize = 10;

/// Crea un embed para la canción actual
pub fn create_now_playing_embed(item: &PlayableItem, elapsed: Option<Duration>, paused: bool) -> CreateEmbed {
    let progress = match (elapsed, item.duration().finite()) {
        (Some(elapsed), Some(total)) => format!("{} / {}", format_timestamp(elapsed), format_timestamp(total)),
        (Some(elapsed), None) => format!("{} / ∞", format_timestamp(elapsed)),
        (None, _) => format!("⏳ Cargando / {}", item.duration()),
    };

    let mut embed = CreateEmbed::default()
        .title(if paused { "⏸️ En Pausa" } else { "🎵 Reproduciendo Ahora" })
        .description(format!("**{}**", item.title()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Progreso", progress, true);

    if item.is_live() {
        embed = embed.field("📡 Fuente", "🔴 En vivo", true);
    }

    let filters = &item.options().filters;
    if !filters.is_empty() {
        let names: Vec<String> = filters.iter().map(|f| f.to_string()).collect();
        embed = embed.field("🎛️ Filtros", names.join(", "), true);
    }

    if let Some(thumbnail) = item.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para items agregados con `/play`
pub fn create_added_embed(reports: &[PlayReport]) -> CreateEmbed {
    let Some(first) = reports.first() else {
        return create_error_embed("Sin resultados", "No se agregó nada a la cola");
    };

    let placement = |report: &PlayReport| match report.placement {
        Placement::PlayingNow => "▶️ Reproduciendo ahora".to_string(),
        Placement::Queued { position } => format!("#{} en la cola", position),
    };

    let mut embed = if reports.len() == 1 {
        CreateEmbed::default()
            .title("✅ Agregado")
            .description(format!("**{}**", first.title))
            .field("⏱️ Duración", first.duration.to_string(), true)
            .field("📋 Posición", placement(first), true)
    } else {
        let total: Duration = reports.iter().filter_map(|r| r.duration.finite()).sum();
        CreateEmbed::default()
            .title("✅ Playlist agregada")
            .description(format!("**{}** canciones, empezando por **{}**", reports.len(), first.title))
            .field("⏱️ Duración total", format_timestamp(total), true)
            .field("📋 Primera", placement(first), true)
    };

    if let Some(thumbnail) = &first.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con la cola
pub fn create_queue_embed(snapshot: &PlayerSnapshot, page: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.now_playing.is_none() && snapshot.queue.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.now_playing {
        let status = if snapshot.is_paused() { "⏸️" } else { "▶️" };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!("**{}** `[{}]`", current.title(), current.duration()),
            false,
        );
    }

    let pages = snapshot.queue.len().div_ceil(ITEMS_PER_PAGE).max(1);
    let page = page.clamp(1, pages);
    let start = (page - 1) * ITEMS_PER_PAGE;

    if !snapshot.queue.is_empty() {
        let mut description = String::new();
        for (i, item) in snapshot.queue.iter().enumerate().skip(start).take(ITEMS_PER_PAGE) {
            description.push_str(&format!("**{}**. {} `[{}]`\n", i + 1, item.title(), item.duration()));
        }
        embed = embed.field("⏭️ Siguientes", description, false);
    }

    embed
        .field("📊 Total", format!("{} en cola", snapshot.queue.len()), true)
        .field("⌛ Termina en", queue_end_label(snapshot), true)
        .footer(CreateEmbedFooter::new(format!(
            "{} • Página {}/{}",
            STANDARD_FOOTER, page, pages
        )))
        .timestamp(Timestamp::now())
}

/// Tiempo restante de la cola. A live item, playing or queued, means it never ends.
fn queue_end_label(snapshot: &PlayerSnapshot) -> String {
    match snapshot.queue_end_time {
        Some(_) if snapshot.queue_has_live => "∞ (radio en cola)".to_string(),
        Some(end) => format_timestamp(end),
        None => "∞".to_string(),
    }
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        item::{CustomAudio, TrackDuration, TranscodeOptions},
        player::{ConnectionState, PlaybackState},
        radio::RadioStation,
    };
    use pretty_assertions::assert_eq;

    fn song(title: &str, secs: u64) -> PlayableItem {
        PlayableItem::CustomAudio(CustomAudio {
            locator: format!("/music/{}.mp3", title),
            title: title.to_string(),
            duration: TrackDuration::Finite(Duration::from_secs(secs)),
            options: TranscodeOptions::default(),
        })
    }

    fn snapshot(now_playing: PlayableItem, queue: Vec<PlayableItem>, end: Option<u64>) -> PlayerSnapshot {
        PlayerSnapshot {
            connection: ConnectionState::Connected,
            state: PlaybackState::Playing,
            queue_has_live: queue.iter().any(PlayableItem::is_live),
            now_playing: Some(now_playing),
            queue,
            elapsed: Some(Duration::ZERO),
            queue_end_time: end.map(Duration::from_secs),
        }
    }

    #[test]
    fn finite_queue_shows_its_end_time() {
        let snap = snapshot(song("a", 180), vec![song("b", 240)], Some(420));
        assert_eq!(queue_end_label(&snap), "00:07:00");
    }

    #[test]
    fn queued_radio_makes_the_queue_endless() {
        let snap = snapshot(
            song("a", 180),
            vec![song("b", 240), RadioStation::M1.to_item()],
            Some(420),
        );
        assert_eq!(queue_end_label(&snap), "∞ (radio en cola)");
    }

    #[test]
    fn playing_radio_has_no_end_time() {
        let snap = snapshot(RadioStation::PowerHitRadio.to_item(), vec![song("b", 240)], None);
        assert_eq!(queue_end_label(&snap), "∞");
    }
}
