use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::{effects::AudioFilter, radio::RadioStation};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        playcustom_command(),
        radio_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        seek_command(),
        shuffle_command(),
        clear_command(),
        remove_command(),
        queue_command(),
        np_command(),
        join_command(),
        leave_command(),
        shutdown_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn force_option() -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::Boolean,
        "next",
        "Reproducir a continuación en vez de al final de la cola",
    )
}

fn volume_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Integer, "volume", "Volumen (1-200%)")
        .min_int_value(1)
        .max_int_value(200)
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    let mut filter = CreateCommandOption::new(CommandOptionType::String, "filter", "Filtro de audio");
    for audio_filter in AudioFilter::ALL {
        filter = filter.add_string_choice(audio_filter.to_string(), audio_filter.key());
    }

    CreateCommand::new("play")
        .description("Reproduce una canción, playlist o búsqueda de YouTube")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "URL o término de búsqueda")
                .required(true),
        )
        .add_option(force_option())
        .add_option(filter)
        .add_option(volume_option())
}

fn playcustom_command() -> CreateCommand {
    CreateCommand::new("playcustom")
        .description("Reproduce un archivo o URL de audio directo")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL o ruta del audio")
                .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "title",
            "Título a mostrar",
        ))
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "duration",
                "Duración (HH:MM:SS); vacío para audio en vivo",
            ),
        )
        .add_option(force_option())
        .add_option(volume_option())
}

fn radio_command() -> CreateCommand {
    let mut station = CreateCommandOption::new(CommandOptionType::String, "station", "Estación").required(true);
    for radio in RadioStation::ALL {
        station = station.add_string_choice(radio.name(), radio.key());
    }

    CreateCommand::new("radio")
        .description("Reproduce una estación de radio en vivo")
        .add_option(station)
        .add_option(force_option())
}

// Comandos de control

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a una posición de la canción actual")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "position",
                "Posición (HH:MM:SS, MM:SS, segundos o 1m30s)",
            )
            .required(true),
        )
}

// Comandos de cola

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Página de la cola").min_int_value(1),
        )
}

fn np_command() -> CreateCommand {
    CreateCommand::new("np").description("Muestra la canción actual")
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Une el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

fn shutdown_command() -> CreateCommand {
    CreateCommand::new("shutdown").description("Limpia la cola y desconecta el bot")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_is_registered() {
        let names: Vec<String> = all_commands()
            .iter()
            .map(|c| serde_json::to_value(c).unwrap()["name"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "play", "playcustom", "radio", "skip", "pause", "resume", "seek", "shuffle", "clear",
                "remove", "queue", "np", "join", "leave", "shutdown"
            ]
        );
    }
}
