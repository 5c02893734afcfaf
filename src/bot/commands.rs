use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot
fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        skip_command(),
        stop_command(),
        loop_command(),
        queue_command(),
        nowplaying_command(),
        help_command(),
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

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la agrega a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL de YouTube/Spotify o término de búsqueda",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Repite la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Activar", "on")
                .add_string_choice("Desactivar", "off")
                .required(true),
        )
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

// Comandos de voz

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra información de ayuda")
}
