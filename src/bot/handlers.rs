use anyhow::Result;
use chrono::Utc;
use futures::StreamExt;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::GuildId,
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        session::{Playback, SkipOutcome},
        track::Requester,
    },
    bot::{playback::resolve_and_enqueue, MusicBot},
    error::{MusicError, SessionError},
    ui::{
        buttons::{self, button_ids},
        embeds,
        paginator::{PageTurn, QueuePaginator},
    },
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return respond(
            ctx,
            &command,
            embeds::create_error_embed("Sólo en servidores", "Usa los comandos dentro de un servidor"),
            true,
        )
        .await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await,
        "help" => respond(ctx, &command, embeds::create_help_embed(), true).await,
        _ => {
            respond(
                ctx,
                &command,
                embeds::create_error_embed("Comando no reconocido", &command.data.name),
                true,
            )
            .await
        }
    }
}

/// Maneja interacciones con componentes fuera de un colector
pub async fn handle_component(ctx: &Context, component: ComponentInteraction) -> Result<()> {
    match component.data.custom_id.as_str() {
        // Los atiende el colector de /queue mientras la vista está viva
        button_ids::QUEUE_PREVIOUS | button_ids::QUEUE_NEXT => {
            debug!("🔘 Botón de cola {} (colector)", component.data.custom_id);
        }
        other => {
            warn!("⚠️ Componente desconocido: {}", other);
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Acción no reconocida")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = match bot.ensure_voice(ctx, guild_id, command.user.id).await {
        Ok(_) => embeds::create_info_embed("Conectado", "🔊 Conectado al canal de voz"),
        Err(e) => embeds::create_error_embed("No me pude conectar", &e.to_string()),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = if bot.leave(guild_id).await {
        embeds::create_info_embed("Desconectado", "👋 Desconectado del canal de voz")
    } else {
        embeds::create_info_embed("Sin conexión", "No estoy en ningún canal de voz")
    };
    respond(ctx, command, embed, false).await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = bot.ensure_voice(ctx, guild_id, command.user.id).await {
        return edit(ctx, command, embeds::create_error_embed("No me pude conectar", &e.to_string()))
            .await;
    }

    let session = bot.registry().get_or_create(guild_id);
    let outcome = resolve_and_enqueue(bot.resolver(), &session, query, requester(command)).await;

    let embed = match outcome {
        Ok(outcome) => match &outcome.enqueued.playback {
            Playback::Started => embeds::create_now_playing_embed(&outcome.track, None),
            Playback::Queued => embeds::create_track_added_embed(
                &outcome.track,
                outcome.enqueued.position,
                outcome.upcoming,
                outcome.enqueued.estimated_secs,
            ),
            Playback::Failed(e) => embeds::create_error_embed(
                "No se pudo reproducir",
                &format!(
                    "{}\nSi la cola quedó detenida, usa `/skip` para pasar a la siguiente.",
                    MusicError::from(e.clone()).user_message()
                ),
            ),
        },
        Err(MusicError::Session(SessionError::Discarded)) => embeds::create_info_embed(
            "Búsqueda descartada",
            "La cola se limpió mientras buscaba la canción",
        ),
        Err(e) => embeds::create_error_embed("Error", &e.user_message()),
    };

    edit(ctx, command, embed).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let outcome = match bot.registry().get(guild_id) {
        Some(session) => session.skip().await?,
        None => SkipOutcome::NothingToSkip,
    };

    let embed = match outcome {
        SkipOutcome::Skipped(track) => {
            embeds::create_info_embed("Saltada", &format!("⏭️ {}", track.title()))
        }
        SkipOutcome::NothingToSkip => {
            embeds::create_info_embed("Nada que saltar", "No hay ninguna canción sonando")
        }
    };
    respond(ctx, command, embed, false).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Some(session) = bot.registry().get(guild_id) {
        session.stop_and_clear().await?;
    }

    respond(
        ctx,
        command,
        embeds::create_info_embed("Detenido", "⏹️ Reproducción detenida y cola limpiada"),
        true,
    )
    .await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let mode = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "mode")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or("off");

    let enabled = mode == "on";
    bot.registry().get_or_create(guild_id).set_loop(enabled).await?;

    let message = if enabled {
        "🔂 Repetir canción activado"
    } else {
        "➡️ Repetición desactivada"
    };
    respond(ctx, command, embeds::create_info_embed("Repetición", message), false).await
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let current = match bot.registry().get(guild_id) {
        Some(session) => match session.current_track().await {
            Ok(track) => Some((track, session.remaining_time(Utc::now()).await?)),
            Err(SessionError::EmptyQueue) => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let embed = match current {
        Some((track, remaining)) => embeds::create_now_playing_embed(&track, Some(remaining)),
        None => embeds::create_info_embed("Nada sonando", "No hay nada reproduciéndose actualmente"),
    };
    respond(ctx, command, embed, false).await
}

/// Muestra la cola paginada y atiende los botones hasta que la vista expira
async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &MusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = match bot.registry().get(guild_id) {
        Some(session) => Some(session.snapshot().await?),
        None => None,
    };
    let Some(snapshot) = snapshot.filter(|s| !s.is_empty()) else {
        return respond(
            ctx,
            command,
            embeds::create_info_embed("Cola vacía", "📭 La cola está vacía"),
            false,
        )
        .await;
    };

    let viewer = requester(command);
    let mut view = QueuePaginator::new(snapshot);
    let page = view.render(&viewer);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_queue_embed(&page))
                    .components(vec![buttons::create_pagination_controls(
                        page.has_previous,
                        page.has_next,
                    )]),
            ),
        )
        .await?;

    let message = command.get_response(&ctx.http).await?;
    let mut presses = message
        .await_component_interactions(&ctx.shard)
        .timeout(bot.config().queue_view_timeout)
        .stream();

    while let Some(press) = presses.next().await {
        let turn = match press.data.custom_id.as_str() {
            button_ids::QUEUE_NEXT => view.next(),
            button_ids::QUEUE_PREVIOUS => view.previous(),
            _ => continue,
        };

        let response = match turn {
            PageTurn::Rerender => {
                debug!("📄 Cola en página {}/{}", view.page() + 1, view.total_pages());
                let page = view.render(&viewer);
                CreateInteractionResponse::UpdateMessage(
                    CreateInteractionResponseMessage::new()
                        .embed(embeds::create_queue_embed(&page))
                        .components(vec![buttons::create_pagination_controls(
                            page.has_previous,
                            page.has_next,
                        )]),
                )
            }
            PageTurn::Unchanged => CreateInteractionResponse::Acknowledge,
        };

        if let Err(e) = press.create_response(&ctx.http, response).await {
            warn!("⚠️ No se pudo actualizar la vista de cola: {:?}", e);
        }
    }

    debug!("⌛ Vista de cola expirada en guild {}", guild_id);
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new()
                .components(vec![buttons::create_expired_pagination_controls()]),
        )
        .await?;

    Ok(())
}

// Funciones auxiliares

fn requester(command: &CommandInteraction) -> Requester {
    let name = command
        .member
        .as_ref()
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| command.user.display_name().to_string());

    match command.user.avatar_url() {
        Some(avatar) => Requester::new(name).with_avatar(avatar),
        None => Requester::new(name),
    }
}

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}
