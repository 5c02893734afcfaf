use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::track::{format_duration_secs, Platform, Requester, Track},
    ui::paginator::QueuePage,
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

/// Footer estandarizado para los embeds sin solicitante
const STANDARD_FOOTER: &str = "🎵 Cola Music";

fn requester_footer(requester: &Requester) -> CreateEmbedFooter {
    let footer = CreateEmbedFooter::new(format!("Solicitado por {}", requester.display_name));
    match &requester.avatar_url {
        Some(avatar) => footer.icon_url(avatar),
        None => footer,
    }
}

/// Título en negrita, enlazado si la pista tiene URL
fn linked_title(track: &Track) -> String {
    match track.source_url() {
        Some(url) => format!("[**{}**]({})", track.title(), url),
        None => format!("**{}**", track.title()),
    }
}

/// Emoji de la plataforma; un enlace de Spotify manda sobre lo resuelto
fn platform_emoji(track: &Track) -> &'static str {
    let is_spotify_link = track
        .source_url()
        .is_some_and(|url| url.to_lowercase().contains("spotify.com"));
    if is_spotify_link {
        Platform::Spotify.emoji()
    } else {
        track.platform().emoji()
    }
}

/// Crea un embed para la canción que empieza a sonar
pub fn create_now_playing_embed(track: &Track, remaining_secs: Option<u64>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("{} Reproduciendo Ahora", platform_emoji(track)))
        .description(linked_title(track))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", format_duration_secs(track.duration_secs()), true)
        .field("🔗 Fuente", track.platform().to_string(), true);

    if let Some(remaining) = remaining_secs {
        embed = embed.field("⏳ Restante", format_duration_secs(remaining), true);
    }

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(requester_footer(track.requested_by()))
}

/// Crea un embed para una canción que quedó en cola
pub fn create_track_added_embed(
    track: &Track,
    position: usize,
    upcoming: usize,
    estimated_secs: u64,
) -> CreateEmbed {
    let details = format!(
        "**Duración:** {}\n\
        **Tiempo estimado:** {}\n\
        **Antes en la cola:** {} canción(es)\n\
        **Posición:** {}",
        format_duration_secs(track.duration_secs()),
        format_duration_secs(estimated_secs),
        upcoming,
        position
    );

    let mut embed = CreateEmbed::default()
        .title(format!("{} Canción Agregada a la Cola", platform_emoji(track)))
        .description(linked_title(track))
        .color(colors::INFO_BLUE)
        .field("\u{200b}", details, false);

    if let Some(thumbnail) = track.thumbnail_url() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(requester_footer(track.requested_by()))
}

/// Convierte una página de la vista de cola en embed
pub fn create_queue_embed(page: &QueuePage) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(&page.title)
        .description(&page.description)
        .color(colors::MUSIC_PURPLE);

    for entry in &page.entries {
        let link = entry
            .url
            .as_ref()
            .map(|url| format!("🔗 [Enlace]({})\n", url))
            .unwrap_or_default();
        embed = embed.field(
            format!("{}. {}", entry.position, entry.title),
            format!(
                "{}Plataforma: {}\nDuración: {}\nEstimado: {}",
                link, entry.platform, entry.duration, entry.estimated
            ),
            false,
        );
    }

    let mut footer = CreateEmbedFooter::new(&page.footer);
    if let Some(icon) = &page.footer_icon {
        footer = footer.icon_url(icon);
    }
    embed.footer(footer)
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Cola Music - Ayuda")
        .description("Bot de música para canales de voz")
        .color(colors::INFO_BLUE)
        .field(
            "🎶 Reproducción",
            "`/play <búsqueda o URL>` - Reproduce o agrega a la cola\n\
            `/skip` - Salta la canción actual\n\
            `/stop` - Detiene y limpia la cola\n\
            `/loop <on|off>` - Repite la canción actual",
            false,
        )
        .field(
            "📋 Cola",
            "`/queue` - Muestra la cola con paginación\n\
            `/nowplaying` - Muestra la canción actual",
            false,
        )
        .field(
            "🔊 Voz",
            "`/join` - Entra a tu canal de voz\n\
            `/leave` - Sale del canal de voz",
            false,
        )
        .field(
            "🎵 Fuentes Soportadas",
            "• YouTube (enlaces y búsquedas)\n\
            • Spotify (enlaces de canciones)",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed informativo (cola vacía, nada que saltar...)
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}
