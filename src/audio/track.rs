use std::fmt;

use serde::{Deserialize, Serialize};

/// Plataforma de origen de una pista
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    Spotify,
    Unknown,
}

impl Platform {
    pub fn emoji(&self) -> &'static str {
        match self {
            Platform::YouTube => "▶️",
            Platform::Spotify => "🟢",
            Platform::Unknown => "🎵",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::YouTube => write!(f, "YouTube"),
            Platform::Spotify => write!(f, "Spotify"),
            Platform::Unknown => write!(f, "N/A"),
        }
    }
}

/// Usuario que pidió la pista
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Requester {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }
}

/// Metadata resuelta de una pista. Inmutable una vez creada.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    title: String,
    platform: Platform,
    duration_secs: u64,
    stream_locator: Option<String>,
    source_url: Option<String>,
    thumbnail_url: Option<String>,
    requested_by: Requester,
}

impl Track {
    pub fn new(title: impl Into<String>, platform: Platform, requested_by: Requester) -> Self {
        Self {
            title: title.into(),
            platform,
            duration_secs: 0,
            stream_locator: None,
            source_url: None,
            thumbnail_url: None,
            requested_by,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn platform(&self) -> Platform {
        self.platform
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
    pub fn stream_locator(&self) -> Option<&str> {
        self.stream_locator.as_deref()
    }
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }
    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnail_url.as_deref()
    }
    pub fn requested_by(&self) -> &Requester {
        &self.requested_by
    }

    // Builders
    pub fn with_duration_secs(mut self, duration_secs: u64) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn with_stream_locator(mut self, locator: impl Into<String>) -> Self {
        self.stream_locator = Some(locator.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_thumbnail_url(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }

    /// Locator utilizable por el transporte, si existe y no está vacío
    pub fn playable_locator(&self) -> Option<&str> {
        self.stream_locator
            .as_deref()
            .map(str::trim)
            .filter(|locator| !locator.is_empty())
    }

    pub fn is_playable(&self) -> bool {
        self.playable_locator().is_some()
    }
}

/// Normaliza una duración textual a segundos.
///
/// Acepta `"215"`, `"215 sec"`, `"MM:SS"` y `"H:MM:SS"`. Devuelve `None`
/// si el formato no se reconoce; quien llama decide el valor por defecto.
pub fn parse_duration_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(secs) = raw.strip_suffix("sec") {
        return secs.trim().parse().ok();
    }

    let parts = raw
        .split(':')
        .map(|p| p.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    match parts.as_slice() {
        [secs] => Some(*secs),
        [m, s] if *s < 60 => Some(m * 60 + s),
        [h, m, s] if *m < 60 && *s < 60 => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

/// Formatea segundos como `MM:SS`, o `H:MM:SS` a partir de una hora
pub fn format_duration_secs(total: u64) -> String {
    let (minutes, seconds) = (total / 60, total % 60);
    if minutes >= 60 {
        format!("{}:{:02}:{:02}", minutes / 60, minutes % 60, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
