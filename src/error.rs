//! Errores tipados del reproductor.
//!
//! El núcleo (sesión, transporte, resolvedores) devuelve estos tipos; la capa
//! de comandos los convierte en mensajes para el usuario con `anyhow`.

use thiserror::Error;

/// Fallos al convertir una consulta del usuario en un [`Track`](crate::audio::track::Track).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no se encontraron resultados para `{0}`")]
    NotFound(String),

    #[error("la búsqueda tardó demasiado")]
    Timeout,

    #[error("URL inválida: {0}")]
    MalformedUrl(String),

    /// El backend no está disponible (yt-dlp ausente, credenciales sin configurar, HTTP caído)
    #[error("fuente no disponible: {0}")]
    Unavailable(String),
}

/// Fallos del transporte de voz.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("sin permisos para conectar o hablar en el canal")]
    PermissionDenied,

    #[error("el canal de voz está lleno")]
    ChannelFull,

    #[error("error de red: {0}")]
    Network(String),

    #[error("no se pudo abrir el stream: {0}")]
    UnreachableStream(String),

    #[error("ya hay una pista reproduciéndose")]
    AlreadyPlaying,

    #[error("no hay conexión de voz activa")]
    NotConnected,
}

/// Condiciones informativas de la sesión. Ninguna es fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("la cola está vacía")]
    EmptyQueue,

    #[error("la sesión ya no está activa")]
    Closed,

    /// La cola se limpió mientras se resolvía la pista
    #[error("la pista se descartó porque la cola fue limpiada")]
    Discarded,
}

#[derive(Debug, Error)]
pub enum MusicError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl MusicError {
    /// Mensaje corto para mostrar en Discord
    pub fn user_message(&self) -> String {
        match self {
            Self::Resolution(e) => format!("❌ No se pudo encontrar la canción: {}", e),
            Self::Transport(e) => format!("❌ No se pudo reproducir: {}", e),
            Self::Session(SessionError::EmptyQueue) => "📭 La cola está vacía".to_string(),
            Self::Session(e) => format!("ℹ️ {}", e),
        }
    }
}
