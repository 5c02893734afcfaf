//! # Audio Module
//!
//! Reproducción por servidor para Cola Music.
//!
//! ## Architecture
//!
//! ### [`session`] - Playback Session
//! - Un actor por servidor: una tarea dueña de la cola y del estado
//! - Los comandos y los avisos de fin de pista llegan por el mismo buzón
//! - Estados Idle, Playing y Stalled
//!
//! ### [`registry`] - Session Registry
//! - Una sesión por servidor, creada al primer uso
//!
//! ### [`transport`] - Voice Transport
//! - Frontera con el canal de voz (songbird)
//! - Aviso de fin de pista que se entrega una sola vez
//!
//! ### [`track`] - Track
//! - Metadata de la pista y formato de duraciones
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cola_music::audio::{registry::SessionRegistry, track::{Platform, Requester, Track}};
//! use serenity::all::GuildId;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = SessionRegistry::new();
//! let session = registry.get_or_create(GuildId::new(123456789));
//!
//! let track = Track::new("Song", Platform::YouTube, Requester::new("ana"))
//!     .with_stream_locator("https://example.com/song.webm");
//! let enqueued = session.enqueue(track).await?;
//! println!("posición {}", enqueued.position);
//! # Ok(())
//! # }
//! ```

pub mod registry;
pub mod session;
pub mod track;
pub mod transport;
