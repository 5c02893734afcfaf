use dashmap::DashMap;
use serenity::model::id::GuildId;
use tracing::{debug, info, warn};

use crate::audio::session::PlaybackSession;

/// Sesiones de reproducción activas, una por guild.
///
/// Las sesiones se crean al primer uso y sólo se destruyen con
/// [`SessionRegistry::remove`] (stop + salir del canal, o desconexión).
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, PlaybackSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Devuelve la sesión del guild, creándola si no existe
    pub fn get_or_create(&self, guild_id: GuildId) -> PlaybackSession {
        let mut entry = self
            .sessions
            .entry(guild_id)
            .or_insert_with(|| PlaybackSession::spawn(guild_id));

        // Una sesión cuya tarea murió se reemplaza
        if entry.is_closed() {
            warn!("♻️ Sesión cerrada en guild {}, creando una nueva", guild_id);
            *entry = PlaybackSession::spawn(guild_id);
        }

        entry.clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<PlaybackSession> {
        self.sessions
            .get(&guild_id)
            .map(|s| s.clone())
            .filter(|s| !s.is_closed())
    }

    /// Detiene y elimina la sesión del guild. Devuelve si existía.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            debug!("No hay sesión que eliminar en guild {}", guild_id);
            return false;
        };

        if let Err(e) = session.shutdown().await {
            debug!("La sesión de guild {} ya estaba cerrada: {}", guild_id, e);
        }
        info!("🗑️ Sesión eliminada en guild {}", guild_id);
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cierra todas las sesiones (apagado del bot)
    pub async fn shutdown_all(&self) {
        if self.is_empty() {
            return;
        }
        info!("🛑 Cerrando {} sesiones", self.len());
        let guilds: Vec<GuildId> = self.sessions.iter().map(|e| *e.key()).collect();
        for guild_id in guilds {
            self.remove(guild_id).await;
        }
    }
}
