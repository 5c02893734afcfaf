//! # Bot Module
//!
//! Capa de Discord de Cola Music.
//!
//! - Registro de comandos slash
//! - Conexiones de voz por guild ([`SongbirdTransport`])
//! - Eventos: ready, interacciones y cambios de estado de voz
//!
//! La lógica de reproducción vive en [`crate::audio`]; aquí sólo se traduce
//! cada comando en llamadas a la sesión del guild y se renderiza el resultado.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, UserId, VoiceState},
    async_trait,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod playback;

use crate::{
    audio::{registry::SessionRegistry, transport::SongbirdTransport},
    config::Config,
    error::TransportError,
    sources::TrackResolver,
};

/// Fallos al preparar la conexión de voz para un comando
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("Debes estar en un canal de voz")]
    NotInVoice,

    #[error("No encontré este servidor en la caché")]
    GuildUnavailable,

    #[error("Songbird no inicializado")]
    SongbirdMissing,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Main Discord bot handler for Cola Music.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, timeouts)
/// - `registry`: One playback session per guild
/// - `resolver`: Turns queries into tracks
/// - `voice`: Per-guild voice connections
pub struct MusicBot {
    config: Arc<Config>,
    registry: Arc<SessionRegistry>,
    resolver: Arc<dyn TrackResolver>,
    voice: DashMap<GuildId, Arc<SongbirdTransport>>,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<SessionRegistry>,
        resolver: Arc<dyn TrackResolver>,
    ) -> Self {
        Self {
            config,
            registry,
            resolver,
            voice: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> Arc<dyn TrackResolver> {
        self.resolver.clone()
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild-scoped when `GUILD_ID` is set (instant propagation), global otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Conexión de voz del guild, si existe
    pub fn voice(&self, guild_id: GuildId) -> Option<Arc<SongbirdTransport>> {
        self.voice.get(&guild_id).map(|v| v.clone())
    }

    /// Canal de voz del usuario, validando permisos y capacidad.
    ///
    /// Los checks se hacen con la caché antes de tocar songbird; la referencia
    /// al guild no puede cruzar un `.await`.
    fn check_voice_target(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        user_id: UserId,
        current: Option<ChannelId>,
    ) -> Result<ChannelId, VoiceError> {
        let guild = guild_id
            .to_guild_cached(&ctx.cache)
            .ok_or(VoiceError::GuildUnavailable)?;

        let channel_id = guild
            .voice_states
            .get(&user_id)
            .and_then(|voice_state| voice_state.channel_id)
            .ok_or(VoiceError::NotInVoice)?;

        if current == Some(channel_id) {
            return Ok(channel_id);
        }

        let bot_id = ctx.cache.current_user().id;
        let Some(channel) = guild.channels.get(&channel_id) else {
            return Ok(channel_id);
        };

        if let Some(member) = guild.members.get(&bot_id) {
            let permissions = guild.user_permissions_in(channel, member);
            if !(permissions.connect() && permissions.speak()) {
                return Err(TransportError::PermissionDenied.into());
            }
        }

        if let Some(limit) = channel.user_limit {
            let occupants = guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(channel_id) && vs.user_id != bot_id)
                .count();
            let limit = u32::from(limit);
            if limit > 0 && occupants as u64 >= u64::from(limit) {
                return Err(TransportError::ChannelFull.into());
            }
        }

        Ok(channel_id)
    }

    /// Se asegura de que el bot esté en el canal de voz del usuario.
    ///
    /// Conecta si no hay conexión y se mueve si está en otro canal. Cada
    /// conexión nueva se entrega a la sesión del guild.
    pub async fn ensure_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        user_id: UserId,
    ) -> Result<Arc<SongbirdTransport>, VoiceError> {
        let existing = self.voice(guild_id);
        let current = match &existing {
            Some(transport) => transport.current_channel().await,
            None => None,
        };

        let channel_id = self.check_voice_target(ctx, guild_id, user_id, current)?;

        if let (Some(transport), Some(current)) = (existing, current) {
            if current == channel_id {
                debug!("🔊 Ya conectado al canal {} en guild {}", channel_id, guild_id);
                return Ok(transport);
            }
        }

        let manager = songbird::get(ctx).await.ok_or(VoiceError::SongbirdMissing)?;
        let transport = Arc::new(
            SongbirdTransport::connect(manager, guild_id, channel_id, self.config.default_volume)
                .await?,
        );
        self.voice.insert(guild_id, transport.clone());

        let session = self.registry.get_or_create(guild_id);
        if let Err(e) = session.attach_transport(transport.clone()).await {
            warn!("⚠️ No se pudo entregar la conexión a la sesión de {}: {}", guild_id, e);
        }

        Ok(transport)
    }

    /// Termina la sesión y sale del canal de voz. Devuelve si había conexión.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        self.registry.remove(guild_id).await;

        let Some((_, transport)) = self.voice.remove(&guild_id) else {
            return false;
        };
        if let Err(e) = transport.disconnect().await {
            warn!("⚠️ Error al salir del canal de voz en {}: {}", guild_id, e);
        }
        true
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Cleans up the guild session when the bot itself gets disconnected.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.leave(guild_id).await;
        }
    }
}
