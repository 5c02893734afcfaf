use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::TransportError;

/// Transporte de audio hacia una conexión de voz.
///
/// La sesión sólo conoce este trait; la implementación real es
/// [`SongbirdTransport`].
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Empieza a reproducir `locator`. `on_end` se dispara una vez cuando la
    /// pista termina, se detiene o falla.
    async fn start(&self, locator: &str, on_end: EndNotifier) -> Result<(), TransportError>;

    /// Detiene la pista actual. Idempotente.
    async fn stop(&self);

    async fn is_active(&self) -> bool;
}

/// Aviso de fin de reproducción.
///
/// Se entrega desde el contexto de eventos del transporte; quien lo construye
/// decide a qué buzón reenviarlo. Sólo la primera notificación cuenta.
#[derive(Clone)]
pub struct EndNotifier {
    fired: Arc<AtomicBool>,
    deliver: Arc<dyn Fn(Option<String>) + Send + Sync>,
}

impl EndNotifier {
    pub fn new(deliver: impl Fn(Option<String>) + Send + Sync + 'static) -> Self {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            deliver: Arc::new(deliver),
        }
    }

    /// `error` lleva la causa si la pista terminó por un fallo del stream
    pub fn notify(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("Notificación de fin repetida, ignorada");
            return;
        }
        (self.deliver)(error);
    }
}

impl fmt::Debug for EndNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndNotifier")
            .field("fired", &self.fired.load(Ordering::SeqCst))
            .finish()
    }
}

/// Transporte sobre una llamada de songbird
pub struct SongbirdTransport {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdTransport {
    /// Conecta (o mueve) el bot al canal de voz indicado
    pub async fn connect(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
        volume: f32,
    ) -> Result<Self, TransportError> {
        let call = manager
            .join(guild_id, channel_id)
            .await
            .map_err(join_error)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Self {
            guild_id,
            manager,
            call,
            http,
            volume,
            current: Mutex::new(None),
        })
    }

    /// Canal de voz en el que está la llamada, si sigue conectada
    pub async fn current_channel(&self) -> Option<ChannelId> {
        let call = self.call.lock().await;
        call.current_channel().map(|id| ChannelId::new(id.0.get()))
    }

    /// Sale del canal de voz
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.stop().await;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(join_error)?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn start(&self, locator: &str, on_end: EndNotifier) -> Result<(), TransportError> {
        let url = Url::parse(locator)
            .map_err(|e| TransportError::UnreachableStream(format!("{}: {}", locator, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TransportError::UnreachableStream(format!(
                "esquema no soportado: {}",
                url.scheme()
            )));
        }

        if self.is_active().await {
            return Err(TransportError::AlreadyPlaying);
        }

        let input = Input::from(HttpRequest::new(self.http.clone(), locator.to_string()));

        let handle = {
            let mut call = self.call.lock().await;
            if call.current_channel().is_none() {
                return Err(TransportError::NotConnected);
            }
            call.play_input(input)
        };

        let _ = handle.set_volume(self.volume);

        let guild_id = self.guild_id;
        arm_or_release(
            |event| {
                handle.add_event(
                    Event::Track(event),
                    TrackEndHandler {
                        guild_id,
                        notifier: on_end.clone(),
                    },
                )
            },
            || {
                warn!("⚠️ Pista detenida: no se pudo registrar su fin en guild {}", guild_id);
                let _ = handle.stop();
            },
        )?;

        *self.current.lock().await = Some(handle);
        debug!("▶️ Stream iniciado en guild {}", self.guild_id);
        Ok(())
    }

    async fn stop(&self) {
        if let Some(handle) = self.current.lock().await.take() {
            // Songbird dispara TrackEvent::End al detener
            let _ = handle.stop();
            debug!("⏹️ Stream detenido en guild {}", self.guild_id);
        }
    }

    async fn is_active(&self) -> bool {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(handle) => match handle.get_info().await {
                Ok(info) => !matches!(
                    info.playing,
                    PlayMode::Stop | PlayMode::End | PlayMode::Errored(_)
                ),
                Err(_) => false,
            },
            None => false,
        }
    }
}

/// Registra los avisos de fin de una pista que ya suena. Si alguno falla, la
/// pista se suelta con `release` antes de devolver el error.
fn arm_or_release<E: fmt::Display>(
    mut register: impl FnMut(TrackEvent) -> Result<(), E>,
    release: impl FnOnce(),
) -> Result<(), TransportError> {
    for event in [TrackEvent::End, TrackEvent::Error] {
        if let Err(e) = register(event) {
            release();
            return Err(TransportError::Network(e.to_string()));
        }
    }
    Ok(())
}

fn join_error(err: JoinError) -> TransportError {
    match err {
        JoinError::TimedOut => TransportError::Network("timeout al unirse al canal".to_string()),
        other => TransportError::Network(other.to_string()),
    }
}

/// Reenvía el fin (o el error) de una pista a la sesión dueña
struct TrackEndHandler {
    guild_id: GuildId,
    notifier: EndNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut error = None;
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    warn!("❌ Error en track para guild {}: {:?}", self.guild_id, e);
                    error = Some(format!("{:?}", e));
                }
            }
        }

        debug!("🎵 Track terminó en guild {}", self.guild_id);
        self.notifier.notify(error);
        None
    }
}
