//! Sesión de reproducción de un guild.
//!
//! Cada sesión es una tarea que posee la cola y el transporte; el resto del
//! bot habla con ella a través de [`PlaybackSession`], un handle clonable que
//! envía mensajes a su buzón. Todas las operaciones (incluido el aviso de fin
//! de pista que llega desde songbird) se procesan de una en una, en orden.

use chrono::{DateTime, Utc};
use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        track::Track,
        transport::{EndNotifier, VoiceTransport},
    },
    error::{SessionError, TransportError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    /// El transporte rechazó la pista en `queue[0]`; sólo skip/stop la desbloquean
    Stalled,
}

/// Qué pasó con la reproducción al encolar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Playback {
    /// Ya había algo sonando; la pista espera su turno
    Queued,
    /// La pista encolada empezó a sonar
    Started,
    /// La sesión intentó arrancar y el transporte falló
    Failed(TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    /// Posición 1-based en la cola
    pub position: usize,
    pub playback: Playback,
    /// Segundos hasta que empiece, calculado al encolar; 0 si no está esperando
    pub estimated_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped(Track),
    NothingToSkip,
}

/// Reserva de hueco para una resolución en curso
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTicket {
    epoch: u64,
}

/// Copia puntual del estado de la sesión
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub tracks: Vec<Track>,
    pub started_at: Option<DateTime<Utc>>,
    pub loop_current: bool,
    pub state: PlaybackState,
    pub taken_at: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn current(&self) -> Option<&Track> {
        self.tracks.first()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn remaining_time(&self, now: DateTime<Utc>) -> u64 {
        remaining_secs(self.current(), self.started_at, now)
    }

    pub fn estimated_start_time(&self, index: usize, now: DateTime<Utc>) -> u64 {
        estimated_start_secs(&self.tracks, self.started_at, index, now)
    }
}

/// Segundos que le quedan a la pista actual; 0 si no suena nada
pub fn remaining_secs(
    current: Option<&Track>,
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u64 {
    match (current, started_at) {
        (Some(track), Some(started)) => {
            let elapsed = (now - started).num_seconds().max(0) as u64;
            track.duration_secs().saturating_sub(elapsed)
        }
        _ => 0,
    }
}

/// Segundos hasta que empiece la pista en `index` (0 = la actual)
pub fn estimated_start_secs<'a>(
    tracks: impl IntoIterator<Item = &'a Track>,
    started_at: Option<DateTime<Utc>>,
    index: usize,
    now: DateTime<Utc>,
) -> u64 {
    let mut tracks = tracks.into_iter();
    let Some(current) = tracks.next() else {
        return 0;
    };
    if index == 0 {
        return 0;
    }

    let queued: u64 = tracks
        .take(index - 1)
        .map(Track::duration_secs)
        .sum();
    remaining_secs(Some(current), started_at, now) + queued
}

enum SessionCommand {
    Enqueue {
        track: Track,
        ticket: Option<PendingTicket>,
        reply: oneshot::Sender<Result<Enqueued, SessionError>>,
    },
    Reserve {
        reply: oneshot::Sender<PendingTicket>,
    },
    Skip {
        reply: oneshot::Sender<SkipOutcome>,
    },
    StopAndClear {
        reply: oneshot::Sender<()>,
    },
    SetLoop {
        enabled: bool,
        reply: oneshot::Sender<()>,
    },
    AttachTransport {
        transport: Arc<dyn VoiceTransport>,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    TrackEnded {
        generation: u64,
        error: Option<String>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle de una sesión de reproducción
#[derive(Clone)]
pub struct PlaybackSession {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl PlaybackSession {
    /// Lanza la tarea de la sesión. Necesita un runtime de tokio.
    pub fn spawn(guild_id: GuildId) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = SessionActor {
            guild_id,
            queue: VecDeque::new(),
            loop_current: false,
            started_at: None,
            state: PlaybackState::Idle,
            transport: None,
            generation: 0,
            epoch: 0,
            mailbox: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));
        debug!("🧵 Sesión creada para guild {}", guild_id);

        Self { guild_id, tx }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Agrega una pista al final de la cola y arranca si la sesión estaba inactiva
    pub async fn enqueue(&self, track: Track) -> Result<Enqueued, SessionError> {
        self.request(|reply| SessionCommand::Enqueue {
            track,
            ticket: None,
            reply,
        })
        .await?
    }

    /// Reserva un hueco antes de lanzar una resolución lenta
    pub async fn reserve(&self) -> Result<PendingTicket, SessionError> {
        self.request(|reply| SessionCommand::Reserve { reply }).await
    }

    /// Encola el resultado de una resolución; se descarta si la cola se limpió entretanto
    pub async fn enqueue_pending(
        &self,
        ticket: PendingTicket,
        track: Track,
    ) -> Result<Enqueued, SessionError> {
        self.request(|reply| SessionCommand::Enqueue {
            track,
            ticket: Some(ticket),
            reply,
        })
        .await?
    }

    pub async fn skip(&self) -> Result<SkipOutcome, SessionError> {
        self.request(|reply| SessionCommand::Skip { reply }).await
    }

    pub async fn stop_and_clear(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::StopAndClear { reply })
            .await
    }

    pub async fn set_loop(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::SetLoop { enabled, reply })
            .await
    }

    pub async fn attach_transport(
        &self,
        transport: Arc<dyn VoiceTransport>,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::AttachTransport { transport, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply }).await
    }

    pub async fn current_track(&self) -> Result<Track, SessionError> {
        self.snapshot()
            .await?
            .tracks
            .into_iter()
            .next()
            .ok_or(SessionError::EmptyQueue)
    }

    pub async fn remaining_time(&self, now: DateTime<Utc>) -> Result<u64, SessionError> {
        Ok(self.snapshot().await?.remaining_time(now))
    }

    /// Detiene el transporte y termina la tarea. Usado por el registro.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Shutdown { reply })
            .await
    }
}

struct SessionActor {
    guild_id: GuildId,
    queue: VecDeque<Track>,
    loop_current: bool,
    started_at: Option<DateTime<Utc>>,
    state: PlaybackState,
    transport: Option<Arc<dyn VoiceTransport>>,
    /// Arranque del transporte cuyo fin esperamos
    generation: u64,
    /// Ciclo de limpieza actual; invalida resoluciones reservadas antes
    epoch: u64,
    mailbox: mpsc::WeakUnboundedSender<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::Enqueue {
                    track,
                    ticket,
                    reply,
                } => {
                    let result = self.enqueue(track, ticket).await;
                    let _ = reply.send(result);
                }
                SessionCommand::Reserve { reply } => {
                    let _ = reply.send(PendingTicket { epoch: self.epoch });
                }
                SessionCommand::Skip { reply } => {
                    let outcome = self.skip().await;
                    let _ = reply.send(outcome);
                }
                SessionCommand::StopAndClear { reply } => {
                    self.stop_and_clear().await;
                    let _ = reply.send(());
                }
                SessionCommand::SetLoop { enabled, reply } => {
                    self.loop_current = enabled;
                    if enabled {
                        info!("🔂 Repetir canción activado en guild {}", self.guild_id);
                    } else {
                        info!("➡️ Repetición desactivada en guild {}", self.guild_id);
                    }
                    let _ = reply.send(());
                }
                SessionCommand::AttachTransport { transport, reply } => {
                    self.attach_transport(transport).await;
                    let _ = reply.send(());
                }
                SessionCommand::Snapshot { reply } => {
                    let _ = reply.send(self.snapshot());
                }
                SessionCommand::TrackEnded { generation, error } => {
                    self.on_track_ended(generation, error).await;
                }
                SessionCommand::Shutdown { reply } => {
                    self.stop_and_clear().await;
                    self.transport = None;
                    let _ = reply.send(());
                    break;
                }
            }
        }
        debug!("🧵 Sesión terminada para guild {}", self.guild_id);
    }

    async fn enqueue(
        &mut self,
        track: Track,
        ticket: Option<PendingTicket>,
    ) -> Result<Enqueued, SessionError> {
        if let Some(ticket) = ticket {
            if ticket.epoch != self.epoch {
                warn!(
                    "🗑️ Descartada '{}': la cola se limpió durante la búsqueda",
                    track.title()
                );
                return Err(SessionError::Discarded);
            }
        }

        info!("➕ Agregado a la cola: {}", track.title());
        let was_idle = self.state == PlaybackState::Idle && self.queue.is_empty();
        self.queue.push_back(track);
        let position = self.queue.len();

        if !was_idle {
            let estimated_secs =
                estimated_start_secs(&self.queue, self.started_at, position - 1, Utc::now());
            return Ok(Enqueued {
                position,
                playback: Playback::Queued,
                estimated_secs,
            });
        }

        let playback = match self.advance(false).await {
            Ok(()) if self.state == PlaybackState::Playing => Playback::Started,
            Ok(()) => Playback::Failed(TransportError::UnreachableStream(
                "la pista no tiene stream reproducible".to_string(),
            )),
            Err(e) => Playback::Failed(e),
        };

        Ok(Enqueued {
            position,
            playback,
            estimated_secs: 0,
        })
    }

    /// Transición central. `continuation` indica que la pista anterior terminó.
    async fn advance(&mut self, continuation: bool) -> Result<(), TransportError> {
        if continuation && !self.loop_current {
            if let Some(finished) = self.queue.pop_front() {
                debug!("⏭️ Fuera de la cola: {}", finished.title());
            }
        }

        loop {
            let Some(next) = self.queue.front() else {
                self.go_idle();
                return Ok(());
            };

            let Some(locator) = next.playable_locator().map(str::to_owned) else {
                // Una pista sin stream se descarta aunque el loop esté activo
                warn!("⚠️ '{}' no tiene stream reproducible, saltando", next.title());
                self.queue.pop_front();
                continue;
            };

            let title = next.title().to_string();
            return self.start(&title, &locator).await;
        }
    }

    async fn start(&mut self, title: &str, locator: &str) -> Result<(), TransportError> {
        self.generation += 1;
        let notifier = self.notifier(self.generation);

        let Some(transport) = self.transport.clone() else {
            error!("❌ Sin conexión de voz para reproducir '{}'", title);
            self.stall();
            return Err(TransportError::NotConnected);
        };

        self.started_at = Some(Utc::now());
        self.state = PlaybackState::Playing;

        match transport.start(locator, notifier).await {
            Ok(()) => {
                info!("🎵 Reproduciendo: {} (guild {})", title, self.guild_id);
                Ok(())
            }
            Err(e) => {
                error!("❌ Error al iniciar '{}': {}", title, e);
                self.stall();
                Err(e)
            }
        }
    }

    fn notifier(&self, generation: u64) -> EndNotifier {
        let mailbox = self.mailbox.clone();
        EndNotifier::new(move |error| {
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(SessionCommand::TrackEnded { generation, error });
            }
        })
    }

    async fn on_track_ended(&mut self, generation: u64, error: Option<String>) {
        if self.state != PlaybackState::Playing || generation != self.generation {
            debug!(
                "Aviso de fin obsoleto ignorado (gen {} vs {}) en guild {}",
                generation, self.generation, self.guild_id
            );
            return;
        }

        if let Some(reason) = error {
            // Un stream roto no se repite aunque el loop esté activo
            warn!("❌ La pista falló durante la reproducción: {}", reason);
            self.queue.pop_front();
            if let Err(e) = self.advance(false).await {
                error!("Error al reproducir siguiente track: {}", e);
            }
            return;
        }

        if let Err(e) = self.advance(true).await {
            error!("Error al reproducir siguiente track: {}", e);
        }
    }

    async fn skip(&mut self) -> SkipOutcome {
        match self.state {
            PlaybackState::Idle => {
                debug!("Nada que saltar en guild {}", self.guild_id);
                SkipOutcome::NothingToSkip
            }
            PlaybackState::Playing => {
                let Some(current) = self.queue.front().cloned() else {
                    return SkipOutcome::NothingToSkip;
                };
                // El aviso de fin que dispara stop() llega al buzón y avanza la cola
                match self.transport.clone() {
                    Some(transport) => transport.stop().await,
                    None => {
                        self.queue.pop_front();
                        if let Err(e) = self.advance(false).await {
                            error!("Error al reproducir siguiente track: {}", e);
                        }
                    }
                }
                info!("⏭️ Saltada: {}", current.title());
                SkipOutcome::Skipped(current)
            }
            PlaybackState::Stalled => {
                let Some(stalled) = self.queue.pop_front() else {
                    self.go_idle();
                    return SkipOutcome::NothingToSkip;
                };
                if let Err(e) = self.advance(false).await {
                    error!("Error al reproducir siguiente track: {}", e);
                }
                info!("⏭️ Saltada: {}", stalled.title());
                SkipOutcome::Skipped(stalled)
            }
        }
    }

    /// Cambia de conexión de voz. Lo que estaba sonando (o atascado) vuelve a
    /// empezar sobre el transporte nuevo.
    async fn attach_transport(&mut self, transport: Arc<dyn VoiceTransport>) {
        let previous = self.transport.replace(transport);
        debug!("🔌 Transporte asociado a guild {}", self.guild_id);

        if self.state == PlaybackState::Idle {
            return;
        }

        self.generation += 1;
        if let Some(previous) = previous {
            previous.stop().await;
        }
        if let Err(e) = self.advance(false).await {
            error!("Error al reanudar en la nueva conexión: {}", e);
        }
    }

    async fn stop_and_clear(&mut self) {
        // Cualquier aviso de fin pendiente queda obsoleto
        self.generation += 1;
        self.epoch += 1;
        self.queue.clear();
        self.go_idle();
        if let Some(transport) = self.transport.clone() {
            transport.stop().await;
        }
        info!("⏹️ Reproducción detenida y cola limpiada en guild {}", self.guild_id);
    }

    fn go_idle(&mut self) {
        self.started_at = None;
        self.state = PlaybackState::Idle;
        info!("📭 Cola vacía en guild {}", self.guild_id);
    }

    fn stall(&mut self) {
        self.started_at = None;
        self.state = PlaybackState::Stalled;
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            tracks: self.queue.iter().cloned().collect(),
            started_at: self.started_at,
            loop_current: self.loop_current,
            state: self.state,
            taken_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        track::{Platform, Requester},
        transport::testing::FakeTransport,
    };
    use chrono::Duration;

    fn track(title: &str, secs: u64) -> Track {
        Track::new(title, Platform::YouTube, Requester::new("tester"))
            .with_duration_secs(secs)
            .with_stream_locator(format!("https://cdn.test/{}", title))
    }

    async fn session_with(transport: &Arc<FakeTransport>) -> PlaybackSession {
        let session = PlaybackSession::spawn(GuildId::new(1));
        session.attach_transport(transport.clone()).await.unwrap();
        session
    }

    fn titles(snapshot: &QueueSnapshot) -> Vec<&str> {
        snapshot.tracks.iter().map(Track::title).collect()
    }

    #[tokio::test]
    async fn first_enqueue_starts_and_later_ones_only_append() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        let first = session.enqueue(track("a", 200)).await.unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(first.playback, Playback::Started);

        for (i, name) in ["b", "c", "d"].iter().enumerate() {
            let added = session.enqueue(track(name, 100)).await.unwrap();
            assert_eq!(added.position, i + 2);
            assert_eq!(added.playback, Playback::Queued);
        }

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(titles(&snapshot), vec!["a", "b", "c", "d"]);
        assert_eq!(transport.started(), vec!["https://cdn.test/a"]);
    }

    #[tokio::test]
    async fn track_end_advances_to_the_next_track() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        session.enqueue(track("a", 200)).await.unwrap();
        let before = session.snapshot().await.unwrap();
        assert!(before.started_at.is_some());

        session.enqueue(track("b", 120)).await.unwrap();
        assert_eq!(transport.started().len(), 1);

        transport.finish_current();
        let after = session.snapshot().await.unwrap();
        assert_eq!(titles(&after), vec!["b"]);
        assert_eq!(
            transport.started(),
            vec!["https://cdn.test/a", "https://cdn.test/b"]
        );
        assert!(after.started_at >= before.started_at);
        assert_eq!(after.state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn last_track_ending_leaves_session_idle() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        session.enqueue(track("a", 60)).await.unwrap();
        transport.finish_current();

        let snapshot = session.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(snapshot.started_at, None);
    }

    #[tokio::test]
    async fn loop_replays_the_same_track() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        session.set_loop(true).await.unwrap();
        session.enqueue(track("a", 60)).await.unwrap();
        let mut last_start = session.snapshot().await.unwrap().started_at;

        for round in 2..=4 {
            transport.finish_current();
            let snapshot = session.snapshot().await.unwrap();
            assert_eq!(titles(&snapshot), vec!["a"]);
            assert_eq!(snapshot.state, PlaybackState::Playing);
            assert!(snapshot.started_at.is_some());
            assert!(snapshot.started_at >= last_start);
            assert_eq!(transport.started().len(), round);
            last_start = snapshot.started_at;
        }
    }

    #[tokio::test]
    async fn loop_flag_applies_on_next_advance() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        session.enqueue(track("a", 60)).await.unwrap();
        session.enqueue(track("b", 60)).await.unwrap();
        session.set_loop(true).await.unwrap();
        transport.finish_current();
        assert_eq!(titles(&session.snapshot().await.unwrap()), vec!["a", "b"]);

        session.set_loop(false).await.unwrap();
        transport.finish_current();
        assert_eq!(titles(&session.snapshot().await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn skip_when_idle_is_a_no_op() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        assert_eq!(session.skip().await.unwrap(), SkipOutcome::NothingToSkip);
        let snapshot = session.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert_eq!(transport.stop_count(), 0);
    }

    #[tokio::test]
    async fn skip_moves_to_the_next_track() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        session.enqueue(track("a", 60)).await.unwrap();
        session.enqueue(track("b", 60)).await.unwrap();

        let outcome = session.skip().await.unwrap();
        assert_eq!(outcome, SkipOutcome::Skipped(track("a", 60)));

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(titles(&snapshot), vec!["b"]);
        assert_eq!(transport.started().last().unwrap(), "https://cdn.test/b");
    }

    #[tokio::test]
    async fn stop_and_clear_is_idempotent() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        session.enqueue(track("a", 60)).await.unwrap();
        session.enqueue(track("b", 60)).await.unwrap();

        session.stop_and_clear().await.unwrap();
        session.stop_and_clear().await.unwrap();

        let snapshot = session.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.started_at, None);
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(!transport.is_active().await);
        // El fin disparado por stop() no debe arrancar nada
        assert_eq!(transport.started().len(), 1);
    }

    #[tokio::test]
    async fn stop_and_clear_from_stalled_is_idle() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        transport.fail_next_start(TransportError::UnreachableStream("403".into()));
        session.enqueue(track("a", 60)).await.unwrap();
        session.enqueue(track("b", 60)).await.unwrap();
        assert_eq!(
            session.snapshot().await.unwrap().state,
            PlaybackState::Stalled
        );

        session.stop_and_clear().await.unwrap();
        session.stop_and_clear().await.unwrap();

        let snapshot = session.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.started_at, None);
        assert_eq!(snapshot.state, PlaybackState::Idle);

        let added = session.enqueue(track("c", 60)).await.unwrap();
        assert_eq!(added.playback, Playback::Started);
        assert_eq!(transport.started(), vec!["https://cdn.test/c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enqueues_get_positions_in_arrival_order() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        let adds = (0..20).map(|i| {
            let session = session.clone();
            tokio::spawn(async move {
                let name = format!("t{:02}", i);
                let added = session.enqueue(track(&name, 60)).await.unwrap();
                (name, added)
            })
        });
        let results: Vec<(String, Enqueued)> = futures::future::join_all(adds)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();

        let mut positions: Vec<usize> = results.iter().map(|(_, a)| a.position).collect();
        positions.sort_unstable();
        assert_eq!(positions, (1..=20).collect::<Vec<_>>());

        let snapshot = session.snapshot().await.unwrap();
        for (name, added) in &results {
            assert_eq!(snapshot.tracks[added.position - 1].title(), name);
        }
        let started = results
            .iter()
            .filter(|(_, a)| a.playback == Playback::Started)
            .count();
        assert_eq!(started, 1);
        assert_eq!(transport.started().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_skips_pop_each_track_once() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;
        let names = ["a", "b", "c", "d", "e"];
        for name in names {
            session.enqueue(track(name, 60)).await.unwrap();
        }

        let skips = (0..3).map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.skip().await.unwrap() })
        });
        let mut skipped: Vec<String> = futures::future::join_all(skips)
            .await
            .into_iter()
            .map(|outcome| match outcome.unwrap() {
                SkipOutcome::Skipped(track) => track.title().to_string(),
                SkipOutcome::NothingToSkip => panic!("la cola no estaba vacía"),
            })
            .collect();
        skipped.sort();
        skipped.dedup();
        let popped = skipped.len();

        // Varios skips sobre la misma pista cuentan como uno
        assert_eq!(skipped, names[..popped].to_vec());
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(titles(&snapshot), names[popped..].to_vec());
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(transport.started().len(), popped + 1);
    }

    #[tokio::test]
    async fn wait_estimate_comes_with_the_position() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        let first = session.enqueue(track("a", 200)).await.unwrap();
        assert_eq!(first.estimated_secs, 0);
        session.enqueue(track("b", 100)).await.unwrap();

        // El fin de `a` entra al buzón antes que el encolado de `c`
        transport.finish_current();
        let added = session.enqueue(track("c", 60)).await.unwrap();

        assert_eq!(added.position, 2);
        assert_eq!(added.playback, Playback::Queued);
        assert!((99..=100).contains(&added.estimated_secs));
    }

    #[tokio::test]
    async fn stale_end_after_clear_does_not_pop_new_track() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        transport.withhold_stop_notifications();
        session.enqueue(track("a", 60)).await.unwrap();
        session.stop_and_clear().await.unwrap();
        session.enqueue(track("b", 60)).await.unwrap();

        // Aviso tardío de la primera pista
        transport.notifier(0).notify(None);

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(titles(&snapshot), vec!["b"]);
        assert_eq!(snapshot.state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn unplayable_tracks_are_skipped_even_with_loop() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;
        session.set_loop(true).await.unwrap();

        transport.fail_next_start(TransportError::Network("down".into()));
        session.enqueue(track("a", 60)).await.unwrap();
        session
            .enqueue(Track::new("broken", Platform::Spotify, Requester::new("x")))
            .await
            .unwrap();
        session.enqueue(track("c", 60)).await.unwrap();

        assert_eq!(
            session.skip().await.unwrap(),
            SkipOutcome::Skipped(track("a", 60))
        );

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(titles(&snapshot), vec!["c"]);
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(transport.started(), vec!["https://cdn.test/c"]);
    }

    #[tokio::test]
    async fn enqueue_of_unplayable_track_into_idle_reports_failure() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        let added = session
            .enqueue(Track::new("broken", Platform::YouTube, Requester::new("x")))
            .await
            .unwrap();
        assert!(matches!(added.playback, Playback::Failed(_)));

        let snapshot = session.snapshot().await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.state, PlaybackState::Idle);
    }

    #[tokio::test]
    async fn start_failure_stalls_until_skip() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        transport.fail_next_start(TransportError::UnreachableStream("404".into()));
        let added = session.enqueue(track("a", 60)).await.unwrap();
        assert_eq!(
            added.playback,
            Playback::Failed(TransportError::UnreachableStream("404".into()))
        );

        session.enqueue(track("b", 60)).await.unwrap();
        let stalled = session.snapshot().await.unwrap();
        assert_eq!(stalled.state, PlaybackState::Stalled);
        assert_eq!(stalled.started_at, None);
        assert_eq!(titles(&stalled), vec!["a", "b"]);

        assert_eq!(
            session.skip().await.unwrap(),
            SkipOutcome::Skipped(track("a", 60))
        );
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(titles(&snapshot), vec!["b"]);
    }

    #[tokio::test]
    async fn broken_stream_is_dropped_even_with_loop() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;
        session.set_loop(true).await.unwrap();

        session.enqueue(track("a", 60)).await.unwrap();
        session.enqueue(track("b", 60)).await.unwrap();
        transport.fail_current("decode error");

        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(titles(&snapshot), vec!["b"]);
        assert_eq!(snapshot.state, PlaybackState::Playing);
    }

    #[tokio::test]
    async fn pending_resolution_is_discarded_after_clear() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;

        let ticket = session.reserve().await.unwrap();
        session.stop_and_clear().await.unwrap();

        let result = session.enqueue_pending(ticket, track("late", 60)).await;
        assert_eq!(result, Err(SessionError::Discarded));
        assert!(session.snapshot().await.unwrap().is_empty());

        let fresh = session.reserve().await.unwrap();
        let added = session.enqueue_pending(fresh, track("ok", 60)).await.unwrap();
        assert_eq!(added.playback, Playback::Started);
    }

    #[tokio::test]
    async fn enqueue_without_transport_stalls() {
        let session = PlaybackSession::spawn(GuildId::new(2));
        let added = session.enqueue(track("a", 60)).await.unwrap();
        assert_eq!(added.playback, Playback::Failed(TransportError::NotConnected));

        // Al conectarse se reintenta la pista atascada
        let transport = FakeTransport::new();
        session.attach_transport(transport.clone()).await.unwrap();
        let snapshot = session.snapshot().await.unwrap();
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(transport.started(), vec!["https://cdn.test/a"]);
    }

    #[tokio::test]
    async fn closed_session_reports_closed() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;
        session.shutdown().await.unwrap();

        assert_eq!(session.skip().await, Err(SessionError::Closed));
        assert_eq!(
            session.current_track().await,
            Err(SessionError::Closed)
        );
    }

    #[tokio::test]
    async fn current_track_on_empty_queue() {
        let transport = FakeTransport::new();
        let session = session_with(&transport).await;
        assert_eq!(session.current_track().await, Err(SessionError::EmptyQueue));
    }

    #[test]
    fn remaining_time_never_increases_nor_goes_negative() {
        let start = Utc::now();
        let snapshot = QueueSnapshot {
            tracks: vec![track("a", 100)],
            started_at: Some(start),
            loop_current: false,
            state: PlaybackState::Playing,
            taken_at: start,
        };

        let mut previous = u64::MAX;
        for offset in [0, 10, 50, 99, 100, 101, 5_000] {
            let remaining = snapshot.remaining_time(start + Duration::seconds(offset));
            assert!(remaining <= previous);
            previous = remaining;
        }
        assert_eq!(snapshot.remaining_time(start + Duration::seconds(30)), 70);
        assert_eq!(snapshot.remaining_time(start + Duration::seconds(500)), 0);
    }

    #[test]
    fn remaining_time_is_zero_when_nothing_plays() {
        let now = Utc::now();
        let snapshot = QueueSnapshot {
            tracks: vec![track("a", 100)],
            started_at: None,
            loop_current: false,
            state: PlaybackState::Stalled,
            taken_at: now,
        };
        assert_eq!(snapshot.remaining_time(now), 0);
    }

    #[test]
    fn estimated_start_sums_remaining_and_previous_durations() {
        let start = Utc::now();
        let snapshot = QueueSnapshot {
            tracks: vec![track("a", 200), track("b", 120), track("c", 30), track("d", 10)],
            started_at: Some(start),
            loop_current: false,
            state: PlaybackState::Playing,
            taken_at: start,
        };
        let now = start + Duration::seconds(50);

        assert_eq!(snapshot.estimated_start_time(0, now), 0);
        assert_eq!(snapshot.estimated_start_time(1, now), 150);
        assert_eq!(snapshot.estimated_start_time(2, now), 270);
        assert_eq!(snapshot.estimated_start_time(3, now), 300);
    }
}
