use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    audio::{
        session::{Enqueued, PlaybackSession},
        track::{Requester, Track},
    },
    error::{MusicError, ResolutionError},
    sources::TrackResolver,
};

/// Resultado de `/play` listo para mostrar
#[derive(Debug, Clone)]
pub struct PlayOutcome {
    pub track: Track,
    pub enqueued: Enqueued,
    /// Canciones por delante en la cola
    pub upcoming: usize,
}

/// Resuelve `query` fuera de la sesión y encola el resultado.
///
/// La sesión queda libre mientras dura la búsqueda; si alguien limpia la
/// cola antes de que termine, el resultado se descarta
/// ([`SessionError::Discarded`](crate::error::SessionError::Discarded)).
pub async fn resolve_and_enqueue(
    resolver: Arc<dyn TrackResolver>,
    session: &PlaybackSession,
    query: String,
    requester: Requester,
) -> Result<PlayOutcome, MusicError> {
    let ticket = session.reserve().await?;
    debug!("🎫 Hueco reservado en guild {} para '{}'", session.guild_id(), query);

    let lookup = tokio::spawn(async move { resolver.resolve(&query, &requester).await });
    let track = lookup
        .await
        .map_err(|e| ResolutionError::Unavailable(format!("búsqueda interrumpida: {}", e)))??;

    let enqueued = session.enqueue_pending(ticket, track.clone()).await?;
    let upcoming = enqueued.position.saturating_sub(1);

    info!(
        "🎵 '{}' en posición {} (guild {})",
        track.title(),
        enqueued.position,
        session.guild_id()
    );

    Ok(PlayOutcome {
        track,
        enqueued,
        upcoming,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{session::Playback, track::Platform, transport::testing::FakeTransport},
        error::SessionError,
        sources::MockTrackResolver,
    };
    use async_trait::async_trait;
    use serenity::model::id::GuildId;
    use tokio::sync::Notify;

    fn resolved(title: &str, secs: u64) -> Track {
        Track::new(title, Platform::YouTube, Requester::new("ana"))
            .with_duration_secs(secs)
            .with_stream_locator(format!("https://cdn.test/{}", title))
    }

    async fn connected_session() -> (PlaybackSession, Arc<FakeTransport>) {
        let transport = FakeTransport::new();
        let session = PlaybackSession::spawn(GuildId::new(7));
        session.attach_transport(transport.clone()).await.unwrap();
        (session, transport)
    }

    #[tokio::test]
    async fn first_result_starts_playing() {
        let (session, transport) = connected_session().await;
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|q, _| Ok(resolved(q, 180)));

        let outcome = resolve_and_enqueue(
            Arc::new(resolver),
            &session,
            "uno".to_string(),
            Requester::new("ana"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.enqueued.playback, Playback::Started);
        assert_eq!(outcome.upcoming, 0);
        assert_eq!(outcome.enqueued.estimated_secs, 0);
        assert_eq!(transport.started(), vec!["https://cdn.test/uno".to_string()]);
    }

    #[tokio::test]
    async fn later_results_report_their_wait() {
        let (session, _transport) = connected_session().await;
        session.enqueue(resolved("actual", 200)).await.unwrap();
        session.enqueue(resolved("siguiente", 100)).await.unwrap();

        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|q, _| Ok(resolved(q, 60)));

        let outcome = resolve_and_enqueue(
            Arc::new(resolver),
            &session,
            "tercera".to_string(),
            Requester::new("ana"),
        )
        .await
        .unwrap();

        assert_eq!(outcome.enqueued.position, 3);
        assert_eq!(outcome.enqueued.playback, Playback::Queued);
        assert_eq!(outcome.upcoming, 2);
        // Lo que queda de la actual (~200 s) más la siguiente
        assert!((299..=300).contains(&outcome.enqueued.estimated_secs));
    }

    #[tokio::test]
    async fn failed_lookup_leaves_the_queue_untouched() {
        let (session, transport) = connected_session().await;
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|q, _| Err(ResolutionError::NotFound(q.to_string())));

        let err = resolve_and_enqueue(
            Arc::new(resolver),
            &session,
            "nada".to_string(),
            Requester::new("ana"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, MusicError::Resolution(ResolutionError::NotFound(_))));
        assert!(session.snapshot().await.unwrap().is_empty());
        assert!(transport.started().is_empty());
    }

    /// Avisa al entrar y espera a que el test lo libere
    struct GatedResolver {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl TrackResolver for GatedResolver {
        async fn resolve(&self, query: &str, _: &Requester) -> Result<Track, ResolutionError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(resolved(query, 120))
        }

        fn source_name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn result_arriving_after_stop_is_discarded() {
        let (session, transport) = connected_session().await;
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let resolver = Arc::new(GatedResolver {
            entered: entered.clone(),
            release: release.clone(),
        });

        let play = tokio::spawn({
            let session = session.clone();
            async move {
                resolve_and_enqueue(resolver, &session, "tarde".to_string(), Requester::new("ana"))
                    .await
            }
        });

        entered.notified().await;
        session.stop_and_clear().await.unwrap();
        release.notify_one();

        let result = play.await.unwrap();
        assert!(matches!(
            result,
            Err(MusicError::Session(SessionError::Discarded))
        ));
        assert!(session.snapshot().await.unwrap().is_empty());
        assert!(transport.started().is_empty());
    }
}
