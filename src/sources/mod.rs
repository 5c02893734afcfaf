pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

use crate::{
    audio::track::{Platform, Requester, Track},
    config::Config,
    error::ResolutionError,
};

/// Trait común para todas las fuentes de música
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Convierte una búsqueda o URL en una pista
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Track, ResolutionError>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Tipo de consulta según su forma
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Spotify,
    Url,
    Search,
}

pub fn classify_query(query: &str) -> Result<QueryKind, ResolutionError> {
    let lower = query.to_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Ok(QueryKind::Search);
    }

    let url = Url::parse(query).map_err(|e| ResolutionError::MalformedUrl(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(ResolutionError::MalformedUrl(query.to_string()));
    }

    if lower.contains("spotify") {
        Ok(QueryKind::Spotify)
    } else {
        Ok(QueryKind::Url)
    }
}

/// Elige la fuente según la consulta.
///
/// Los enlaces de Spotify sólo aportan metadata: el stream se busca en YouTube
/// con el nombre y los artistas, y la pista conserva la plataforma y el enlace
/// de Spotify. Todo lo demás va directo a YouTube.
pub struct SmartResolver {
    youtube: Arc<dyn TrackResolver>,
    spotify: Option<Arc<dyn TrackResolver>>,
    timeout: Duration,
}

impl SmartResolver {
    pub fn new(
        youtube: Arc<dyn TrackResolver>,
        spotify: Option<Arc<dyn TrackResolver>>,
        timeout: Duration,
    ) -> Self {
        debug!(
            "🔎 Fuentes: {} + {}",
            youtube.source_name(),
            spotify.as_ref().map_or("sin Spotify", |s| s.source_name())
        );
        Self {
            youtube,
            spotify,
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let youtube = Arc::new(YouTubeClient::new(
            config.ytdlp_path.clone(),
            config.max_concurrent_lookups,
        ));

        let spotify = config.spotify_credentials().map(|(id, secret)| {
            info!("🟢 Spotify habilitado");
            Arc::new(SpotifyClient::new(id.to_string(), secret.to_string())) as Arc<dyn TrackResolver>
        });

        Self::new(youtube, spotify, config.resolve_timeout)
    }

    async fn timed<T>(
        &self,
        lookup: impl Future<Output = Result<T, ResolutionError>>,
    ) -> Result<T, ResolutionError> {
        tokio::time::timeout(self.timeout, lookup)
            .await
            .map_err(|_| ResolutionError::Timeout)?
    }

    async fn resolve_spotify(
        &self,
        link: &str,
        requester: &Requester,
    ) -> Result<Track, ResolutionError> {
        let spotify = self.spotify.as_ref().ok_or_else(|| {
            ResolutionError::Unavailable("credenciales de Spotify no configuradas".to_string())
        })?;

        let metadata = self.timed(spotify.resolve(link, requester)).await?;
        let search = format!("{} audio", metadata.title().replacen(" - ", " ", 1));
        debug!("🔍 Buscando stream en YouTube para Spotify: {}", search);

        let playable = self.timed(self.youtube.resolve(&search, requester)).await?;

        let mut track = Track::new(metadata.title(), Platform::Spotify, requester.clone())
            .with_duration_secs(playable.duration_secs())
            .with_source_url(link);
        if let Some(locator) = playable.stream_locator() {
            track = track.with_stream_locator(locator);
        }
        if let Some(thumbnail) = metadata.thumbnail_url().or(playable.thumbnail_url()) {
            track = track.with_thumbnail_url(thumbnail);
        }
        Ok(track)
    }
}

#[async_trait]
impl TrackResolver for SmartResolver {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Track, ResolutionError> {
        // Ningún backend recibe una consulta que empiece como una opción
        let query = query.trim().trim_start_matches('-').trim_start();
        if query.is_empty() {
            return Err(ResolutionError::NotFound(String::new()));
        }

        match classify_query(query)? {
            QueryKind::Spotify => self.resolve_spotify(query, requester).await,
            QueryKind::Url => {
                if !YouTubeClient::is_youtube_url(query) {
                    debug!("🌐 URL externa, se intenta con yt-dlp: {}", query);
                }
                self.timed(self.youtube.resolve(query, requester)).await
            }
            QueryKind::Search => self.timed(self.youtube.resolve(query, requester)).await,
        }
    }

    fn source_name(&self) -> &'static str {
        "smart"
    }
}
