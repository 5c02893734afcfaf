use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use regex::Regex;
use serde::Deserialize;
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::TrackResolver;
use crate::{
    audio::track::{Platform, Requester, Track},
    error::ResolutionError,
};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Margen antes del vencimiento para renovar el token
const TOKEN_MARGIN: Duration = Duration::from_secs(30);

static TRACK_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"spotify\.com/(?:intl-[A-Za-z-]+/)?track/([A-Za-z0-9]+)")
        .expect("regex de Spotify válida")
});

/// Extrae el id de un enlace de canción de Spotify
pub fn extract_track_id(link: &str) -> Option<&str> {
    TRACK_LINK
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    duration_ms: u64,
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: SearchTracks,
}

#[derive(Debug, Deserialize)]
struct SearchTracks {
    items: Vec<SpotifyTrack>,
}

/// Cliente de la Web API de Spotify (sólo metadata)
pub struct SpotifyClient {
    client_id: String,
    client_secret: String,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Devuelve un token válido, pidiendo uno nuevo si venció
    async fn access_token(&self) -> Result<String, ResolutionError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("🔑 Solicitando token de Spotify");
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .http
            .post(TOKEN_URL)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(ResolutionError::Unavailable(format!(
                "Spotify rechazó las credenciales ({})",
                response.status()
            )));
        }

        let body: TokenResponse = response.json().await.map_err(request_error)?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_MARGIN);
        *cached = Some(CachedToken {
            access_token: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(body.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, ResolutionError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            status if status.is_success() => response.json().await.map_err(request_error),
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::BAD_REQUEST => {
                Err(ResolutionError::NotFound(what.to_string()))
            }
            status => Err(ResolutionError::Unavailable(format!(
                "Spotify respondió {}",
                status
            ))),
        }
    }

    async fn fetch(&self, query: &str) -> Result<SpotifyTrack, ResolutionError> {
        if let Some(id) = extract_track_id(query) {
            return self
                .get_json(&format!("{}/tracks/{}", API_BASE, id), &[], query)
                .await;
        }

        if query.starts_with("http://") || query.starts_with("https://") {
            return Err(ResolutionError::MalformedUrl(query.to_string()));
        }

        let search: SearchResponse = self
            .get_json(
                &format!("{}/search", API_BASE),
                &[("q", query), ("type", "track"), ("limit", "1")],
                query,
            )
            .await?;
        search
            .tracks
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))
    }
}

fn request_error(err: reqwest::Error) -> ResolutionError {
    if err.is_timeout() {
        ResolutionError::Timeout
    } else {
        ResolutionError::Unavailable(err.to_string())
    }
}

/// Convierte la respuesta de la API en una pista sin stream
fn to_track(item: SpotifyTrack, link: &str, requester: &Requester) -> Track {
    let artists = item
        .artists
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let title = if artists.is_empty() {
        item.name
    } else {
        format!("{} - {}", item.name, artists)
    };

    let source = item
        .external_urls
        .and_then(|u| u.spotify)
        .unwrap_or_else(|| link.to_string());

    let mut track = Track::new(title, Platform::Spotify, requester.clone())
        .with_duration_secs(item.duration_ms / 1000)
        .with_source_url(source);

    if let Some(image) = item.album.and_then(|a| a.images.into_iter().next()) {
        track = track.with_thumbnail_url(image.url);
    }
    track
}

#[async_trait]
impl TrackResolver for SpotifyClient {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Track, ResolutionError> {
        info!("🟢 Consultando Spotify: {}", query);
        let item = self.fetch(query).await?;
        Ok(to_track(item, query, requester))
    }

    fn source_name(&self) -> &'static str {
        "spotify"
    }
}
