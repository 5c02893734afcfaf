use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::TrackResolver;
use crate::{
    audio::track::{parse_duration_secs, Platform, Requester, Track},
    error::ResolutionError,
};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.)?(youtube\.com/(watch\?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/)",
    )
    .expect("regex de YouTube válida")
});

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YouTubeClient {
    ytdlp_path: String,
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    duration_string: Option<String>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    /// URL directa del formato elegido con `-f`
    url: Option<String>,
    is_live: Option<bool>,
}

impl YouTubeClient {
    pub fn new(ytdlp_path: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Verifica si una URL es válida para YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url)
    }

    /// Comprueba que el binario de yt-dlp responde
    pub async fn verify_available(&self) -> Result<String> {
        let output = Command::new(&self.ytdlp_path)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("No se pudo ejecutar {}", self.ytdlp_path))?;

        if !output.status.success() {
            anyhow::bail!("{} --version terminó con {}", self.ytdlp_path, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn dump_json(&self, query: &str) -> Result<YtDlpInfo, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::Unavailable(e.to_string()))?;

        debug!("📊 Consultando yt-dlp: {}", query);

        // `--` cierra las opciones: la consulta nunca se interpreta como flag
        let output = Command::new(&self.ytdlp_path)
            .args([
                "--dump-json",
                "-f",
                "bestaudio",
                "--no-playlist",
                "--no-warnings",
                "--default-search",
                "ytsearch",
                "--",
                query,
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ResolutionError::Unavailable(format!("no se pudo ejecutar yt-dlp: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(query, &stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_first_entry(&stdout).ok_or_else(|| ResolutionError::NotFound(query.to_string()))
    }
}

/// Toma la primera línea JSON válida de la salida
fn parse_first_entry(stdout: &str) -> Option<YtDlpInfo> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .find_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("⚠️ Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
}

fn classify_failure(query: &str, stderr: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();
    if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        ResolutionError::MalformedUrl(query.to_string())
    } else if lower.contains("video unavailable")
        || lower.contains("no video results")
        || lower.contains("private video")
    {
        ResolutionError::NotFound(query.to_string())
    } else {
        warn!("⚠️ yt-dlp falló para '{}': {}", query, stderr.trim());
        ResolutionError::Unavailable("yt-dlp no pudo completar la búsqueda".to_string())
    }
}

/// Convierte YtDlpInfo a Track
fn info_to_track(info: YtDlpInfo, requester: &Requester) -> Track {
    let duration = info
        .duration
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d.round() as u64)
        .or_else(|| info.duration_string.as_deref().and_then(parse_duration_secs));

    if duration.is_none() {
        warn!("⚠️ Duración desconocida para '{}', usando 0", info.title);
    }
    if info.is_live.unwrap_or(false) {
        info!("📡 '{}' es una transmisión en vivo", info.title);
    }

    let platform = match info.webpage_url.as_deref() {
        Some(page) if !YouTubeClient::is_youtube_url(page) => Platform::Unknown,
        _ => Platform::YouTube,
    };

    let mut track = Track::new(info.title, platform, requester.clone())
        .with_duration_secs(duration.unwrap_or(0));

    if let Some(stream) = info.url {
        track = track.with_stream_locator(stream);
    }
    if let Some(page) = info.webpage_url {
        track = track.with_source_url(page);
    }
    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail_url(thumbnail);
    }

    if !track.is_playable() {
        warn!("⚠️ yt-dlp no devolvió stream para '{}'", track.title());
    }
    track
}

#[async_trait]
impl TrackResolver for YouTubeClient {
    async fn resolve(&self, query: &str, requester: &Requester) -> Result<Track, ResolutionError> {
        info!("🔍 Buscando en YouTube: {}", query);
        let info = self.dump_json(query).await?;
        Ok(info_to_track(info, requester))
    }

    fn source_name(&self) -> &'static str {
        "YouTube"
    }
}
