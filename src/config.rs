use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,

    // Fuentes
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub ytdlp_path: String,
    pub max_concurrent_lookups: usize,

    // Tiempos
    pub resolve_timeout: Duration,
    pub queue_view_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una fuente de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let duration = |key: &str, default: &str| -> Result<Duration> {
            let raw = or_default(key, default);
            humantime::parse_duration(raw.trim())
                .with_context(|| format!("{} inválido: {}", key, raw))
        };

        let config = Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            application_id: var("APPLICATION_ID")
                .context("Falta APPLICATION_ID")?
                .trim()
                .parse()
                .context("APPLICATION_ID debe ser numérico")?,
            guild_id: var("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Audio
            default_volume: or_default("DEFAULT_VOLUME", "0.5")
                .trim()
                .parse()
                .context("DEFAULT_VOLUME debe ser un número")?,

            // Fuentes
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),
            ytdlp_path: or_default("YTDLP_PATH", "yt-dlp"),
            max_concurrent_lookups: or_default("MAX_CONCURRENT_LOOKUPS", "3")
                .trim()
                .parse()
                .context("MAX_CONCURRENT_LOOKUPS debe ser un entero")?,

            // Tiempos
            resolve_timeout: duration("RESOLVE_TIMEOUT", "30s")?,
            queue_view_timeout: duration("QUEUE_VIEW_TIMEOUT", "120s")?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Timeouts must be non-zero
    /// - At least one concurrent lookup
    /// - Spotify credentials come as a pair
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.queue_view_timeout.is_zero() {
            anyhow::bail!("Queue view timeout must be greater than 0");
        }

        if self.max_concurrent_lookups == 0 {
            anyhow::bail!("Max concurrent lookups must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    /// Credenciales de Spotify, si están configuradas
    pub fn spotify_credentials(&self) -> Option<(&str, &str)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes tokens and secrets.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol\n  \
            Sources: yt-dlp='{}', Spotify={}, {} concurrent lookups\n  \
            Timeouts: resolve {}, queue view {}",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.ytdlp_path,
            if self.spotify_credentials().is_some() { "on" } else { "off" },
            self.max_concurrent_lookups,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.queue_view_timeout),
        )
    }
}
