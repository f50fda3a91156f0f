//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bot platform credentials and endpoints.
    pub bot: BotConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Wave dispatch tuning.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Chat room pool tuning.
    #[serde(default)]
    pub rooms: RoomsConfig,
    /// Daemon-level settings (metrics).
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Bot platform connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot API access token.
    pub token: String,
    /// Base URL of the platform Bot API.
    #[serde(default = "defaults::default_api_url")]
    pub api_url: String,
    /// Long-poll timeout in seconds.
    #[serde(default = "defaults::default_poll_timeout")]
    pub poll_timeout_secs: u64,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "defaults::default_http_timeout")]
    pub http_timeout_secs: u64,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (":memory:" for tests).
    #[serde(default = "defaults::default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: defaults::default_db_path(),
        }
    }
}

/// Wave dispatch tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum volunteers notified per wave.
    #[serde(default = "defaults::default_wave_size")]
    pub wave_size: usize,
    /// Seconds a wave stays unanswered before the next one goes out.
    #[serde(default = "defaults::default_wave_interval")]
    pub wave_interval_secs: u64,
    /// Background timer tick in seconds.
    #[serde(default = "defaults::default_timer_interval")]
    pub timer_interval_secs: u64,
    /// Waves sent before a request is declared exhausted.
    #[serde(default = "defaults::default_max_waves")]
    pub max_waves: i64,
    /// Debounce window for repeated identical button taps, in seconds.
    #[serde(default = "defaults::default_debounce")]
    pub debounce_secs: u64,
    /// TTL for per-actor conversation state, in seconds.
    #[serde(default = "defaults::default_conversation_ttl")]
    pub conversation_ttl_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            wave_size: defaults::default_wave_size(),
            wave_interval_secs: defaults::default_wave_interval(),
            timer_interval_secs: defaults::default_timer_interval(),
            max_waves: defaults::default_max_waves(),
            debounce_secs: defaults::default_debounce(),
            conversation_ttl_secs: defaults::default_conversation_ttl(),
        }
    }
}

/// Chat room pool tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomsConfig {
    /// Seconds between pool reconciliation passes against the platform
    /// channel list. 0 disables the background task.
    #[serde(default = "defaults::default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: defaults::default_reconcile_interval(),
        }
    }
}

/// Daemon-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Prometheus metrics port. 0 disables the HTTP endpoint (used by tests).
    #[serde(default = "defaults::default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: defaults::default_metrics_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            token = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.dispatch.wave_size, 15);
        assert_eq!(config.dispatch.wave_interval_secs, 15);
        assert_eq!(config.dispatch.max_waves, 5);
        assert_eq!(config.database.path, "wavecall.db");
    }

    #[test]
    fn test_overrides() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            token = "secret"
            api_url = "https://example.test"

            [dispatch]
            wave_size = 3
            wave_interval_secs = 1

            [server]
            metrics_port = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.bot.api_url, "https://example.test");
        assert_eq!(config.dispatch.wave_size, 3);
        assert_eq!(config.server.metrics_port, 0);
    }
}
