use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, io::ErrorKind, path::Path};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::monitor::service::DEFAULT_INTERVAL;
use crate::notifications::models::ChannelConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct HeraldConfig {
    /// Length of one scheduler tick. Service intervals are counted in ticks.
    pub tick_period_secs: u64,
    /// Interval applied when a non-positive one is requested.
    pub default_interval: u32,
    /// Maximum polls in flight at once.
    pub workers: usize,
    /// How long a batch may run before unfinished polls are abandoned. The
    /// clock starts when the batch starts, so polls waiting for a worker
    /// slot spend part of it queued: with more due services than `workers`,
    /// later waves only get what the first wave left over.
    pub batch_deadline_ms: u64,
    /// Timeout for a single status exchange. Keep it well below
    /// `batch_deadline_ms` if batches often exceed `workers`, or slow
    /// services in the first wave starve the rest of the batch.
    pub poll_timeout_ms: u64,
    /// Minimum gap between two delivered notifications.
    pub notification_spacing_secs: u64,
    /// Initial state of the global notification switch on a fresh roster.
    pub notifications_enabled: bool,
    pub roster_path: String,
    pub log_dir: String,
    pub channels: Vec<ChannelConfig>,
}

impl Default for HeraldConfig {
    fn default() -> Self {
        Self {
            tick_period_secs: 60,
            default_interval: DEFAULT_INTERVAL,
            workers: 10,
            batch_deadline_ms: 7_000,
            poll_timeout_ms: 5_000,
            notification_spacing_secs: 2,
            notifications_enabled: true,
            roster_path: "herald_roster.toml".to_string(),
            log_dir: "logs".to_string(),
            channels: Vec::new(),
        }
    }
}

impl HeraldConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_period_secs)
    }

    pub fn batch_deadline(&self) -> Duration {
        Duration::from_millis(self.batch_deadline_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn notification_spacing(&self) -> Duration {
        Duration::from_secs(self.notification_spacing_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_secs == 0 {
            return Err(ConfigError::Invalid("tick_period_secs must be positive".to_string()));
        }
        if self.default_interval == 0 {
            return Err(ConfigError::Invalid("default_interval must be positive".to_string()));
        }
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be positive".to_string()));
        }
        if self.batch_deadline_ms == 0 || self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        Ok(())
    }
}

/// Loads the config at `config_path_str`, falling back to defaults when the
/// file does not exist.
pub fn load_config(config_path_str: &str) -> Result<HeraldConfig, ConfigError> {
    let config_path = Path::new(config_path_str);
    // Attempt to get absolute path for logging, but don't fail if it can't be canonicalized (e.g. if file doesn't exist yet)
    let absolute_path_display = config_path
        .canonicalize()
        .unwrap_or_else(|_| config_path.to_path_buf());
    info!(path = ?absolute_path_display, "Attempting to load config.");

    let config_str = match fs::read_to_string(config_path) {
        Ok(config_str) => config_str,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %config_path_str, "Config file not found, using defaults.");
            return Ok(HeraldConfig::default());
        }
        Err(e) => {
            error!(path = %config_path_str, error = %e, "Failed to read config file.");
            return Err(e.into());
        }
    };

    let config: HeraldConfig = toml::from_str(&config_str).map_err(|e| {
        error!(path = %config_path_str, error = %e, "Failed to parse config file.");
        ConfigError::from(e)
    })?;
    config.validate()?;

    info!(config = ?config, "Loaded config successfully.");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config, HeraldConfig::default());
        assert_eq!(config.tick_period(), Duration::from_secs(60));
        assert_eq!(config.batch_deadline(), Duration::from_secs(7));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.toml");
        fs::write(
            &path,
            r#"
tick_period_secs = 5
workers = 4

[[channels]]
type = "webhook"
url = "http://localhost:9000/hook"

[[channels]]
type = "telegram"
bot_token = "token"
chat_id = "42"
"#,
        )
        .unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.tick_period_secs, 5);
        assert_eq!(config.workers, 4);
        assert_eq!(config.default_interval, DEFAULT_INTERVAL);
        assert_eq!(config.channels.len(), 2);
        assert!(matches!(
            &config.channels[0],
            ChannelConfig::Webhook { method, .. } if method == "POST"
        ));
        assert_eq!(config.channels[1].kind(), "telegram");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.toml");
        fs::write(&path, "workers = 0\n").unwrap();
        assert!(matches!(
            load_config(path.to_str().unwrap()),
            Err(ConfigError::Invalid(_))
        ));

        fs::write(&path, "workers = \"many\"\n").unwrap();
        assert!(matches!(
            load_config(path.to_str().unwrap()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
