//! Configuration for the accelerometer data collector.

use crate::core::exporter::{DEFAULT_BASE_NAME, DEFAULT_OUTPUT_DIR};
use crate::link::{LinkSettings, BAUD_RATE, DEFAULT_READ_TIMEOUT, DEFAULT_SETTLE_DELAY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory CSV exports are written to
    pub output_dir: PathBuf,

    /// Path for storing collection statistics
    pub data_path: PathBuf,

    /// How long a single serial read may block
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,

    /// Wait after opening the port before the device is used
    #[serde(with = "duration_ms")]
    pub settle_delay: Duration,

    /// File name offered when saving a run
    pub default_base_name: String,

    /// Port of the last successful connection
    pub last_port: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("accel-data-collector");

        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            data_path: data_dir,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
            default_base_name: DEFAULT_BASE_NAME.to_string(),
            last_port: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("accel-data-collector")
            .join("config.json")
    }

    /// Where collection statistics are persisted.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Serial settings derived from this configuration.
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: BAUD_RATE,
            read_timeout: self.read_timeout,
            settle_delay: self.settle_delay,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Serde support for Duration as whole milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
