//! Sentinel Configuration - serial, reconnect, classifier and archive settings
//!
//! Every tunable the engine uses is a field here. Each struct implements
//! `Default` with values matching `config::defaults`, so a missing file or a
//! partial file behaves exactly like the built-in constants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "GAS_SENTINEL_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "gas_sentinel.toml";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `SentinelConfig::load()` which searches:
/// 1. `$GAS_SENTINEL_CONFIG` env var
/// 2. `./gas_sentinel.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl SentinelConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), port = %config.serial.port, "Loaded config from {}", CONFIG_PATH_ENV);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_PATH_ENV);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_PATH_ENV);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(port = %config.serial.port, "Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check every section, collecting all problems rather than stopping at the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.serial.port.trim().is_empty() {
            errors.push("serial.port must not be empty".to_string());
        }
        if self.serial.baud_rate == 0 {
            errors.push("serial.baud_rate must be > 0".to_string());
        }
        if self.serial.idle_poll_ms == 0 {
            errors.push("serial.idle_poll_ms must be > 0 (0 would busy-loop)".to_string());
        }
        if self.reconnect.connect_retry_secs == 0 {
            errors.push("reconnect.connect_retry_secs must be > 0".to_string());
        }
        if self.reconnect.drop_backoff_secs == 0 {
            errors.push("reconnect.drop_backoff_secs must be > 0".to_string());
        }

        let c = &self.classifier;
        if c.window_size < 2 {
            errors.push(format!("classifier.window_size must be >= 2, got {}", c.window_size));
        }
        if !(0.0..=1.0).contains(&c.confidence_threshold) {
            errors.push(format!(
                "classifier.confidence_threshold must be within [0, 1], got {:.2}",
                c.confidence_threshold
            ));
        }
        if c.trend_samples < 2 {
            errors.push(format!("classifier.trend_samples must be >= 2, got {}", c.trend_samples));
        }
        if c.trend_samples > c.window_size {
            errors.push(format!(
                "classifier.trend_samples ({}) must not exceed window_size ({})",
                c.trend_samples, c.window_size
            ));
        }
        if !(c.sample_interval_secs > 0.0) {
            errors.push("classifier.sample_interval_secs must be > 0".to_string());
        }

        if self.archive.enabled && self.archive.interval_secs == 0 {
            errors.push("archive.interval_secs must be > 0 when archiving is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Serial
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path or COM port name
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Sleep between polls while no bytes are waiting
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Driver-level read timeout
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_port() -> String {
    defaults::DEFAULT_SERIAL_PORT.to_string()
}
fn default_baud_rate() -> u32 { defaults::DEFAULT_BAUD_RATE }
fn default_idle_poll_ms() -> u64 { defaults::IDLE_POLL_MS }
fn default_read_timeout_ms() -> u64 { defaults::READ_TIMEOUT_MS }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            idle_poll_ms: default_idle_poll_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

// ============================================================================
// Reconnect
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Wait after a failed open
    #[serde(default = "default_connect_retry_secs")]
    pub connect_retry_secs: u64,

    /// Wait after an established link drops
    #[serde(default = "default_drop_backoff_secs")]
    pub drop_backoff_secs: u64,
}

fn default_connect_retry_secs() -> u64 { defaults::CONNECT_RETRY_SECS }
fn default_drop_backoff_secs() -> u64 { defaults::DROP_BACKOFF_SECS }

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            connect_retry_secs: default_connect_retry_secs(),
            drop_backoff_secs: default_drop_backoff_secs(),
        }
    }
}

impl ReconnectConfig {
    pub fn connect_retry(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }

    pub fn drop_backoff(&self) -> Duration {
        Duration::from_secs(self.drop_backoff_secs)
    }
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Feature window capacity; the model path needs a full window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Model predictions below this confidence are forced to AI_SAFE
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Samples fed to the trend regression
    #[serde(default = "default_trend_samples")]
    pub trend_samples: usize,

    /// Device sample period, converts extrapolated samples to seconds
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: f64,
}

fn default_window_size() -> usize { defaults::FEATURE_WINDOW_SIZE }
fn default_confidence_threshold() -> f64 { defaults::CONFIDENCE_THRESHOLD }
fn default_trend_samples() -> usize { defaults::TREND_SAMPLES }
fn default_sample_interval_secs() -> f64 { defaults::SAMPLE_INTERVAL_SECS }

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            confidence_threshold: default_confidence_threshold(),
            trend_samples: default_trend_samples(),
            sample_interval_secs: default_sample_interval_secs(),
        }
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Explicit artifact path. When unset the standard search path is used.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// Archive
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_enabled")]
    pub enabled: bool,

    #[serde(default = "default_archive_interval_secs")]
    pub interval_secs: u64,

    /// Directory receiving `readings.jsonl` and `alerts.jsonl`
    #[serde(default = "default_archive_dir")]
    pub directory: PathBuf,
}

fn default_archive_enabled() -> bool { true }
fn default_archive_interval_secs() -> u64 { defaults::ARCHIVE_INTERVAL_SECS }
fn default_archive_dir() -> PathBuf {
    PathBuf::from(defaults::ARCHIVE_DIR)
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_archive_enabled(),
            interval_secs: default_archive_interval_secs(),
            directory: default_archive_dir(),
        }
    }
}

impl ArchiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = SentinelConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: SentinelConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.idle_poll_ms, 5);
        assert_eq!(config.reconnect.connect_retry_secs, 10);
        assert_eq!(config.reconnect.drop_backoff_secs, 5);
        assert_eq!(config.classifier.window_size, 60);
        assert_eq!(config.classifier.confidence_threshold, 0.45);
        assert!(config.model.path.is_none());
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[serial]
port = "COM4"

[classifier]
confidence_threshold = 0.6
"#;
        let config: SentinelConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.serial.port, "COM4");
        assert_eq!(config.classifier.confidence_threshold, 0.6);
        // Non-overridden values retain defaults
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.classifier.window_size, 60);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = SentinelConfig::default();
        config.serial.idle_poll_ms = 0;
        config.classifier.confidence_threshold = 1.5;
        config.classifier.trend_samples = 100;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 3, "got: {errors:?}");
                assert!(errors.iter().any(|e| e.contains("idle_poll_ms")));
                assert!(errors.iter().any(|e| e.contains("confidence_threshold")));
                assert!(errors.iter().any(|e| e.contains("trend_samples")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_backoff_rejected() {
        let mut config = SentinelConfig::default();
        config.reconnect.connect_retry_secs = 0;
        assert!(config.validate().is_err(), "Zero retry backoff would busy-loop");
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = SentinelConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[reconnect]"));
        let back: SentinelConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(back.serial.port, original.serial.port);
        assert_eq!(back.archive.interval_secs, original.archive.interval_secs);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gas_sentinel.toml");
        std::fs::write(&path, "[serial]\nbaud_rate = 0\n").unwrap();
        let result = SentinelConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_from_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gas_sentinel.toml");
        std::fs::write(&path, "[serial\nport = ").unwrap();
        let result = SentinelConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_, _))));
    }
}
