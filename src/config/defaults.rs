//! System-wide default constants.
//!
//! Centralises the numbers the classifier, forecaster and supervisor share.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Voltage Zones
// ============================================================================

/// Voltage at which either sensor enters the warning zone (V).
pub const WARN_VOLTAGE: f64 = 1.5;

/// Voltage at which either sensor enters the critical zone (V).
pub const CRITICAL_VOLTAGE: f64 = 2.0;

/// Voltage mapped to a risk score of 100 (V).
pub const SATURATION_VOLTAGE: f64 = 3.0;

/// Threshold-path confidence per zone.
pub const SAFE_CONFIDENCE: f64 = 1.0;
pub const WARN_CONFIDENCE: f64 = 0.85;
pub const CRITICAL_CONFIDENCE: f64 = 0.95;

/// Linear PPM approximation applied to key:value voltages.
pub const PPM_PER_VOLT: f64 = 350.0;

// ============================================================================
// ML Engine
// ============================================================================

/// Feature window capacity (samples). 60 samples ≈ 6 s at 10 Hz.
pub const FEATURE_WINDOW_SIZE: usize = 60;

/// Model predictions below this confidence never trigger action.
pub const CONFIDENCE_THRESHOLD: f64 = 0.45;

/// Samples used by the trend regression.
pub const TREND_SAMPLES: usize = 10;

/// Minimum slope (V/sample) treated as a rising trend.
pub const TREND_SLOPE_EPSILON: f64 = 0.001;

/// Extrapolations beyond this many samples are not reported.
pub const TREND_MAX_HORIZON_SAMPLES: f64 = 3000.0;

/// Device sample period used to convert samples to seconds.
pub const SAMPLE_INTERVAL_SECS: f64 = 0.1;

// ============================================================================
// Serial / Reconnect
// ============================================================================

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Sleep between polls when no bytes are waiting (ms).
pub const IDLE_POLL_MS: u64 = 5;

/// Per-read timeout handed to the serial driver (ms).
pub const READ_TIMEOUT_MS: u64 = 1000;

/// Wait after a failed open before retrying (seconds).
pub const CONNECT_RETRY_SECS: u64 = 10;

/// Wait after an established link drops (seconds).
pub const DROP_BACKOFF_SECS: u64 = 5;

// ============================================================================
// Archiver
// ============================================================================

/// Interval between archive snapshots (seconds).
pub const ARCHIVE_INTERVAL_SECS: u64 = 10;

/// Default directory for JSON-lines archive output.
pub const ARCHIVE_DIR: &str = "./data";

// ============================================================================
// Model Artifact
// ============================================================================

/// Environment variable naming an explicit model artifact path.
pub const MODEL_PATH_ENV: &str = "GAS_SENTINEL_MODEL";

/// File name of the serialized classifier.
pub const MODEL_FILE_NAME: &str = "gas_smoke_rf.json";

/// File name of the companion metadata record.
pub const MODEL_METADATA_FILE_NAME: &str = "model_metadata.json";

/// Directories searched (in order) for the model artifact.
pub const MODEL_SEARCH_DIRS: &[&str] = &["ml_models", "../ml_models", "../../ml_models"];
