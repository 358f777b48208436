//! Gas Sentinel: MQ-2 / MQ-135 gas and smoke risk engine
//!
//! Ingests voltage lines from a microcontroller over a serial link, classifies
//! the current risk level, forecasts time-to-threshold and writes edge-triggered
//! `AI_SAFE` / `AI_WARN` / `AI_CRITICAL` commands back to the device.
//!
//! ## Architecture
//!
//! - **Acquisition**: line protocol parser, serial link seam, reconnecting supervisor
//! - **ML Engine**: rolling feature window, random forest artifact, hybrid
//!   model/threshold classifier, trend forecast
//! - **Pipeline**: per-line processor, lock-free telemetry snapshot, archiver
//! - **Config**: TOML configuration with built-in defaults

pub mod acquisition;
pub mod config;
pub mod ml_engine;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::SentinelConfig;

// Re-export commonly used types
pub use types::{
    AiCommand, Classification, ConnectionState, LatestSnapshot, PartialReading, Reading,
    RiskLabel, RiskStatus, SensorValues, Trend, TrendForecast,
};

// Re-export engine components
pub use acquisition::{parse_line, ConnectionSupervisor, PortOpener, SerialLink, SupervisorSettings};
pub use ml_engine::{FeatureWindow, RiskClassifier, TrendForecaster};
pub use pipeline::{Archiver, ReadingProcessor, TelemetrySink};
