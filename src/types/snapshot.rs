//! Connectivity state and the merged latest-value snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Classification, Reading, SensorValues, TrendForecast};

/// Supervisor lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Serial connectivity as reported to consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub connected: bool,
    /// Last open attempt failed because another process holds the device
    pub port_busy: bool,
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            connected: false,
            port_busy: false,
            last_error: None,
        }
    }
}

impl ConnectionState {
    pub fn connecting() -> Self {
        Self {
            phase: ConnectionPhase::Connecting,
            ..Self::default()
        }
    }

    pub fn connected() -> Self {
        Self {
            phase: ConnectionPhase::Connected,
            connected: true,
            port_busy: false,
            last_error: None,
        }
    }

    pub fn disconnected(port_busy: bool, error: impl Into<String>) -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            connected: false,
            port_busy,
            last_error: Some(error.into()),
        }
    }
}

/// Latest merged view of reading, classification, forecast and connectivity.
///
/// Consumers only ever see this behind an `Arc`; each published version is a
/// fresh value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestSnapshot {
    /// Incremented on every publish
    pub sequence: u64,
    /// Last known value of every sensor field
    pub values: SensorValues,
    pub reading: Option<Reading>,
    pub classification: Option<Classification>,
    pub forecast: Option<TrendForecast>,
    pub connection: ConnectionState,
    /// Most recent accepted line, or a diagnostic while disconnected
    pub raw_log: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for LatestSnapshot {
    fn default() -> Self {
        Self {
            sequence: 0,
            values: SensorValues::default(),
            reading: None,
            classification: None,
            forecast: None,
            connection: ConnectionState::default(),
            raw_log: "Waiting for data...".to_string(),
            updated_at: Utc::now(),
        }
    }
}

impl LatestSnapshot {
    pub fn sensor_connected(&self) -> bool {
        self.connection.connected
    }

    /// `"Xs to Crit"` / `"Xs to Warn"` / `"Stable"` for dashboards.
    pub fn time_to_critical(&self) -> String {
        self.forecast
            .map_or_else(|| "Stable".to_string(), |f| f.summary())
    }
}
