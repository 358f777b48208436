//! Trend forecast types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction/state of the dominant sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Stable,
    Increasing,
    CriticalActive,
    CriticalStable,
    WarningActive,
    WarningStable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stable => "stable",
            Self::Increasing => "increasing",
            Self::CriticalActive => "critical_active",
            Self::CriticalStable => "critical_stable",
            Self::WarningActive => "warning_active",
            Self::WarningStable => "warning_stable",
        };
        f.write_str(s)
    }
}

/// Linear-extrapolation forecast over the most recent samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub trend: Trend,
    /// Seconds until the warning threshold is crossed, if it will be
    pub time_to_warn: Option<f64>,
    /// Seconds until the critical threshold is crossed, if it will be
    pub time_to_crit: Option<f64>,
}

impl TrendForecast {
    /// Short human string for dashboards, e.g. `"4.2s to Crit"`.
    ///
    /// A zero time-to-critical still reads as `"0s to Crit"`; only an absent
    /// value falls through to the next label.
    pub fn summary(&self) -> String {
        if let Some(t) = self.time_to_crit {
            format!("{t}s to Crit")
        } else if let Some(t) = self.time_to_warn {
            format!("{t}s to Warn")
        } else {
            "Stable".to_string()
        }
    }
}
