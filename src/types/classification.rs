//! Risk labels, device commands and the per-reading classification result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Predicted risk class. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLabel {
    Safe,
    Warn,
    Critical,
}

impl RiskLabel {
    /// Wire/class-label spelling used by the trained model and the dashboard.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Warn => "WARN",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a model class label. Accepts the short `CRIT` alias.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "SAFE" => Some(Self::Safe),
            "WARN" | "WARNING" => Some(Self::Warn),
            "CRITICAL" | "CRIT" => Some(Self::Critical),
            _ => None,
        }
    }

    pub const fn command(self) -> AiCommand {
        match self {
            Self::Safe => AiCommand::Safe,
            Self::Warn => AiCommand::Warn,
            Self::Critical => AiCommand::Critical,
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command token written back to the microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AiCommand {
    #[serde(rename = "AI_SAFE")]
    Safe,
    #[serde(rename = "AI_WARN")]
    Warn,
    #[serde(rename = "AI_CRITICAL")]
    Critical,
}

impl AiCommand {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "AI_SAFE",
            Self::Warn => "AI_WARN",
            Self::Critical => "AI_CRITICAL",
        }
    }

    /// Newline-terminated ASCII frame as sent over the serial link.
    pub fn wire_frame(self) -> String {
        format!("{}\n", self.as_str())
    }
}

impl fmt::Display for AiCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dashboard-facing status derived from the voltage zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskStatus {
    Safe,
    Warning,
    Danger,
}

impl RiskStatus {
    /// Lowest command this zone allows to leave the engine.
    pub const fn command_floor(self) -> AiCommand {
        match self {
            Self::Safe => AiCommand::Safe,
            Self::Warning => AiCommand::Warn,
            Self::Danger => AiCommand::Critical,
        }
    }

    pub const fn is_alerting(self) -> bool {
        matches!(self, Self::Warning | Self::Danger)
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Warning => write!(f, "Warning"),
            Self::Danger => write!(f, "Danger"),
        }
    }
}

/// Which prediction path produced the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Model,
    Threshold,
}

/// Per-class probability breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub safe: f64,
    pub warn: f64,
    pub crit: f64,
}

impl ClassProbabilities {
    /// Assign `confidence` to `label` and split the remainder evenly.
    pub fn from_confidence(label: RiskLabel, confidence: f64) -> Self {
        let rest = (1.0 - confidence) / 2.0;
        match label {
            RiskLabel::Safe => Self { safe: confidence, warn: rest, crit: rest },
            RiskLabel::Warn => Self { safe: rest, warn: confidence, crit: rest },
            RiskLabel::Critical => Self { safe: rest, warn: rest, crit: confidence },
        }
    }
}

/// Result of classifying one accepted reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub prediction: RiskLabel,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    pub ai_command: AiCommand,
    /// Integer risk score in `[0, 100]`
    pub risk_score: u8,
    pub status: RiskStatus,
    pub source: PredictionSource,
    pub probabilities: ClassProbabilities,
    pub classified_at: DateTime<Utc>,
}
