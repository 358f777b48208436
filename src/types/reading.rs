//! Sensor readings as they come off the wire and as they are merged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One timestamped pair of raw sensor voltages.
///
/// Produced once per accepted line and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// MQ-2 (combustible gas / smoke) output voltage
    pub mq2_voltage: f64,
    /// MQ-135 (air quality) output voltage
    pub mq135_voltage: f64,
    /// Time the reading was accepted
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(mq2_voltage: f64, mq135_voltage: f64) -> Self {
        Self {
            mq2_voltage,
            mq135_voltage,
            timestamp: Utc::now(),
        }
    }

    /// Higher of the two channel voltages; drives thresholds and the risk score.
    pub fn max_voltage(&self) -> f64 {
        self.mq2_voltage.max(self.mq135_voltage)
    }
}

/// Fields extracted from a single line. Every field is optional: a line that
/// reports one sensor says nothing about the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mq2_voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mq135_voltage: Option<f64>,
    /// MQ-2 PPM-style value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mq2_gas: Option<f64>,
    /// MQ-135 PPM-style value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mq135_air: Option<f64>,
}

impl PartialReading {
    pub fn is_empty(&self) -> bool {
        self.mq2_voltage.is_none()
            && self.mq135_voltage.is_none()
            && self.mq2_gas.is_none()
            && self.mq135_air.is_none()
    }

    /// True when the line carried at least one voltage, i.e. it can become a [`Reading`].
    pub fn has_voltage(&self) -> bool {
        self.mq2_voltage.is_some() || self.mq135_voltage.is_some()
    }

    /// Overlay the present fields onto `values`, leaving absent ones untouched.
    pub fn merge_into(&self, values: &mut SensorValues) {
        if let Some(v) = self.mq2_voltage {
            values.mq2_voltage = v;
        }
        if let Some(v) = self.mq135_voltage {
            values.mq135_voltage = v;
        }
        if let Some(v) = self.mq2_gas {
            values.mq2_gas = v;
        }
        if let Some(v) = self.mq135_air {
            values.mq135_air = v;
        }
    }
}

/// Last known value of every sensor field, after field-additive merging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorValues {
    pub mq2_voltage: f64,
    pub mq135_voltage: f64,
    pub mq2_gas: f64,
    pub mq135_air: f64,
}

impl Default for SensorValues {
    fn default() -> Self {
        // PPM fields start at the resting baseline the dashboard expects
        Self {
            mq2_voltage: 0.0,
            mq135_voltage: 0.0,
            mq2_gas: 50.0,
            mq135_air: 50.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_absent_fields() {
        let mut values = SensorValues {
            mq2_voltage: 1.1,
            mq135_voltage: 0.4,
            mq2_gas: 385.0,
            mq135_air: 140.0,
        };
        let partial = PartialReading {
            mq135_voltage: Some(0.5),
            mq135_air: Some(175.0),
            ..Default::default()
        };

        partial.merge_into(&mut values);

        assert_eq!(values.mq2_voltage, 1.1);
        assert_eq!(values.mq2_gas, 385.0);
        assert_eq!(values.mq135_voltage, 0.5);
        assert_eq!(values.mq135_air, 175.0);
    }

    #[test]
    fn test_partial_flags() {
        assert!(PartialReading::default().is_empty());
        let ppm_only = PartialReading {
            mq2_gas: Some(120.0),
            ..Default::default()
        };
        assert!(!ppm_only.is_empty());
        assert!(!ppm_only.has_voltage());
    }

    #[test]
    fn test_max_voltage() {
        let r = Reading::new(0.8, 1.7);
        assert_eq!(r.max_voltage(), 1.7);
    }
}
