//! Time-to-threshold forecasting
//!
//! Fits a least-squares line through the most recent samples of the dominant
//! channel and extrapolates when the warning and critical voltages will be
//! crossed.

use statrs::statistics::Statistics;

use super::feature_window::FeatureWindow;
use crate::config::defaults::{
    CRITICAL_VOLTAGE, SAMPLE_INTERVAL_SECS, TREND_MAX_HORIZON_SAMPLES, TREND_SAMPLES,
    TREND_SLOPE_EPSILON, WARN_VOLTAGE,
};
use crate::types::{Trend, TrendForecast};

#[derive(Debug, Clone, Copy)]
pub struct TrendForecaster {
    samples: usize,
    sample_interval_secs: f64,
}

impl Default for TrendForecaster {
    fn default() -> Self {
        Self::new(TREND_SAMPLES, SAMPLE_INTERVAL_SECS)
    }
}

impl TrendForecaster {
    pub fn new(samples: usize, sample_interval_secs: f64) -> Self {
        Self {
            samples: samples.max(2),
            sample_interval_secs,
        }
    }

    /// `None` until the window holds enough samples for a fit.
    pub fn forecast(&self, window: &FeatureWindow) -> Option<TrendForecast> {
        if window.len() < self.samples {
            return None;
        }
        let (mq2, mq135): (Vec<f64>, Vec<f64>) = window.recent(self.samples).unzip();

        // Ties go to MQ-135
        let series = if Statistics::mean(&mq2) > Statistics::mean(&mq135) {
            mq2
        } else {
            mq135
        };

        // Level is the last raw sample; the fit only supplies the slope
        let (slope, _) = least_squares(&series)?;
        let current = *series.last()?;
        let rising = slope > TREND_SLOPE_EPSILON;

        let forecast = if current >= CRITICAL_VOLTAGE {
            TrendForecast {
                trend: if rising { Trend::CriticalActive } else { Trend::CriticalStable },
                time_to_warn: Some(0.0),
                time_to_crit: Some(0.0),
            }
        } else if current >= WARN_VOLTAGE {
            TrendForecast {
                trend: if rising { Trend::WarningActive } else { Trend::WarningStable },
                time_to_warn: Some(0.0),
                time_to_crit: if rising {
                    self.seconds_until(CRITICAL_VOLTAGE, current, slope)
                } else {
                    None
                },
            }
        } else if rising {
            TrendForecast {
                trend: Trend::Increasing,
                time_to_warn: self.seconds_until(WARN_VOLTAGE, current, slope),
                time_to_crit: self.seconds_until(CRITICAL_VOLTAGE, current, slope),
            }
        } else {
            TrendForecast {
                trend: Trend::Stable,
                time_to_warn: None,
                time_to_crit: None,
            }
        };
        Some(forecast)
    }

    /// Seconds until `threshold` at the current slope, rounded to 0.1 s.
    fn seconds_until(&self, threshold: f64, current: f64, slope: f64) -> Option<f64> {
        let samples = (threshold - current) / slope;
        if samples > 0.0 && samples < TREND_MAX_HORIZON_SAMPLES {
            Some((samples * self.sample_interval_secs * 10.0).round() / 10.0)
        } else {
            None
        }
    }
}

/// Ordinary least squares of `y` against `x = 0..n`. Returns `(slope, intercept)`.
fn least_squares(y: &[f64]) -> Option<(f64, f64)> {
    let n = y.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = Statistics::mean(y);

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &yi) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (yi - y_mean);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    Some((slope, y_mean - slope * x_mean))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_from(mq2: &[f64], mq135: &[f64]) -> FeatureWindow {
        let mut w = FeatureWindow::new(60);
        for (a, b) in mq2.iter().zip(mq135) {
            w.push(*a, *b);
        }
        w
    }

    fn ramp(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_requires_enough_samples() {
        let w = window_from(&ramp(0.5, 0.0, 9), &ramp(0.3, 0.0, 9));
        assert!(TrendForecaster::default().forecast(&w).is_none());
    }

    #[test]
    fn test_least_squares_exact_line() {
        let (m, c) = least_squares(&ramp(1.0, 0.05, 10)).unwrap();
        assert!((m - 0.05).abs() < 1e-12);
        assert!((c - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stable_flat_signal() {
        let w = window_from(&ramp(0.6, 0.0, 10), &ramp(0.4, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::Stable);
        assert_eq!(f.time_to_warn, None);
        assert_eq!(f.time_to_crit, None);
        assert_eq!(f.summary(), "Stable");
    }

    #[test]
    fn test_increasing_extrapolates_both_thresholds() {
        // current = 1.0 + 9 * 0.01 = 1.09
        let w = window_from(&ramp(1.0, 0.01, 10), &ramp(0.3, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::Increasing);
        // (1.5 - 1.09) / 0.01 = 41 samples -> 4.1 s
        assert_eq!(f.time_to_warn, Some(4.1));
        // (2.0 - 1.09) / 0.01 = 91 samples -> 9.1 s
        assert_eq!(f.time_to_crit, Some(9.1));
        assert_eq!(f.summary(), "9.1s to Crit");
    }

    #[test]
    fn test_horizon_limit_drops_far_threshold() {
        // Barely rising from far below: both crossings lie beyond 3000 samples
        let w = window_from(&ramp(-2.0, 0.0011, 10), &ramp(-3.0, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::Increasing);
        assert!(f.time_to_warn.is_none());
        assert!(f.time_to_crit.is_none());
    }

    #[test]
    fn test_critical_zone_reports_zero() {
        let w = window_from(&ramp(2.0, 0.02, 10), &ramp(0.3, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::CriticalActive);
        assert_eq!(f.time_to_crit, Some(0.0));
        assert_eq!(f.time_to_warn, Some(0.0));

        let w = window_from(&ramp(2.4, 0.0, 10), &ramp(0.3, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::CriticalStable);
        assert_eq!(f.time_to_crit, Some(0.0));
    }

    #[test]
    fn test_step_into_critical_reports_zero() {
        let mut mq2 = ramp(1.0, 0.0, 9);
        mq2.push(2.1);
        let w = window_from(&mq2, &ramp(0.3, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::CriticalActive);
        assert_eq!(f.time_to_crit, Some(0.0));
        assert_eq!(f.time_to_warn, Some(0.0));
        assert_eq!(f.summary(), "0s to Crit");
    }

    #[test]
    fn test_falling_but_still_critical_reports_zero() {
        // Slope is negative, last sample is still above the critical line
        let w = window_from(&ramp(2.9, -0.05, 10), &ramp(0.3, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::CriticalStable);
        assert_eq!(f.time_to_crit, Some(0.0));
        assert_eq!(f.time_to_warn, Some(0.0));
    }

    #[test]
    fn test_warning_zone() {
        // current = 1.6 + 9 * 0.02 = 1.78, crit in (2.0 - 1.78) / 0.02 = 11 samples
        let w = window_from(&ramp(1.6, 0.02, 10), &ramp(0.3, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::WarningActive);
        assert_eq!(f.time_to_warn, Some(0.0));
        assert_eq!(f.time_to_crit, Some(1.1));

        let w = window_from(&ramp(1.7, 0.0, 10), &ramp(0.3, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::WarningStable);
        assert_eq!(f.time_to_crit, None);
    }

    #[test]
    fn test_dominant_channel_selection() {
        // MQ-135 higher and rising; MQ-2 lower and flat
        let w = window_from(&ramp(0.2, 0.0, 10), &ramp(1.0, 0.01, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::Increasing);

        // Equal means go to MQ-135, which is flat here
        let w = window_from(&ramp(0.5, 0.0, 10), &ramp(0.5, 0.0, 10));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::Stable);
    }

    #[test]
    fn test_uses_only_most_recent_samples() {
        let mut mq2 = ramp(2.5, 0.0, 30);
        mq2.extend(ramp(0.5, 0.0, 10));
        let w = window_from(&mq2, &ramp(0.3, 0.0, 40));
        let f = TrendForecaster::default().forecast(&w).unwrap();
        assert_eq!(f.trend, Trend::Stable, "older spike must not influence the fit");
    }
}
