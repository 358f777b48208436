//! Hybrid risk classifier
//!
//! Two prediction paths, chosen per reading:
//!
//! - **Model**: a loaded [`ProbabilisticClassifier`] and a full feature window.
//!   Label is the most probable class; predictions under the confidence
//!   threshold never trigger action (`AI_SAFE`).
//! - **Threshold**: fixed voltage zones on the higher of the two channels.
//!   Used while the window warms up, when no model is loaded, or when
//!   inference fails.
//!
//! The risk score and dashboard status always come from the voltage zones,
//! and the zone acts as a floor on the outgoing command.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use super::feature_window::FeatureWindow;
use super::model::{LoadedModel, ModelStatus, ProbabilisticClassifier};
use crate::config::defaults::{
    CONFIDENCE_THRESHOLD, CRITICAL_CONFIDENCE, CRITICAL_VOLTAGE, SAFE_CONFIDENCE,
    SATURATION_VOLTAGE, WARN_CONFIDENCE, WARN_VOLTAGE,
};
use crate::types::{
    AiCommand, ClassProbabilities, Classification, PredictionSource, Reading, RiskLabel,
    RiskStatus,
};

/// Output of the model path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelResult {
    pub prediction: RiskLabel,
    pub confidence: f64,
    pub probabilities: ClassProbabilities,
}

/// Output of the voltage-threshold path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdResult {
    pub prediction: RiskLabel,
    pub confidence: f64,
}

/// Which path produced the prediction, and what it said.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictionOutcome {
    Model(ModelResult),
    Threshold(ThresholdResult),
}

impl PredictionOutcome {
    pub fn prediction(&self) -> RiskLabel {
        match self {
            Self::Model(m) => m.prediction,
            Self::Threshold(t) => t.prediction,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::Model(m) => m.confidence,
            Self::Threshold(t) => t.confidence,
        }
    }

    pub fn source(&self) -> PredictionSource {
        match self {
            Self::Model(_) => PredictionSource::Model,
            Self::Threshold(_) => PredictionSource::Threshold,
        }
    }
}

// ============================================================================
// Voltage zones
// ============================================================================

/// Deterministic label on `max(mq2, mq135)`.
pub fn threshold_prediction(max_voltage: f64) -> ThresholdResult {
    let (prediction, confidence) = if max_voltage >= CRITICAL_VOLTAGE {
        (RiskLabel::Critical, CRITICAL_CONFIDENCE)
    } else if max_voltage >= WARN_VOLTAGE {
        (RiskLabel::Warn, WARN_CONFIDENCE)
    } else {
        (RiskLabel::Safe, SAFE_CONFIDENCE)
    };
    ThresholdResult { prediction, confidence }
}

pub fn risk_status(max_voltage: f64) -> RiskStatus {
    if max_voltage >= CRITICAL_VOLTAGE {
        RiskStatus::Danger
    } else if max_voltage >= WARN_VOLTAGE {
        RiskStatus::Warning
    } else {
        RiskStatus::Safe
    }
}

/// Piecewise-linear score: Safe zone maps to 0..49, Warning to 50..89,
/// Danger to 90..100 saturating at 3.0 V.
pub fn risk_score(max_voltage: f64) -> u8 {
    let v = max_voltage;
    let score = if v >= SATURATION_VOLTAGE {
        100.0
    } else if v >= CRITICAL_VOLTAGE {
        90.0 + ((v - CRITICAL_VOLTAGE) / (SATURATION_VOLTAGE - CRITICAL_VOLTAGE)) * 10.0
    } else if v >= WARN_VOLTAGE {
        50.0 + ((v - WARN_VOLTAGE) / (CRITICAL_VOLTAGE - WARN_VOLTAGE)) * 39.0
    } else {
        (v / WARN_VOLTAGE) * 49.0
    };
    // NaN clamps to 0 through the saturating cast
    score.clamp(0.0, 100.0) as u8
}

// ============================================================================
// Classifier
// ============================================================================

pub struct RiskClassifier {
    model: Option<Arc<dyn ProbabilisticClassifier>>,
    confidence_threshold: f64,
    status: ModelStatus,
    /// Set while inference keeps failing so the error is logged once per streak
    inference_failing: bool,
}

impl RiskClassifier {
    pub fn new(loaded: Option<LoadedModel>, confidence_threshold: f64) -> Self {
        match loaded {
            Some(l) => {
                let status = ModelStatus::for_model(l.model.as_ref(), l.metadata.as_ref());
                Self {
                    model: Some(l.model),
                    confidence_threshold,
                    status,
                    inference_failing: false,
                }
            }
            None => Self::threshold_only(confidence_threshold),
        }
    }

    pub fn with_model(model: Arc<dyn ProbabilisticClassifier>, confidence_threshold: f64) -> Self {
        let status = ModelStatus::for_model(model.as_ref(), None);
        Self {
            model: Some(model),
            confidence_threshold,
            status,
            inference_failing: false,
        }
    }

    pub fn threshold_only(confidence_threshold: f64) -> Self {
        Self {
            model: None,
            confidence_threshold,
            status: ModelStatus::default(),
            inference_failing: false,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    /// Pick a path and predict. Falls back to thresholds on any model problem.
    pub fn predict(&mut self, max_voltage: f64, window: &FeatureWindow) -> PredictionOutcome {
        if let Some(result) = self.predict_with_model(window) {
            return PredictionOutcome::Model(result);
        }
        PredictionOutcome::Threshold(threshold_prediction(max_voltage))
    }

    fn predict_with_model(&mut self, window: &FeatureWindow) -> Option<ModelResult> {
        let model = self.model.as_ref()?;
        let features = window.features()?;

        let proba = match model.predict_proba(&features) {
            Ok(p) => p,
            Err(e) => {
                if !self.inference_failing {
                    error!(error = %e, "Model inference failed, using voltage thresholds");
                    self.inference_failing = true;
                }
                return None;
            }
        };
        if self.inference_failing {
            info!("Model inference recovered");
            self.inference_failing = false;
        }

        let classes = model.classes();
        let (best, confidence) = proba
            .iter()
            .copied()
            .enumerate()
            .fold(None, |acc: Option<(usize, f64)>, (i, p)| match acc {
                Some((_, best_p)) if best_p >= p => acc,
                _ => Some((i, p)),
            })?;
        let prediction = *classes.get(best)?;

        let mut probabilities = ClassProbabilities::default();
        for (label, p) in classes.iter().zip(&proba) {
            match label {
                RiskLabel::Safe => probabilities.safe = *p,
                RiskLabel::Warn => probabilities.warn = *p,
                RiskLabel::Critical => probabilities.crit = *p,
            }
        }

        self.status.record(prediction, confidence, Utc::now());
        Some(ModelResult {
            prediction,
            confidence,
            probabilities,
        })
    }

    /// Full classification of one accepted reading against the current window.
    ///
    /// The window is expected to already contain `reading`.
    pub fn classify(&mut self, reading: &Reading, window: &FeatureWindow) -> Classification {
        let max_voltage = reading.max_voltage();
        let outcome = self.predict(max_voltage, window);
        let status = risk_status(max_voltage);

        let (path_command, probabilities) = match &outcome {
            PredictionOutcome::Model(m) => {
                let cmd = if m.confidence < self.confidence_threshold {
                    AiCommand::Safe
                } else {
                    m.prediction.command()
                };
                (cmd, m.probabilities)
            }
            PredictionOutcome::Threshold(t) => (
                t.prediction.command(),
                ClassProbabilities::from_confidence(t.prediction, t.confidence),
            ),
        };

        Classification {
            prediction: outcome.prediction(),
            confidence: outcome.confidence(),
            ai_command: path_command.max(status.command_floor()),
            risk_score: risk_score(max_voltage),
            status,
            source: outcome.source(),
            probabilities,
            classified_at: Utc::now(),
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::threshold_only(CONFIDENCE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::feature_window::FeatureVector;
    use crate::ml_engine::model::{tests::STUMP_FOREST, ModelError, RandomForestModel};

    struct FixedModel(Vec<f64>);

    impl ProbabilisticClassifier for FixedModel {
        fn classes(&self) -> &[RiskLabel] {
            &[RiskLabel::Safe, RiskLabel::Warn, RiskLabel::Critical]
        }

        fn predict_proba(&self, _: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenModel;

    impl ProbabilisticClassifier for BrokenModel {
        fn classes(&self) -> &[RiskLabel] {
            &[RiskLabel::Safe, RiskLabel::Warn, RiskLabel::Critical]
        }

        fn predict_proba(&self, _: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            Err(ModelError::Inference("shape mismatch".to_string()))
        }
    }

    fn full_window(mq2: f64, mq135: f64) -> FeatureWindow {
        let mut w = FeatureWindow::new(60);
        for _ in 0..60 {
            w.push(mq2, mq135);
        }
        w
    }

    #[test]
    fn test_threshold_zones() {
        assert_eq!(threshold_prediction(0.8).prediction, RiskLabel::Safe);
        assert_eq!(threshold_prediction(1.5).prediction, RiskLabel::Warn);
        assert_eq!(threshold_prediction(1.99).confidence, 0.85);
        assert_eq!(threshold_prediction(2.0).prediction, RiskLabel::Critical);
        assert_eq!(threshold_prediction(2.0).confidence, 0.95);
    }

    #[test]
    fn test_risk_score_zone_boundaries() {
        assert_eq!(risk_score(0.0), 0);
        assert_eq!(risk_score(0.75), 24);
        assert_eq!(risk_score(1.49), 48);
        assert_eq!(risk_score(1.5), 50);
        assert_eq!(risk_score(1.75), 69);
        assert_eq!(risk_score(2.0), 90);
        assert_eq!(risk_score(2.5), 95);
        assert_eq!(risk_score(3.0), 100);
        assert_eq!(risk_score(4.8), 100);
        assert_eq!(risk_score(-0.3), 0);
    }

    #[test]
    fn test_threshold_path_without_model() {
        let mut classifier = RiskClassifier::default();
        let window = full_window(1.7, 0.4);
        let c = classifier.classify(&Reading::new(1.7, 0.4), &window);
        assert_eq!(c.source, PredictionSource::Threshold);
        assert_eq!(c.prediction, RiskLabel::Warn);
        assert_eq!(c.ai_command, AiCommand::Warn);
        assert_eq!(c.status, RiskStatus::Warning);
        assert!((c.probabilities.warn - 0.85).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_path_while_warming_up() {
        let mut classifier =
            RiskClassifier::with_model(Arc::new(FixedModel(vec![0.0, 0.0, 1.0])), 0.45);
        let mut window = FeatureWindow::new(60);
        window.push(0.5, 0.3);
        let c = classifier.classify(&Reading::new(0.5, 0.3), &window);
        assert_eq!(c.source, PredictionSource::Threshold);
        assert_eq!(c.prediction, RiskLabel::Safe);
        assert_eq!(classifier.status().total_predictions, 0);
    }

    #[test]
    fn test_model_path_with_full_window() {
        let mut classifier =
            RiskClassifier::with_model(Arc::new(FixedModel(vec![0.1, 0.7, 0.2])), 0.45);
        let window = full_window(0.9, 0.4);
        let c = classifier.classify(&Reading::new(0.9, 0.4), &window);
        assert_eq!(c.source, PredictionSource::Model);
        assert_eq!(c.prediction, RiskLabel::Warn);
        assert!((c.confidence - 0.7).abs() < 1e-12);
        assert_eq!(c.ai_command, AiCommand::Warn);
        // Score and status stay voltage-derived
        assert_eq!(c.status, RiskStatus::Safe);
        assert_eq!(c.risk_score, 29);
        assert_eq!(classifier.status().total_predictions, 1);
    }

    #[test]
    fn test_low_confidence_never_triggers_action() {
        let mut classifier =
            RiskClassifier::with_model(Arc::new(FixedModel(vec![0.3, 0.3, 0.4])), 0.45);
        let window = full_window(0.9, 0.4);
        let c = classifier.classify(&Reading::new(0.9, 0.4), &window);
        assert_eq!(c.prediction, RiskLabel::Critical);
        assert_eq!(c.ai_command, AiCommand::Safe);
    }

    #[test]
    fn test_zone_floor_escalates_command() {
        // Model says SAFE with conviction, but the voltage is in the danger zone
        let mut classifier =
            RiskClassifier::with_model(Arc::new(FixedModel(vec![0.9, 0.05, 0.05])), 0.45);
        let window = full_window(2.3, 0.4);
        let c = classifier.classify(&Reading::new(2.3, 0.4), &window);
        assert_eq!(c.prediction, RiskLabel::Safe);
        assert_eq!(c.ai_command, AiCommand::Critical);
        assert_eq!(c.status, RiskStatus::Danger);
    }

    #[test]
    fn test_inference_failure_falls_back() {
        let mut classifier = RiskClassifier::with_model(Arc::new(BrokenModel), 0.45);
        let window = full_window(2.1, 0.4);
        for _ in 0..3 {
            let c = classifier.classify(&Reading::new(2.1, 0.4), &window);
            assert_eq!(c.source, PredictionSource::Threshold);
            assert_eq!(c.prediction, RiskLabel::Critical);
            assert_eq!(c.ai_command, AiCommand::Critical);
        }
        assert!(classifier.inference_failing);
    }

    #[test]
    fn test_forest_artifact_end_to_end() {
        let model = RandomForestModel::from_json(STUMP_FOREST).unwrap();
        let mut classifier = RiskClassifier::with_model(Arc::new(model), 0.45);
        let window = full_window(2.2, 0.4);
        let c = classifier.classify(&Reading::new(2.2, 0.4), &window);
        assert_eq!(c.source, PredictionSource::Model);
        assert_eq!(c.prediction, RiskLabel::Critical);
        assert!((c.probabilities.crit - 0.7).abs() < 1e-12);
        assert!((c.probabilities.warn - 0.3).abs() < 1e-12);
    }
}
