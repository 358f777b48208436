//! ML Engine for gas/smoke risk assessment
//!
//! ## Architecture
//! - `feature_window`: fixed-capacity rolling window and the 8 summary features
//! - `model`: pre-trained random forest artifact, discovery and status
//! - `classifier`: hybrid model/threshold classifier, risk score and zone floor
//! - `trend`: least-squares time-to-threshold forecast

pub mod classifier;
pub mod feature_window;
pub mod model;
pub mod trend;

pub use classifier::{
    risk_score, risk_status, threshold_prediction, ModelResult, PredictionOutcome,
    RiskClassifier, ThresholdResult,
};
pub use feature_window::{FeatureVector, FeatureWindow, FEATURE_NAMES};
pub use model::{
    find_model_path, load_model, LoadedModel, ModelError, ModelMetadata, ModelStatus,
    ProbabilisticClassifier, RandomForestModel,
};
pub use trend::TrendForecaster;
