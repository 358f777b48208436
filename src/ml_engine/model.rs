//! Pre-trained risk model artifact
//!
//! The classifier is a random forest exported to JSON in node-array form,
//! one entry per tree:
//!
//! ```json
//! {
//!   "model_type": "RandomForestClassifier",
//!   "classes": ["CRITICAL", "SAFE", "WARN"],
//!   "feature_names": ["mq2_now", "mq135_now", ...],
//!   "trees": [{
//!     "children_left": [1, -1, -1],
//!     "children_right": [2, -1, -1],
//!     "feature": [0, -2, -2],
//!     "threshold": [1.5, -2.0, -2.0],
//!     "value": [[10, 40, 5], [0, 40, 2], [10, 0, 3]]
//!   }]
//! }
//! ```
//!
//! A node with `children_left == -1` is a leaf. Splits send `x <= threshold`
//! left. Per-class probability is the mean over trees of the normalised leaf
//! class counts.
//!
//! Loading never aborts the engine: a missing or broken artifact leaves the
//! classifier on its threshold path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::feature_window::{FeatureVector, FEATURE_NAMES};
use crate::config::defaults::{
    MODEL_FILE_NAME, MODEL_METADATA_FILE_NAME, MODEL_PATH_ENV, MODEL_SEARCH_DIRS,
};
use crate::types::RiskLabel;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model artifact {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Model uses unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("Model uses unknown class label '{0}'")]
    UnknownClass(String),

    #[error("Invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Anything that maps a feature vector to per-class probabilities.
pub trait ProbabilisticClassifier: Send + Sync {
    /// Class labels, in the order `predict_proba` reports them.
    fn classes(&self) -> &[RiskLabel];

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError>;

    fn model_type(&self) -> &str {
        "custom"
    }
}

// ============================================================================
// Artifact format
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct ForestArtifact {
    #[serde(default = "default_model_type")]
    model_type: String,
    classes: Vec<String>,
    feature_names: Vec<String>,
    trees: Vec<TreeArtifact>,
}

fn default_model_type() -> String {
    "RandomForestClassifier".to_string()
}

#[derive(Debug, Clone, Deserialize)]
struct TreeArtifact {
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        input: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(Vec<f64>),
}

#[derive(Debug, Clone)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn from_artifact(tree: TreeArtifact, n_inputs: usize, n_classes: usize) -> Result<Self, ModelError> {
        let n = tree.children_left.len();
        if n == 0 {
            return Err(ModelError::InvalidArtifact("tree has no nodes".to_string()));
        }
        if tree.children_right.len() != n
            || tree.feature.len() != n
            || tree.threshold.len() != n
            || tree.value.len() != n
        {
            return Err(ModelError::InvalidArtifact(
                "tree arrays have mismatched lengths".to_string(),
            ));
        }

        let child = |idx: i64| -> Result<usize, ModelError> {
            usize::try_from(idx)
                .ok()
                .filter(|&i| i < n)
                .ok_or_else(|| ModelError::InvalidArtifact(format!("child index {idx} out of range")))
        };

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            if tree.children_left[i] < 0 {
                let counts = &tree.value[i];
                if counts.len() != n_classes {
                    return Err(ModelError::InvalidArtifact(format!(
                        "leaf {i} has {} class counts, expected {n_classes}",
                        counts.len()
                    )));
                }
                let total: f64 = counts.iter().sum();
                if !(total > 0.0) {
                    return Err(ModelError::InvalidArtifact(format!("leaf {i} has no samples")));
                }
                nodes.push(Node::Leaf(counts.iter().map(|c| c / total).collect()));
            } else {
                let input = usize::try_from(tree.feature[i])
                    .ok()
                    .filter(|&f| f < n_inputs)
                    .ok_or_else(|| {
                        ModelError::InvalidArtifact(format!("node {i} splits on feature {}", tree.feature[i]))
                    })?;
                nodes.push(Node::Split {
                    input,
                    threshold: tree.threshold[i],
                    left: child(tree.children_left[i])?,
                    right: child(tree.children_right[i])?,
                });
            }
        }
        Ok(Self { nodes })
    }

    fn leaf_distribution(&self, inputs: &[f64]) -> Result<&[f64], ModelError> {
        let mut idx = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            match &self.nodes[idx] {
                Node::Leaf(dist) => return Ok(dist.as_slice()),
                Node::Split { input, threshold, left, right } => {
                    idx = if inputs[*input] <= *threshold { *left } else { *right };
                }
            }
        }
        Err(ModelError::Inference("tree traversal did not reach a leaf".to_string()))
    }
}

// ============================================================================
// Random forest
// ============================================================================

/// Random forest loaded from a JSON artifact.
#[derive(Debug, Clone)]
pub struct RandomForestModel {
    model_type: String,
    classes: Vec<RiskLabel>,
    /// Model input position -> canonical feature position
    input_map: Vec<usize>,
    trees: Vec<DecisionTree>,
}

impl RandomForestModel {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents).map_err(|e| match e {
            ModelError::Parse { source, .. } => ModelError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        let artifact: ForestArtifact =
            serde_json::from_str(json).map_err(|source| ModelError::Parse {
                path: PathBuf::new(),
                source,
            })?;
        Self::from_artifact(artifact)
    }

    fn from_artifact(artifact: ForestArtifact) -> Result<Self, ModelError> {
        let classes = artifact
            .classes
            .iter()
            .map(|c| RiskLabel::from_label(c).ok_or_else(|| ModelError::UnknownClass(c.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        if classes.is_empty() {
            return Err(ModelError::InvalidArtifact("no classes".to_string()));
        }

        let input_map = artifact
            .feature_names
            .iter()
            .map(|name| {
                FEATURE_NAMES
                    .iter()
                    .position(|canonical| canonical == name)
                    .ok_or_else(|| ModelError::UnknownFeature(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if artifact.trees.is_empty() {
            return Err(ModelError::InvalidArtifact("forest has no trees".to_string()));
        }
        let trees = artifact
            .trees
            .into_iter()
            .map(|t| DecisionTree::from_artifact(t, input_map.len(), classes.len()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            model_type: artifact.model_type,
            classes,
            input_map,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl ProbabilisticClassifier for RandomForestModel {
    fn classes(&self) -> &[RiskLabel] {
        &self.classes
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        let canonical = features.as_array();
        if canonical.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::Inference("non-finite feature value".to_string()));
        }
        let inputs: Vec<f64> = self.input_map.iter().map(|&i| canonical[i]).collect();

        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.leaf_distribution(&inputs)?) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }

    fn model_type(&self) -> &str {
        &self.model_type
    }
}

// ============================================================================
// Metadata & status
// ============================================================================

/// Companion record written next to the artifact at training time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub n_estimators: Option<u32>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub training_accuracy: Option<f64>,
    #[serde(default)]
    pub test_accuracy: Option<f64>,
    /// Percent importance per feature name
    #[serde(default)]
    pub feature_importance: BTreeMap<String, f64>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ModelMetadata {
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ModelError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Observability view of the model and its recent use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_loaded: bool,
    pub model_type: Option<String>,
    pub classes: Vec<String>,
    /// Held-out accuracy, percent
    pub model_accuracy: Option<f64>,
    pub feature_importance: BTreeMap<String, f64>,
    pub last_prediction: Option<RiskLabel>,
    pub last_confidence: Option<f64>,
    pub prediction_time: Option<DateTime<Utc>>,
    /// Model-path predictions only
    pub total_predictions: u64,
}

impl ModelStatus {
    pub fn for_model(model: &dyn ProbabilisticClassifier, metadata: Option<&ModelMetadata>) -> Self {
        Self {
            model_loaded: true,
            model_type: Some(model.model_type().to_string()),
            classes: model.classes().iter().map(|c| c.as_str().to_string()).collect(),
            model_accuracy: metadata.and_then(|m| m.test_accuracy).map(|a| a * 100.0),
            feature_importance: metadata
                .map(|m| m.feature_importance.clone())
                .unwrap_or_default(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, label: RiskLabel, confidence: f64, at: DateTime<Utc>) {
        self.last_prediction = Some(label);
        self.last_confidence = Some(confidence);
        self.prediction_time = Some(at);
        self.total_predictions += 1;
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// A model ready for the classifier, plus its metadata when present.
#[derive(Clone)]
pub struct LoadedModel {
    pub model: Arc<dyn ProbabilisticClassifier>,
    pub metadata: Option<ModelMetadata>,
    pub path: PathBuf,
}

/// Resolve the artifact path: explicit path, then `$GAS_SENTINEL_MODEL`,
/// then the `ml_models/` search directories.
pub fn find_model_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return p.exists().then(|| p.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(MODEL_PATH_ENV) {
        let p = PathBuf::from(env_path);
        if p.exists() {
            return Some(p);
        }
        warn!(path = %p.display(), "{} points to non-existent file", MODEL_PATH_ENV);
    }

    MODEL_SEARCH_DIRS
        .iter()
        .map(|dir| Path::new(dir).join(MODEL_FILE_NAME))
        .find(|p| p.exists())
}

/// Locate and load the model. Every failure is logged and yields `None`.
pub fn load_model(explicit: Option<&Path>) -> Option<LoadedModel> {
    let Some(path) = find_model_path(explicit) else {
        warn!("No risk model artifact found, classification will use voltage thresholds");
        return None;
    };

    let model = match RandomForestModel::load(&path) {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load risk model, using voltage thresholds");
            return None;
        }
    };

    let metadata_path = path
        .parent()
        .map(|dir| dir.join(MODEL_METADATA_FILE_NAME))
        .filter(|p| p.exists());
    let metadata = metadata_path.and_then(|p| match ModelMetadata::load(&p) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable model metadata");
            None
        }
    });

    info!(
        path = %path.display(),
        trees = model.n_trees(),
        classes = ?model.classes(),
        "Risk model loaded"
    );

    Some(LoadedModel {
        model: Arc::new(model),
        metadata,
        path,
    })
}
