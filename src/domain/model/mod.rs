//! Predictive model capability.
//!
//! A model declares its name, output type, feature list and classification
//! threshold, and fits a fresh estimator on every call to
//! [`PredictiveModel::train_predict_next`]. All models share the walk-forward
//! design in [`walk_forward`].

pub mod decision_tree;
pub mod tree;
pub mod walk_forward;

use crate::domain::error::StockcastError;
use crate::domain::features::{Feature, FeatureFrame};
use crate::domain::records::{Forecast, ModelType};
use std::fmt;
use std::str::FromStr;

pub use decision_tree::{DecisionTreeClassModel, DecisionTreeRegressModel};
pub use tree::Criterion;

/// A next-day log return strictly above this is the positive class.
pub const DEFAULT_THRESHOLD: f64 = 0.005;

pub trait PredictiveModel {
    fn name(&self) -> &str;
    fn model_type(&self) -> ModelType;
    fn features(&self) -> &[Feature];
    fn classification_threshold(&self) -> f64 {
        DEFAULT_THRESHOLD
    }

    /// Trains on every labelled row of `frame` and predicts the step after its last row.
    fn train_predict_next(&self, frame: &FeatureFrame) -> Result<Forecast, StockcastError>;
}

/// Model families selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    DecisionTreeClassifier,
    DecisionTreeRegressor,
}

impl ModelKind {
    /// Config section / `[models] enabled` token.
    pub fn key(&self) -> &'static str {
        match self {
            ModelKind::DecisionTreeClassifier => "decision_tree_classifier",
            ModelKind::DecisionTreeRegressor => "decision_tree_regressor",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "decision_tree_classifier" => Ok(ModelKind::DecisionTreeClassifier),
            "decision_tree_regressor" => Ok(ModelKind::DecisionTreeRegressor),
            other => Err(format!("unknown model '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub max_depth: usize,
    pub criterion: Criterion,
    pub threshold: f64,
}

impl ModelConfig {
    pub fn defaults(kind: ModelKind) -> Self {
        let criterion = match kind {
            ModelKind::DecisionTreeClassifier => Criterion::Gini,
            ModelKind::DecisionTreeRegressor => Criterion::SquaredError,
        };
        Self {
            kind,
            max_depth: 5,
            criterion,
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn build(&self) -> Box<dyn PredictiveModel> {
        match self.kind {
            ModelKind::DecisionTreeClassifier => Box::new(DecisionTreeClassModel::new(
                self.max_depth,
                self.criterion,
                self.threshold,
            )),
            ModelKind::DecisionTreeRegressor => {
                Box::new(DecisionTreeRegressModel::new(self.max_depth, self.threshold))
            }
        }
    }
}

pub fn build_models(configs: &[ModelConfig]) -> Vec<Box<dyn PredictiveModel>> {
    configs.iter().map(ModelConfig::build).collect()
}
