//! Decision-tree classifier and regressor over lagged features.
//!
//! Both retrain from scratch on every call: the walk-forward design supplies
//! the training rows and the held-out final row they predict from.

use crate::domain::error::StockcastError;
use crate::domain::features::{Feature, FeatureFrame};
use crate::domain::model::tree::{Criterion, DecisionTree, TreeParams};
use crate::domain::model::walk_forward::build_design;
use crate::domain::model::{DEFAULT_THRESHOLD, PredictiveModel};
use crate::domain::records::{Forecast, ModelType};

/// Inputs shared by both tree models.
pub const TREE_FEATURES: [Feature; 4] = [
    Feature::Volume,
    Feature::LogReturn,
    Feature::Rsi14,
    Feature::Atr14,
];

/// Next-day direction: class 1 when the next log return should clear the threshold.
#[derive(Debug, Clone)]
pub struct DecisionTreeClassModel {
    params: TreeParams,
    threshold: f64,
}

impl DecisionTreeClassModel {
    pub const NAME: &'static str = "DecisionTreeClassifier";

    pub fn new(max_depth: usize, criterion: Criterion, threshold: f64) -> Self {
        Self {
            params: TreeParams {
                max_depth,
                criterion,
                ..TreeParams::default()
            },
            threshold,
        }
    }
}

impl Default for DecisionTreeClassModel {
    fn default() -> Self {
        Self::new(5, Criterion::Gini, DEFAULT_THRESHOLD)
    }
}

impl PredictiveModel for DecisionTreeClassModel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn model_type(&self) -> ModelType {
        ModelType::Classification
    }

    fn features(&self) -> &[Feature] {
        &TREE_FEATURES
    }

    fn classification_threshold(&self) -> f64 {
        self.threshold
    }

    fn train_predict_next(&self, frame: &FeatureFrame) -> Result<Forecast, StockcastError> {
        let design = build_design(frame, self.features(), self.model_type(), self.threshold)?;
        let tree = DecisionTree::fit(self.params, &design.train_rows, &design.train_labels)?;
        let probability = tree.predict(&design.inference_row)?;
        Ok(Forecast::Class {
            class: u8::from(probability > 0.5),
            probability: Some(probability),
        })
    }
}

/// Next-day log return, squared-error splits.
#[derive(Debug, Clone)]
pub struct DecisionTreeRegressModel {
    params: TreeParams,
    threshold: f64,
}

impl DecisionTreeRegressModel {
    pub const NAME: &'static str = "DecisionTreeRegressor";

    pub fn new(max_depth: usize, threshold: f64) -> Self {
        Self {
            params: TreeParams {
                max_depth,
                criterion: Criterion::SquaredError,
                ..TreeParams::default()
            },
            threshold,
        }
    }
}

impl Default for DecisionTreeRegressModel {
    fn default() -> Self {
        Self::new(5, DEFAULT_THRESHOLD)
    }
}

impl PredictiveModel for DecisionTreeRegressModel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn model_type(&self) -> ModelType {
        ModelType::Regression
    }

    fn features(&self) -> &[Feature] {
        &TREE_FEATURES
    }

    fn classification_threshold(&self) -> f64 {
        self.threshold
    }

    fn train_predict_next(&self, frame: &FeatureFrame) -> Result<Forecast, StockcastError> {
        let design = build_design(frame, self.features(), self.model_type(), self.threshold)?;
        let tree = DecisionTree::fit(self.params, &design.train_rows, &design.train_labels)?;
        Ok(Forecast::Return(tree.predict(&design.inference_row)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::enrich;
    use crate::domain::ohlcv::Bar;
    use chrono::{Duration, NaiveDate};

    fn bars(count: usize) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        (0..count)
            .map(|i| {
                let close = 50.0 + (i as f64 * 0.21).sin() * 4.0 + (i as f64 * 0.05).cos() * 2.0;
                Bar {
                    instrument: "AAPL".into(),
                    date: start + Duration::days(i as i64),
                    open: close - 0.3,
                    high: close + 0.8,
                    low: close - 0.9,
                    close,
                    volume: 10_000 + (i as i64 % 11) * 250,
                }
            })
            .collect()
    }

    #[test]
    fn classifier_emits_class_and_probability() {
        let frame = enrich("AAPL", bars(300));
        let model = DecisionTreeClassModel::default();

        match model.train_predict_next(&frame).unwrap() {
            Forecast::Class { class, probability } => {
                let p = probability.unwrap();
                assert!((0.0..=1.0).contains(&p));
                assert_eq!(class, u8::from(p > 0.5));
            }
            other => panic!("expected a class forecast, got {:?}", other),
        }
    }

    #[test]
    fn regressor_emits_finite_return() {
        let frame = enrich("AAPL", bars(300));
        let model = DecisionTreeRegressModel::default();
        match model.train_predict_next(&frame).unwrap() {
            Forecast::Return(r) => assert!(r.is_finite()),
            other => panic!("expected a return forecast, got {:?}", other),
        }
    }

    #[test]
    fn predictions_are_reproducible() {
        let frame = enrich("AAPL", bars(280));
        let model = DecisionTreeClassModel::default();
        assert_eq!(
            model.train_predict_next(&frame).unwrap(),
            model.train_predict_next(&frame).unwrap()
        );
    }

    #[test]
    fn final_row_does_not_change_training() {
        // Same closes, different final-row volume and range: those values only
        // appear as lags of a row that does not exist yet, so neither the fit
        // nor the inference input may see them.
        let base = bars(300);
        let mut shocked = base.clone();
        if let Some(last) = shocked.last_mut() {
            last.high = last.close + 25.0;
            last.low = last.close - 25.0;
            last.volume *= 9;
        }

        let model = DecisionTreeClassModel::default();
        let a = model.train_predict_next(&enrich("AAPL", base)).unwrap();
        let b = model.train_predict_next(&enrich("AAPL", shocked)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unenriched_frame_is_insufficient() {
        let frame = enrich("AAPL", bars(120));
        let err = DecisionTreeClassModel::default()
            .train_predict_next(&frame)
            .unwrap_err();
        assert!(matches!(err, StockcastError::InsufficientData { .. }));
    }

    #[test]
    fn declared_attributes() {
        let model = DecisionTreeClassModel::new(4, Criterion::Entropy, 0.01);
        assert_eq!(model.name(), "DecisionTreeClassifier");
        assert_eq!(model.model_type(), ModelType::Classification);
        assert_eq!(model.features(), &TREE_FEATURES);
        assert_eq!(model.classification_threshold(), 0.01);

        let model = DecisionTreeRegressModel::default();
        assert_eq!(model.name(), "DecisionTreeRegressor");
        assert_eq!(model.model_type(), ModelType::Regression);
        assert_eq!(model.classification_threshold(), DEFAULT_THRESHOLD);
    }
}
