//! Persisted prediction and evaluation records.

use chrono::NaiveDate;
use std::fmt;

/// Selects the prediction/evaluation table pair and the scoring rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Classification,
    Regression,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Classification => "classification",
            ModelType::Regression => "regression",
        }
    }

    pub fn predictions_table(&self) -> &'static str {
        match self {
            ModelType::Classification => "predictions_classification",
            ModelType::Regression => "predictions_regression",
        }
    }

    pub fn evaluations_table(&self) -> &'static str {
        match self {
            ModelType::Classification => "evaluations_classification",
            ModelType::Regression => "evaluations_regression",
        }
    }

    /// Column holding the model's output in the predictions table.
    pub fn predicted_column(&self) -> &'static str {
        match self {
            ModelType::Classification => "predicted_class",
            ModelType::Regression => "predicted_return",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a model emits for the row after the end of its series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Forecast {
    Class { class: u8, probability: Option<f64> },
    Return(f64),
}

impl Forecast {
    pub fn model_type(&self) -> ModelType {
        match self {
            Forecast::Class { .. } => ModelType::Classification,
            Forecast::Return(_) => ModelType::Regression,
        }
    }

    pub fn predicted_value(&self) -> f64 {
        match self {
            Forecast::Class { class, .. } => f64::from(*class),
            Forecast::Return(r) => *r,
        }
    }
}

/// Natural key: (instrument, model, prediction_date).
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub instrument: String,
    pub model: String,
    pub prediction_date: NaiveDate,
    pub target_date: NaiveDate,
    pub forecast: Forecast,
}

impl PredictionRecord {
    pub fn model_type(&self) -> ModelType {
        self.forecast.model_type()
    }
}

/// A stored prediction whose target date has arrived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingPrediction {
    pub id: i64,
    pub predicted_value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Class {
        predicted_class: i32,
        actual_class: i32,
        correct: bool,
    },
    Return {
        predicted_return: f64,
        error: f64,
        abs_error: f64,
        squared_error: f64,
    },
}

impl Outcome {
    pub fn model_type(&self) -> ModelType {
        match self {
            Outcome::Class { .. } => ModelType::Classification,
            Outcome::Return { .. } => ModelType::Regression,
        }
    }
}

/// Natural key: prediction_id.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub prediction_id: i64,
    pub instrument: String,
    pub model: String,
    pub evaluation_date: NaiveDate,
    pub actual_return: f64,
    pub outcome: Outcome,
}

impl EvaluationRecord {
    pub fn model_type(&self) -> ModelType {
        self.outcome.model_type()
    }
}

/// Result of an insert-or-ignore write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

impl InsertOutcome {
    pub fn from_rows_affected(rows: u64) -> Self {
        if rows == 0 {
            InsertOutcome::AlreadyExists
        } else {
            InsertOutcome::Inserted
        }
    }
}

/// Stored row counts for one instrument across all tables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstrumentStatus {
    pub latest_bar: Option<NaiveDate>,
    pub bars: usize,
    pub predictions: usize,
    pub evaluations: usize,
}
