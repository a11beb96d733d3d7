//! Scoring a stored prediction against the realized return.

use crate::domain::records::{EvaluationRecord, ModelType, Outcome, PendingPrediction};
use chrono::NaiveDate;

/// Next-day label: 1 when the log return strictly exceeds `threshold`.
pub fn classify_return(log_return: f64, threshold: f64) -> u8 {
    u8::from(log_return > threshold)
}

pub fn score(
    model_type: ModelType,
    predicted_value: f64,
    actual_return: f64,
    threshold: f64,
) -> Outcome {
    match model_type {
        ModelType::Classification => {
            let predicted_class = predicted_value.round() as i32;
            let actual_class = i32::from(classify_return(actual_return, threshold));
            Outcome::Class {
                predicted_class,
                actual_class,
                correct: predicted_class == actual_class,
            }
        }
        ModelType::Regression => {
            let error = predicted_value - actual_return;
            Outcome::Return {
                predicted_return: predicted_value,
                error,
                abs_error: error.abs(),
                squared_error: error * error,
            }
        }
    }
}

/// Binds the evaluation to the pending prediction by id.
pub fn evaluate(
    pending: &PendingPrediction,
    instrument: &str,
    model: &str,
    model_type: ModelType,
    evaluation_date: NaiveDate,
    actual_return: f64,
    threshold: f64,
) -> EvaluationRecord {
    EvaluationRecord {
        prediction_id: pending.id,
        instrument: instrument.to_string(),
        model: model.to_string(),
        evaluation_date,
        actual_return,
        outcome: score(model_type, pending.predicted_value, actual_return, threshold),
    }
}
