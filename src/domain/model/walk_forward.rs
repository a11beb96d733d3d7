//! Lag/label design shared by every model.
//!
//! Row `i` of the design holds lags 1..=[`LAGS`] of each declared feature,
//! i.e. values from rows `i-1 ..= i-LAGS`, ordered lag-major then by feature.
//! Its label is derived from row `i+1`'s log return. Rows without a full lag
//! window are dropped, the final row has no label and becomes the inference
//! input, and everything before it with a label forms the training set.

use crate::domain::error::StockcastError;
use crate::domain::evaluation::classify_return;
use crate::domain::features::{Feature, FeatureFrame};
use crate::domain::records::ModelType;

pub const LAGS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    pub train_rows: Vec<Vec<f64>>,
    pub train_labels: Vec<f64>,
    pub inference_row: Vec<f64>,
}

fn insufficient(frame: &FeatureFrame, reason: String) -> StockcastError {
    StockcastError::InsufficientData {
        instrument: frame.instrument().to_string(),
        reason,
    }
}

fn lagged_row(columns: &[Vec<f64>], row: usize) -> Vec<f64> {
    (1..=LAGS)
        .flat_map(|lag| columns.iter().map(move |col| col[row - lag]))
        .collect()
}

/// Builds the train set and the held-out inference row for `frame`.
pub fn build_design(
    frame: &FeatureFrame,
    features: &[Feature],
    model_type: ModelType,
    threshold: f64,
) -> Result<Design, StockcastError> {
    let mut columns = Vec::with_capacity(features.len());
    for feature in features {
        let column = frame
            .column(*feature)
            .ok_or_else(|| insufficient(frame, format!("missing feature column {}", feature)))?;
        columns.push(column);
    }
    let returns = frame
        .column(Feature::LogReturn)
        .ok_or_else(|| insufficient(frame, "missing log_return column".to_string()))?;

    let n = frame.len();
    if n <= LAGS {
        return Err(insufficient(
            frame,
            format!("{} rows leave no complete {}-lag window", n, LAGS),
        ));
    }
    let last = n - 1;

    let mut train_rows = Vec::new();
    let mut train_labels = Vec::new();
    for row in LAGS..last {
        let next_return = returns[row + 1];
        let label = match model_type {
            ModelType::Classification => f64::from(classify_return(next_return, threshold)),
            ModelType::Regression => next_return,
        };
        train_rows.push(lagged_row(&columns, row));
        train_labels.push(label);
    }

    if train_rows.is_empty() {
        return Err(insufficient(frame, "training set is empty".to_string()));
    }

    let inference_row = lagged_row(&columns, last);
    if let Some(bad) = train_rows
        .iter()
        .chain(std::iter::once(&inference_row))
        .flatten()
        .chain(&train_labels)
        .find(|v| !v.is_finite())
    {
        return Err(StockcastError::Model {
            reason: format!("non-finite value {} in design for {}", bad, frame.instrument()),
        });
    }

    Ok(Design {
        train_rows,
        train_labels,
        inference_row,
    })
}
