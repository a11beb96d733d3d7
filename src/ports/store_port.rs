//! Persistence gateway port.
//!
//! Every write is insert-or-ignore on the record's natural key, so callers
//! may repeat any call without changing stored state.

use crate::domain::error::StockcastError;
use crate::domain::ohlcv::Bar;
use crate::domain::records::{
    EvaluationRecord, InsertOutcome, InstrumentStatus, ModelType, PendingPrediction, PredictionRecord,
};
use chrono::NaiveDate;

pub trait StorePort {
    /// Creates all tables and indices if they do not exist yet.
    fn initialize_schema(&self) -> Result<(), StockcastError>;

    /// Greatest stored bar date for `instrument`.
    fn latest_synced_date(&self, instrument: &str) -> Result<Option<NaiveDate>, StockcastError>;

    /// Inserts bars in one transaction, skipping existing (date, instrument)
    /// keys. Returns the number of rows actually written.
    fn append_bars(&self, bars: &[Bar]) -> Result<usize, StockcastError>;

    fn insert_prediction(&self, record: &PredictionRecord) -> Result<InsertOutcome, StockcastError>;

    fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<InsertOutcome, StockcastError>;

    /// Prediction for (instrument, model) whose target date is `target_date`.
    fn find_prediction_to_evaluate(
        &self,
        instrument: &str,
        model: &str,
        target_date: NaiveDate,
        model_type: ModelType,
    ) -> Result<Option<PendingPrediction>, StockcastError>;

    /// Row counts and watermark for `instrument`.
    fn instrument_status(&self, instrument: &str) -> Result<InstrumentStatus, StockcastError>;
}
