#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::process::ExitCode;
use stockcast::domain::error::StockcastError;
use stockcast::domain::ohlcv::Bar;
use stockcast::domain::records::{
    EvaluationRecord, InsertOutcome, InstrumentStatus, ModelType, PendingPrediction, PredictionRecord,
};
use stockcast::ports::market_data_port::MarketDataPort;
use stockcast::ports::store_port::StorePort;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// `ExitCode` has no `PartialEq`; compare the debug form.
pub fn is_success(code: ExitCode) -> bool {
    format!("{:?}", code) == format!("{:?}", ExitCode::SUCCESS)
}

/// The `n` Monday-Friday dates ending at `end` (inclusive if `end` is a weekday).
pub fn business_days_ending(end: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut day = end;
    while dates.len() < n {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day -= Duration::days(1);
    }
    dates.reverse();
    dates
}

/// Seeded random-walk bars on business days ending at `end`.
pub fn random_walk_bars(instrument: &str, end: NaiveDate, n: usize, seed: u64) -> Vec<Bar> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut close = 100.0_f64;
    business_days_ending(end, n)
        .into_iter()
        .map(|date| {
            let open = close;
            close = open * (rng.gen_range(-0.02..0.02_f64)).exp();
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            Bar {
                instrument: instrument.to_string(),
                date,
                open,
                high,
                low,
                close,
                volume: rng.gen_range(1_000_000..5_000_000),
            }
        })
        .collect()
}

pub fn csv_content(bars: &[Bar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{:.4},{:.4},{:.4},{:.4},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    out
}

/// In-memory market data source keyed by instrument.
pub struct MockSource {
    pub bars: BTreeMap<String, Vec<Bar>>,
    pub errors: BTreeMap<String, String>,
    pub universe_error: Option<String>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            bars: BTreeMap::new(),
            errors: BTreeMap::new(),
            universe_error: None,
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(instrument.to_string(), bars);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }

    pub fn with_universe_error(mut self, reason: &str) -> Self {
        self.universe_error = Some(reason.to_string());
        self
    }
}

impl MarketDataPort for MockSource {
    fn list_instruments(&self) -> Result<Vec<String>, StockcastError> {
        if let Some(reason) = &self.universe_error {
            return Err(StockcastError::SourceUnavailable {
                instrument: "universe".into(),
                reason: reason.clone(),
            });
        }
        let mut all: Vec<String> = self.bars.keys().chain(self.errors.keys()).cloned().collect();
        all.sort();
        all.dedup();
        Ok(all)
    }

    fn fetch_bars(
        &self,
        instrument: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockcastError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(StockcastError::SourceUnavailable {
                instrument: instrument.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .get(instrument)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Wraps a store and fails chosen operations.
pub struct FlakyStore<S: StorePort> {
    pub inner: S,
    pub fail_append: bool,
    pub fail_predictions: bool,
    pub append_calls: Cell<usize>,
}

impl<S: StorePort> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            fail_append: false,
            fail_predictions: false,
            append_calls: Cell::new(0),
        }
    }

    fn query_error(what: &str) -> StockcastError {
        StockcastError::DatabaseQuery {
            reason: format!("{} rejected", what),
        }
    }
}

impl<S: StorePort> StorePort for FlakyStore<S> {
    fn initialize_schema(&self) -> Result<(), StockcastError> {
        self.inner.initialize_schema()
    }

    fn latest_synced_date(&self, instrument: &str) -> Result<Option<NaiveDate>, StockcastError> {
        self.inner.latest_synced_date(instrument)
    }

    fn append_bars(&self, bars: &[Bar]) -> Result<usize, StockcastError> {
        self.append_calls.set(self.append_calls.get() + 1);
        if self.fail_append {
            return Err(Self::query_error("append"));
        }
        self.inner.append_bars(bars)
    }

    fn insert_prediction(&self, record: &PredictionRecord) -> Result<InsertOutcome, StockcastError> {
        if self.fail_predictions {
            return Err(Self::query_error("prediction"));
        }
        self.inner.insert_prediction(record)
    }

    fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<InsertOutcome, StockcastError> {
        self.inner.insert_evaluation(record)
    }

    fn find_prediction_to_evaluate(
        &self,
        instrument: &str,
        model: &str,
        target_date: NaiveDate,
        model_type: ModelType,
    ) -> Result<Option<PendingPrediction>, StockcastError> {
        self.inner
            .find_prediction_to_evaluate(instrument, model, target_date, model_type)
    }

    fn instrument_status(&self, instrument: &str) -> Result<InstrumentStatus, StockcastError> {
        self.inner.instrument_status(instrument)
    }
}

#[cfg(feature = "sqlite")]
pub fn memory_store() -> stockcast::adapters::sqlite_adapter::SqliteAdapter {
    let store = stockcast::adapters::sqlite_adapter::SqliteAdapter::in_memory().unwrap();
    store.initialize_schema().unwrap();
    store
}
