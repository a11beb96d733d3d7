//! SQLite persistence adapter.

use crate::domain::config::StoreConfig;
use crate::domain::error::StockcastError;
use crate::domain::ohlcv::Bar;
use crate::domain::records::{
    EvaluationRecord, Forecast, InsertOutcome, InstrumentStatus, ModelType, Outcome,
    PendingPrediction, PredictionRecord,
};
use crate::ports::store_port::StorePort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS market_data (
    date TEXT NOT NULL,
    ticker TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (date, ticker)
);
CREATE TABLE IF NOT EXISTS predictions_classification (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    model TEXT NOT NULL,
    prediction_date TEXT NOT NULL,
    target_date TEXT NOT NULL,
    predicted_class INTEGER NOT NULL,
    probability REAL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (ticker, model, prediction_date)
);
CREATE TABLE IF NOT EXISTS predictions_regression (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticker TEXT NOT NULL,
    model TEXT NOT NULL,
    prediction_date TEXT NOT NULL,
    target_date TEXT NOT NULL,
    predicted_return REAL NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (ticker, model, prediction_date)
);
CREATE TABLE IF NOT EXISTS evaluations_classification (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prediction_id INTEGER NOT NULL UNIQUE
        REFERENCES predictions_classification(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    model TEXT NOT NULL,
    evaluation_date TEXT NOT NULL,
    predicted_class INTEGER NOT NULL,
    actual_class INTEGER NOT NULL,
    correct INTEGER NOT NULL,
    actual_return REAL NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS evaluations_regression (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prediction_id INTEGER NOT NULL UNIQUE
        REFERENCES predictions_regression(id) ON DELETE CASCADE,
    ticker TEXT NOT NULL,
    model TEXT NOT NULL,
    evaluation_date TEXT NOT NULL,
    predicted_return REAL NOT NULL,
    actual_return REAL NOT NULL,
    error REAL NOT NULL,
    abs_error REAL NOT NULL,
    squared_error REAL NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_market_data_ticker_date ON market_data(ticker, date);
CREATE INDEX IF NOT EXISTS idx_pred_class_ticker_model ON predictions_classification(ticker, model, prediction_date);
CREATE INDEX IF NOT EXISTS idx_pred_reg_ticker_model ON predictions_regression(ticker, model, prediction_date);
CREATE INDEX IF NOT EXISTS idx_eval_class_ticker_model ON evaluations_classification(ticker, model, evaluation_date);
CREATE INDEX IF NOT EXISTS idx_eval_reg_ticker_model ON evaluations_regression(ticker, model, evaluation_date);
CREATE INDEX IF NOT EXISTS idx_pred_class_target_date ON predictions_classification(ticker, model, target_date);
CREATE INDEX IF NOT EXISTS idx_pred_reg_target_date ON predictions_regression(ticker, model, target_date);
";

fn query_err(e: rusqlite::Error) -> StockcastError {
    StockcastError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    /// Opens (creating if needed) the database file named in `config`.
    pub fn new(config: &StoreConfig) -> Result<Self, StockcastError> {
        let path = config
            .path
            .as_ref()
            .ok_or_else(|| StockcastError::ConfigMissing {
                section: "store".into(),
                key: "path".into(),
            })?;

        let manager = Self::configure(SqliteConnectionManager::file(path), config.timeout);
        Self::build(manager, config.pool_size, config.timeout)
    }

    /// Private in-memory database. One pooled connection, so every call sees
    /// the same data.
    pub fn in_memory() -> Result<Self, StockcastError> {
        let timeout = Duration::from_secs(5);
        let manager = Self::configure(SqliteConnectionManager::memory(), timeout);
        Self::build(manager, 1, timeout)
    }

    fn configure(manager: SqliteConnectionManager, timeout: Duration) -> SqliteConnectionManager {
        manager.with_init(move |conn| {
            conn.busy_timeout(timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        })
    }

    fn build(
        manager: SqliteConnectionManager,
        pool_size: u32,
        timeout: Duration,
    ) -> Result<Self, StockcastError> {
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_timeout(timeout)
            .build(manager)
            .map_err(|e: r2d2::Error| StockcastError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StockcastError> {
        self.pool.get().map_err(|e: r2d2::Error| StockcastError::Database {
            reason: e.to_string(),
        })
    }

    fn count(&self, sql: &str, instrument: &str) -> Result<usize, StockcastError> {
        let conn = self.conn()?;
        let n: i64 = conn
            .query_row(sql, params![instrument], |row| row.get(0))
            .map_err(query_err)?;
        Ok(n as usize)
    }
}

impl StorePort for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), StockcastError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_err)
    }

    fn latest_synced_date(&self, instrument: &str) -> Result<Option<NaiveDate>, StockcastError> {
        let conn = self.conn()?;
        let latest: Option<String> = conn
            .query_row(
                "SELECT MAX(date) FROM market_data WHERE ticker = ?1",
                params![instrument],
                |row| row.get(0),
            )
            .map_err(query_err)?;

        latest
            .map(|s| {
                NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e: chrono::ParseError| {
                    StockcastError::DatabaseQuery {
                        reason: format!("bad stored date '{}': {}", s, e),
                    }
                })
            })
            .transpose()
    }

    fn append_bars(&self, bars: &[Bar]) -> Result<usize, StockcastError> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let mut inserted = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO market_data (date, ticker, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (date, ticker) DO NOTHING",
                )
                .map_err(query_err)?;

            for bar in bars {
                inserted += stmt
                    .execute(params![
                        fmt_date(bar.date),
                        bar.instrument,
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume
                    ])
                    .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;

        Ok(inserted)
    }

    fn insert_prediction(&self, record: &PredictionRecord) -> Result<InsertOutcome, StockcastError> {
        let conn = self.conn()?;
        let rows = match record.forecast {
            Forecast::Class { class, probability } => conn.execute(
                "INSERT INTO predictions_classification
                     (ticker, model, prediction_date, target_date, predicted_class, probability)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (ticker, model, prediction_date) DO NOTHING",
                params![
                    record.instrument,
                    record.model,
                    fmt_date(record.prediction_date),
                    fmt_date(record.target_date),
                    i64::from(class),
                    probability
                ],
            ),
            Forecast::Return(predicted_return) => conn.execute(
                "INSERT INTO predictions_regression
                     (ticker, model, prediction_date, target_date, predicted_return)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (ticker, model, prediction_date) DO NOTHING",
                params![
                    record.instrument,
                    record.model,
                    fmt_date(record.prediction_date),
                    fmt_date(record.target_date),
                    predicted_return
                ],
            ),
        }
        .map_err(query_err)?;

        Ok(InsertOutcome::from_rows_affected(rows as u64))
    }

    fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<InsertOutcome, StockcastError> {
        let conn = self.conn()?;
        let rows = match record.outcome {
            Outcome::Class {
                predicted_class,
                actual_class,
                correct,
            } => conn.execute(
                "INSERT INTO evaluations_classification
                     (prediction_id, ticker, model, evaluation_date,
                      predicted_class, actual_class, correct, actual_return)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT (prediction_id) DO NOTHING",
                params![
                    record.prediction_id,
                    record.instrument,
                    record.model,
                    fmt_date(record.evaluation_date),
                    predicted_class,
                    actual_class,
                    correct,
                    record.actual_return
                ],
            ),
            Outcome::Return {
                predicted_return,
                error,
                abs_error,
                squared_error,
            } => conn.execute(
                "INSERT INTO evaluations_regression
                     (prediction_id, ticker, model, evaluation_date, predicted_return,
                      actual_return, error, abs_error, squared_error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (prediction_id) DO NOTHING",
                params![
                    record.prediction_id,
                    record.instrument,
                    record.model,
                    fmt_date(record.evaluation_date),
                    predicted_return,
                    record.actual_return,
                    error,
                    abs_error,
                    squared_error
                ],
            ),
        }
        .map_err(query_err)?;

        Ok(InsertOutcome::from_rows_affected(rows as u64))
    }

    fn find_prediction_to_evaluate(
        &self,
        instrument: &str,
        model: &str,
        target_date: NaiveDate,
        model_type: ModelType,
    ) -> Result<Option<PendingPrediction>, StockcastError> {
        let sql = format!(
            "SELECT id, {} FROM {}
             WHERE ticker = ?1 AND model = ?2 AND target_date = ?3
             ORDER BY prediction_date DESC, id DESC
             LIMIT 1",
            model_type.predicted_column(),
            model_type.predictions_table()
        );

        let conn = self.conn()?;
        conn.query_row(&sql, params![instrument, model, fmt_date(target_date)], |row| {
            Ok(PendingPrediction {
                id: row.get(0)?,
                predicted_value: row.get(1)?,
            })
        })
        .optional()
        .map_err(query_err)
    }

    fn instrument_status(&self, instrument: &str) -> Result<InstrumentStatus, StockcastError> {
        Ok(InstrumentStatus {
            latest_bar: self.latest_synced_date(instrument)?,
            bars: self.count("SELECT COUNT(*) FROM market_data WHERE ticker = ?1", instrument)?,
            predictions: self.count(
                "SELECT (SELECT COUNT(*) FROM predictions_classification WHERE ticker = ?1)
                      + (SELECT COUNT(*) FROM predictions_regression WHERE ticker = ?1)",
                instrument,
            )?,
            evaluations: self.count(
                "SELECT (SELECT COUNT(*) FROM evaluations_classification WHERE ticker = ?1)
                      + (SELECT COUNT(*) FROM evaluations_regression WHERE ticker = ?1)",
                instrument,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bar(instrument: &str, date: NaiveDate, close: f64) -> Bar {
        Bar {
            instrument: instrument.to_string(),
            date,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000,
        }
    }

    fn store() -> SqliteAdapter {
        let adapter = SqliteAdapter::in_memory().unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    fn class_prediction(prediction_date: NaiveDate, target_date: NaiveDate) -> PredictionRecord {
        PredictionRecord {
            instrument: "AAPL".into(),
            model: "DecisionTreeClassifier".into(),
            prediction_date,
            target_date,
            forecast: Forecast::Class {
                class: 1,
                probability: Some(0.8),
            },
        }
    }

    #[test]
    fn new_requires_path() {
        let mut config = StoreConfig::sqlite("unused.db");
        config.path = None;
        match SqliteAdapter::new(&config) {
            Err(StockcastError::ConfigMissing { section, key }) => {
                assert_eq!(section, "store");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn file_database_persists_across_adapters() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::sqlite(dir.path().join("stockcast.db"));

        let first = SqliteAdapter::new(&config).unwrap();
        first.initialize_schema().unwrap();
        first.append_bars(&[bar("AAPL", d(2024, 1, 2), 185.0)]).unwrap();
        drop(first);

        let second = SqliteAdapter::new(&config).unwrap();
        second.initialize_schema().unwrap();
        assert_eq!(second.latest_synced_date("AAPL").unwrap(), Some(d(2024, 1, 2)));
    }

    #[test]
    fn schema_initialization_is_idempotent() {
        let adapter = store();
        adapter.initialize_schema().unwrap();
    }

    #[test]
    fn latest_synced_date_is_max_date() {
        let adapter = store();
        assert_eq!(adapter.latest_synced_date("AAPL").unwrap(), None);

        adapter
            .append_bars(&[
                bar("AAPL", d(2024, 1, 3), 186.0),
                bar("AAPL", d(2024, 1, 2), 185.0),
                bar("MSFT", d(2024, 1, 9), 370.0),
            ])
            .unwrap();

        assert_eq!(adapter.latest_synced_date("AAPL").unwrap(), Some(d(2024, 1, 3)));
        assert_eq!(adapter.latest_synced_date("MSFT").unwrap(), Some(d(2024, 1, 9)));
    }

    #[test]
    fn append_bars_ignores_existing_keys() {
        let adapter = store();
        let bars = vec![bar("AAPL", d(2024, 1, 2), 185.0), bar("AAPL", d(2024, 1, 3), 186.0)];

        assert_eq!(adapter.append_bars(&bars).unwrap(), 2);
        assert_eq!(adapter.append_bars(&bars).unwrap(), 0);

        // first write wins on overlap
        let overlap = vec![bar("AAPL", d(2024, 1, 3), 999.0), bar("AAPL", d(2024, 1, 4), 187.0)];
        assert_eq!(adapter.append_bars(&overlap).unwrap(), 1);

        {
            let conn = adapter.conn().unwrap();
            let close: f64 = conn
                .query_row(
                    "SELECT close FROM market_data WHERE ticker = 'AAPL' AND date = '2024-01-03'",
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(close, 186.0);
        }
        // the in-memory pool holds a single connection
        assert_eq!(adapter.instrument_status("AAPL").unwrap().bars, 3);
    }

    #[test]
    fn prediction_insert_is_unique_per_day() {
        let adapter = store();
        let record = class_prediction(d(2024, 1, 2), d(2024, 1, 3));

        assert_eq!(adapter.insert_prediction(&record).unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            adapter.insert_prediction(&record).unwrap(),
            InsertOutcome::AlreadyExists
        );

        let mut other_model = record.clone();
        other_model.model = "OtherModel".into();
        assert_eq!(
            adapter.insert_prediction(&other_model).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(adapter.instrument_status("AAPL").unwrap().predictions, 2);
    }

    #[test]
    fn finds_prediction_by_target_date() {
        let adapter = store();
        adapter
            .insert_prediction(&class_prediction(d(2024, 1, 2), d(2024, 1, 3)))
            .unwrap();

        let found = adapter
            .find_prediction_to_evaluate(
                "AAPL",
                "DecisionTreeClassifier",
                d(2024, 1, 3),
                ModelType::Classification,
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.predicted_value, 1.0);

        let none = adapter
            .find_prediction_to_evaluate(
                "AAPL",
                "DecisionTreeClassifier",
                d(2024, 1, 2),
                ModelType::Classification,
            )
            .unwrap();
        assert!(none.is_none());

        let wrong_type = adapter
            .find_prediction_to_evaluate(
                "AAPL",
                "DecisionTreeClassifier",
                d(2024, 1, 3),
                ModelType::Regression,
            )
            .unwrap();
        assert!(wrong_type.is_none());
    }

    #[test]
    fn evaluation_insert_is_unique_per_prediction() {
        let adapter = store();
        adapter
            .insert_prediction(&class_prediction(d(2024, 1, 2), d(2024, 1, 3)))
            .unwrap();
        let pending = adapter
            .find_prediction_to_evaluate(
                "AAPL",
                "DecisionTreeClassifier",
                d(2024, 1, 3),
                ModelType::Classification,
            )
            .unwrap()
            .unwrap();

        let evaluation = EvaluationRecord {
            prediction_id: pending.id,
            instrument: "AAPL".into(),
            model: "DecisionTreeClassifier".into(),
            evaluation_date: d(2024, 1, 3),
            actual_return: 0.01,
            outcome: Outcome::Class {
                predicted_class: 1,
                actual_class: 1,
                correct: true,
            },
        };

        assert_eq!(adapter.insert_evaluation(&evaluation).unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            adapter.insert_evaluation(&evaluation).unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(adapter.instrument_status("AAPL").unwrap().evaluations, 1);
    }

    #[test]
    fn evaluation_requires_existing_prediction() {
        let adapter = store();
        let orphan = EvaluationRecord {
            prediction_id: 12345,
            instrument: "AAPL".into(),
            model: "DecisionTreeRegressor".into(),
            evaluation_date: d(2024, 1, 3),
            actual_return: 0.01,
            outcome: Outcome::Return {
                predicted_return: 0.0,
                error: -0.01,
                abs_error: 0.01,
                squared_error: 0.0001,
            },
        };
        assert!(matches!(
            adapter.insert_evaluation(&orphan),
            Err(StockcastError::DatabaseQuery { .. })
        ));
    }

    #[test]
    fn regression_round_trip() {
        let adapter = store();
        let record = PredictionRecord {
            instrument: "MSFT".into(),
            model: "DecisionTreeRegressor".into(),
            prediction_date: d(2024, 1, 5),
            target_date: d(2024, 1, 8),
            forecast: Forecast::Return(-0.0042),
        };
        adapter.insert_prediction(&record).unwrap();

        let found = adapter
            .find_prediction_to_evaluate(
                "MSFT",
                "DecisionTreeRegressor",
                d(2024, 1, 8),
                ModelType::Regression,
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.predicted_value, -0.0042);
    }

    #[test]
    fn status_for_unknown_instrument_is_empty() {
        let adapter = store();
        assert_eq!(
            adapter.instrument_status("NVDA").unwrap(),
            InstrumentStatus::default()
        );
    }
}
