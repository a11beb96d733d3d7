//! PostgreSQL persistence adapter.

use crate::domain::config::StoreConfig;
use crate::domain::error::StockcastError;
use crate::domain::ohlcv::Bar;
use crate::domain::records::{
    EvaluationRecord, Forecast, InsertOutcome, InstrumentStatus, ModelType, Outcome,
    PendingPrediction, PredictionRecord,
};
use crate::ports::store_port::StorePort;
use chrono::NaiveDate;
use postgres::NoTls;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS market_data (
    date DATE NOT NULL,
    ticker VARCHAR(10) NOT NULL,
    open DOUBLE PRECISION NOT NULL,
    high DOUBLE PRECISION NOT NULL,
    low DOUBLE PRECISION NOT NULL,
    close DOUBLE PRECISION NOT NULL,
    volume BIGINT NOT NULL,
    created_at TIMESTAMP DEFAULT NOW(),
    PRIMARY KEY (date, ticker)
);
CREATE TABLE IF NOT EXISTS predictions_classification (
    id BIGSERIAL PRIMARY KEY,
    ticker VARCHAR(10) NOT NULL,
    model VARCHAR(50) NOT NULL,
    prediction_date DATE NOT NULL,
    target_date DATE NOT NULL,
    predicted_class INT NOT NULL,
    probability DOUBLE PRECISION,
    created_at TIMESTAMP DEFAULT NOW(),
    UNIQUE (ticker, model, prediction_date)
);
CREATE TABLE IF NOT EXISTS predictions_regression (
    id BIGSERIAL PRIMARY KEY,
    ticker VARCHAR(10) NOT NULL,
    model VARCHAR(50) NOT NULL,
    prediction_date DATE NOT NULL,
    target_date DATE NOT NULL,
    predicted_return DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMP DEFAULT NOW(),
    UNIQUE (ticker, model, prediction_date)
);
CREATE TABLE IF NOT EXISTS evaluations_classification (
    id BIGSERIAL PRIMARY KEY,
    prediction_id BIGINT NOT NULL UNIQUE
        REFERENCES predictions_classification(id) ON DELETE CASCADE,
    ticker VARCHAR(10) NOT NULL,
    model VARCHAR(50) NOT NULL,
    evaluation_date DATE NOT NULL,
    predicted_class INT NOT NULL,
    actual_class INT NOT NULL,
    correct BOOLEAN NOT NULL,
    actual_return DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMP DEFAULT NOW()
);
CREATE TABLE IF NOT EXISTS evaluations_regression (
    id BIGSERIAL PRIMARY KEY,
    prediction_id BIGINT NOT NULL UNIQUE
        REFERENCES predictions_regression(id) ON DELETE CASCADE,
    ticker VARCHAR(10) NOT NULL,
    model VARCHAR(50) NOT NULL,
    evaluation_date DATE NOT NULL,
    predicted_return DOUBLE PRECISION NOT NULL,
    actual_return DOUBLE PRECISION NOT NULL,
    error DOUBLE PRECISION NOT NULL,
    abs_error DOUBLE PRECISION NOT NULL,
    squared_error DOUBLE PRECISION NOT NULL,
    created_at TIMESTAMP DEFAULT NOW()
);
CREATE INDEX IF NOT EXISTS idx_market_data_ticker_date ON market_data(ticker, date);
CREATE INDEX IF NOT EXISTS idx_pred_class_ticker_model ON predictions_classification(ticker, model, prediction_date);
CREATE INDEX IF NOT EXISTS idx_pred_reg_ticker_model ON predictions_regression(ticker, model, prediction_date);
CREATE INDEX IF NOT EXISTS idx_eval_class_ticker_model ON evaluations_classification(ticker, model, evaluation_date);
CREATE INDEX IF NOT EXISTS idx_eval_reg_ticker_model ON evaluations_regression(ticker, model, evaluation_date);
CREATE INDEX IF NOT EXISTS idx_pred_class_target_date ON predictions_classification(ticker, model, target_date);
CREATE INDEX IF NOT EXISTS idx_pred_reg_target_date ON predictions_regression(ticker, model, target_date);
";

fn query_err(e: postgres::Error) -> StockcastError {
    StockcastError::DatabaseQuery {
        reason: e.to_string(),
    }
}

pub struct PostgresAdapter {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresAdapter {
    pub fn new(config: &StoreConfig) -> Result<Self, StockcastError> {
        let conninfo = config
            .conninfo
            .as_deref()
            .ok_or_else(|| StockcastError::ConfigMissing {
                section: "store".into(),
                key: "conninfo".into(),
            })?;

        let mut pg_config: postgres::Config =
            conninfo.parse().map_err(|e: postgres::Error| StockcastError::ConfigInvalid {
                section: "store".into(),
                key: "conninfo".into(),
                reason: e.to_string(),
            })?;
        pg_config
            .connect_timeout(config.timeout)
            .options(&format!("-c statement_timeout={}", config.timeout.as_millis()));

        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.timeout)
            .build(manager)
            .map_err(|e: r2d2::Error| StockcastError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, StockcastError> {
        self.pool.get().map_err(|e: r2d2::Error| StockcastError::Database {
            reason: e.to_string(),
        })
    }

    fn count(&self, sql: &str, instrument: &str) -> Result<usize, StockcastError> {
        let n: i64 = self
            .conn()?
            .query_one(sql, &[&instrument])
            .map_err(query_err)?
            .get(0);
        Ok(n as usize)
    }
}

impl StorePort for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), StockcastError> {
        self.conn()?.batch_execute(SCHEMA).map_err(query_err)
    }

    fn latest_synced_date(&self, instrument: &str) -> Result<Option<NaiveDate>, StockcastError> {
        let row = self
            .conn()?
            .query_one("SELECT MAX(date) FROM market_data WHERE ticker = $1", &[&instrument])
            .map_err(query_err)?;
        Ok(row.get(0))
    }

    fn append_bars(&self, bars: &[Bar]) -> Result<usize, StockcastError> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_err)?;
        let stmt = tx
            .prepare(
                "INSERT INTO market_data (date, ticker, open, high, low, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (date, ticker) DO NOTHING",
            )
            .map_err(query_err)?;

        let mut inserted = 0u64;
        for bar in bars {
            inserted += tx
                .execute(
                    &stmt,
                    &[
                        &bar.date,
                        &bar.instrument,
                        &bar.open,
                        &bar.high,
                        &bar.low,
                        &bar.close,
                        &bar.volume,
                    ],
                )
                .map_err(query_err)?;
        }
        tx.commit().map_err(query_err)?;

        Ok(inserted as usize)
    }

    fn insert_prediction(&self, record: &PredictionRecord) -> Result<InsertOutcome, StockcastError> {
        let mut conn = self.conn()?;
        let rows = match record.forecast {
            Forecast::Class { class, probability } => conn.execute(
                "INSERT INTO predictions_classification
                     (ticker, model, prediction_date, target_date, predicted_class, probability)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (ticker, model, prediction_date) DO NOTHING",
                &[
                    &record.instrument,
                    &record.model,
                    &record.prediction_date,
                    &record.target_date,
                    &i32::from(class),
                    &probability,
                ],
            ),
            Forecast::Return(predicted_return) => conn.execute(
                "INSERT INTO predictions_regression
                     (ticker, model, prediction_date, target_date, predicted_return)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (ticker, model, prediction_date) DO NOTHING",
                &[
                    &record.instrument,
                    &record.model,
                    &record.prediction_date,
                    &record.target_date,
                    &predicted_return,
                ],
            ),
        }
        .map_err(query_err)?;

        Ok(InsertOutcome::from_rows_affected(rows))
    }

    fn insert_evaluation(&self, record: &EvaluationRecord) -> Result<InsertOutcome, StockcastError> {
        let mut conn = self.conn()?;
        let rows = match record.outcome {
            Outcome::Class {
                predicted_class,
                actual_class,
                correct,
            } => conn.execute(
                "INSERT INTO evaluations_classification
                     (prediction_id, ticker, model, evaluation_date,
                      predicted_class, actual_class, correct, actual_return)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (prediction_id) DO NOTHING",
                &[
                    &record.prediction_id,
                    &record.instrument,
                    &record.model,
                    &record.evaluation_date,
                    &predicted_class,
                    &actual_class,
                    &correct,
                    &record.actual_return,
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
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (prediction_id) DO NOTHING",
                &[
                    &record.prediction_id,
                    &record.instrument,
                    &record.model,
                    &record.evaluation_date,
                    &predicted_return,
                    &record.actual_return,
                    &error,
                    &abs_error,
                    &squared_error,
                ],
            ),
        }
        .map_err(query_err)?;

        Ok(InsertOutcome::from_rows_affected(rows))
    }

    fn find_prediction_to_evaluate(
        &self,
        instrument: &str,
        model: &str,
        target_date: NaiveDate,
        model_type: ModelType,
    ) -> Result<Option<PendingPrediction>, StockcastError> {
        let sql = format!(
            "SELECT id, {}::double precision FROM {}
             WHERE ticker = $1 AND model = $2 AND target_date = $3
             ORDER BY prediction_date DESC, id DESC
             LIMIT 1",
            model_type.predicted_column(),
            model_type.predictions_table()
        );

        let row = self
            .conn()?
            .query_opt(sql.as_str(), &[&instrument, &model, &target_date])
            .map_err(query_err)?;

        Ok(row.map(|row| PendingPrediction {
            id: row.get(0),
            predicted_value: row.get(1),
        }))
    }

    fn instrument_status(&self, instrument: &str) -> Result<InstrumentStatus, StockcastError> {
        Ok(InstrumentStatus {
            latest_bar: self.latest_synced_date(instrument)?,
            bars: self.count("SELECT COUNT(*) FROM market_data WHERE ticker = $1", instrument)?,
            predictions: self.count(
                "SELECT (SELECT COUNT(*) FROM predictions_classification WHERE ticker = $1)
                      + (SELECT COUNT(*) FROM predictions_regression WHERE ticker = $1)",
                instrument,
            )?,
            evaluations: self.count(
                "SELECT (SELECT COUNT(*) FROM evaluations_classification WHERE ticker = $1)
                      + (SELECT COUNT(*) FROM evaluations_regression WHERE ticker = $1)",
                instrument,
            )?,
        })
    }
}
