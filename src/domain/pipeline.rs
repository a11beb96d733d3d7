//! Per-instrument orchestration: Sync, Evaluate, Predict.
//!
//! Each instrument is processed once per run. Sync appends the bars newer
//! than the store's watermark. Then, for every model in turn, Evaluate scores
//! the stored prediction that targeted the series' last date, and Predict
//! stores a fresh forecast for the next business day. Failures inside one
//! instrument/model cell are logged and recorded in the report; they never
//! stop the loop.

use crate::domain::calendar::next_business_day;
use crate::domain::config::PipelineConfig;
use crate::domain::error::StockcastError;
use crate::domain::evaluation::evaluate;
use crate::domain::features::{Feature, FeatureFrame, enrich};
use crate::domain::model::PredictiveModel;
use crate::domain::ohlcv::bars_after;
use crate::domain::records::{InsertOutcome, ModelType, PredictionRecord};
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::store_port::StorePort;
use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sync,
    Evaluate,
    Predict,
    Done,
    SkippedInsufficientData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationStep {
    /// No stored prediction targets the series' last date.
    NothingDue,
    Recorded {
        prediction_id: i64,
        outcome: InsertOutcome,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionStep {
    Recorded {
        target_date: NaiveDate,
        outcome: InsertOutcome,
    },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReport {
    pub model: String,
    pub model_type: ModelType,
    pub evaluation: EvaluationStep,
    pub prediction: PredictionStep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentReport {
    pub instrument: String,
    pub stage: Stage,
    pub bars_written: usize,
    pub sync_error: Option<String>,
    pub models: Vec<ModelReport>,
}

impl InstrumentReport {
    fn new(instrument: &str) -> Self {
        Self {
            instrument: instrument.to_string(),
            stage: Stage::Sync,
            bars_written: 0,
            sync_error: None,
            models: Vec::new(),
        }
    }

    pub fn evaluations_inserted(&self) -> usize {
        self.models
            .iter()
            .filter(|m| {
                matches!(
                    m.evaluation,
                    EvaluationStep::Recorded {
                        outcome: InsertOutcome::Inserted,
                        ..
                    }
                )
            })
            .count()
    }

    pub fn predictions_inserted(&self) -> usize {
        self.models
            .iter()
            .filter(|m| {
                matches!(
                    m.prediction,
                    PredictionStep::Recorded {
                        outcome: InsertOutcome::Inserted,
                        ..
                    }
                )
            })
            .count()
    }

    pub fn failures(&self) -> usize {
        self.models
            .iter()
            .map(|m| {
                usize::from(matches!(m.evaluation, EvaluationStep::Failed(_)))
                    + usize::from(matches!(m.prediction, PredictionStep::Failed(_)))
            })
            .sum::<usize>()
            + usize::from(self.sync_error.is_some())
    }
}

pub struct Orchestrator<'a> {
    store: &'a dyn StorePort,
    models: &'a [Box<dyn PredictiveModel>],
    config: PipelineConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn StorePort,
        models: &'a [Box<dyn PredictiveModel>],
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            models,
            config,
        }
    }

    /// Runs every stage for one instrument's enriched series.
    pub fn process_instrument(&self, frame: &FeatureFrame) -> InstrumentReport {
        let instrument = frame.instrument();
        let mut report = InstrumentReport::new(instrument);

        if let Some(reason) = self.insufficiency(frame) {
            warn!(instrument, %reason, "skipping instrument");
            report.stage = Stage::SkippedInsufficientData;
            return report;
        }

        match self.sync(frame) {
            Ok(written) => report.bars_written = written,
            Err(e) => {
                error!(instrument, error = %e, "failed to sync bars");
                report.sync_error = Some(e.to_string());
            }
        }

        for model in self.models {
            report.stage = Stage::Evaluate;
            let evaluation = self.evaluate_due(model.as_ref(), frame);
            report.stage = Stage::Predict;
            let prediction = self.predict_next(model.as_ref(), frame);
            report.models.push(ModelReport {
                model: model.name().to_string(),
                model_type: model.model_type(),
                evaluation,
                prediction,
            });
        }

        report.stage = Stage::Done;
        report
    }

    fn insufficiency(&self, frame: &FeatureFrame) -> Option<String> {
        if frame.is_empty() {
            Some("empty series".to_string())
        } else if frame.len() < self.config.min_rows {
            Some(format!(
                "{} rows, need at least {}",
                frame.len(),
                self.config.min_rows
            ))
        } else if !frame.has_column(Feature::LogReturn) {
            Some("series has no log_return column".to_string())
        } else {
            None
        }
    }

    fn sync(&self, frame: &FeatureFrame) -> Result<usize, StockcastError> {
        let instrument = frame.instrument();
        let watermark = self.store.latest_synced_date(instrument)?;
        let delta = bars_after(frame.bars(), watermark);
        if delta.is_empty() {
            debug!(instrument, ?watermark, "store already up to date");
            return Ok(0);
        }
        let written = self.store.append_bars(&delta)?;
        info!(instrument, new = delta.len(), written, "synced bars");
        Ok(written)
    }

    fn evaluate_due(&self, model: &dyn PredictiveModel, frame: &FeatureFrame) -> EvaluationStep {
        let instrument = frame.instrument();
        match self.try_evaluate(model, frame) {
            Ok(step) => step,
            Err(e) => {
                error!(instrument, model = model.name(), error = %e, "evaluation failed");
                EvaluationStep::Failed(e.to_string())
            }
        }
    }

    fn try_evaluate(
        &self,
        model: &dyn PredictiveModel,
        frame: &FeatureFrame,
    ) -> Result<EvaluationStep, StockcastError> {
        let instrument = frame.instrument();
        let (Some(today), Some(actual_return)) = (frame.last_date(), frame.last_log_return())
        else {
            return Err(StockcastError::InsufficientData {
                instrument: instrument.to_string(),
                reason: "no final log return to evaluate against".to_string(),
            });
        };

        let Some(pending) = self.store.find_prediction_to_evaluate(
            instrument,
            model.name(),
            today,
            model.model_type(),
        )?
        else {
            debug!(instrument, model = model.name(), %today, "no prediction due");
            return Ok(EvaluationStep::NothingDue);
        };

        let record = evaluate(
            &pending,
            instrument,
            model.name(),
            model.model_type(),
            today,
            actual_return,
            model.classification_threshold(),
        );
        let outcome = self.store.insert_evaluation(&record)?;
        match outcome {
            InsertOutcome::Inserted => info!(
                instrument,
                model = model.name(),
                prediction_id = pending.id,
                outcome = ?record.outcome,
                "recorded evaluation"
            ),
            InsertOutcome::AlreadyExists => debug!(
                instrument,
                model = model.name(),
                prediction_id = pending.id,
                "evaluation already recorded"
            ),
        }

        Ok(EvaluationStep::Recorded {
            prediction_id: pending.id,
            outcome,
        })
    }

    fn predict_next(&self, model: &dyn PredictiveModel, frame: &FeatureFrame) -> PredictionStep {
        let instrument = frame.instrument();
        match self.try_predict(model, frame) {
            Ok(step) => step,
            Err(e @ StockcastError::InsufficientData { .. }) => {
                warn!(instrument, model = model.name(), error = %e, "prediction skipped");
                PredictionStep::Failed(e.to_string())
            }
            Err(e) => {
                error!(instrument, model = model.name(), error = %e, "prediction failed");
                PredictionStep::Failed(e.to_string())
            }
        }
    }

    fn try_predict(
        &self,
        model: &dyn PredictiveModel,
        frame: &FeatureFrame,
    ) -> Result<PredictionStep, StockcastError> {
        let prediction_date = frame.last_date().ok_or_else(|| StockcastError::InsufficientData {
            instrument: frame.instrument().to_string(),
            reason: "empty series".to_string(),
        })?;
        let target_date = next_business_day(prediction_date);
        let forecast = model.train_predict_next(frame)?;

        let record = PredictionRecord {
            instrument: frame.instrument().to_string(),
            model: model.name().to_string(),
            prediction_date,
            target_date,
            forecast,
        };
        let outcome = self.store.insert_prediction(&record)?;
        match outcome {
            InsertOutcome::Inserted => info!(
                instrument = frame.instrument(),
                model = model.name(),
                %target_date,
                ?forecast,
                "recorded prediction"
            ),
            InsertOutcome::AlreadyExists => debug!(
                instrument = frame.instrument(),
                model = model.name(),
                %prediction_date,
                "prediction already recorded"
            ),
        }

        Ok(PredictionStep::Recorded {
            target_date,
            outcome,
        })
    }
}

/// Totals over one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub instruments: usize,
    pub processed: usize,
    pub skipped_insufficient: usize,
    pub source_failures: usize,
    pub bars_written: usize,
    pub evaluations_written: usize,
    pub predictions_written: usize,
    pub failures: usize,
    pub reports: Vec<InstrumentReport>,
}

impl RunSummary {
    fn absorb(&mut self, report: InstrumentReport) {
        match report.stage {
            Stage::SkippedInsufficientData => self.skipped_insufficient += 1,
            _ => self.processed += 1,
        }
        self.bars_written += report.bars_written;
        self.evaluations_written += report.evaluations_inserted();
        self.predictions_written += report.predictions_inserted();
        self.failures += report.failures();
        self.reports.push(report);
    }
}

/// Date window and optional instrument filter for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub only: Option<Vec<String>>,
}

/// Fetches, enriches and processes every instrument in the universe.
///
/// Fails only when the universe itself cannot be listed; per-instrument
/// source failures are logged and counted.
pub fn run_pipeline(
    source: &dyn MarketDataPort,
    orchestrator: &Orchestrator<'_>,
    request: &RunRequest,
) -> Result<RunSummary, StockcastError> {
    let instruments = match &request.only {
        Some(only) => only.clone(),
        None => source.list_instruments()?,
    };
    info!(
        count = instruments.len(),
        start = %request.start_date,
        end = %request.end_date,
        "starting run"
    );

    let mut summary = RunSummary {
        instruments: instruments.len(),
        ..RunSummary::default()
    };

    for instrument in &instruments {
        let bars = match source.fetch_bars(instrument, request.start_date, request.end_date) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(instrument = instrument.as_str(), error = %e, "skipping instrument");
                summary.source_failures += 1;
                continue;
            }
        };

        let frame = enrich(instrument, bars);
        summary.absorb(orchestrator.process_instrument(&frame));
    }

    info!(
        processed = summary.processed,
        skipped = summary.skipped_insufficient,
        source_failures = summary.source_failures,
        bars = summary.bars_written,
        evaluations = summary.evaluations_written,
        predictions = summary.predictions_written,
        failures = summary.failures,
        "run complete"
    );
    Ok(summary)
}
