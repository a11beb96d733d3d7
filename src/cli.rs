//! CLI definition and dispatch.

use chrono::{Local, Months, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config::{
    PipelineConfig, SourceConfig, StoreBackend, StoreConfig, load_app_config, load_source_config,
    load_store_config,
};
use crate::domain::error::StockcastError;
use crate::domain::model::{PredictiveModel, build_models};
use crate::domain::pipeline::{
    EvaluationStep, InstrumentReport, Orchestrator, PredictionStep, RunRequest, Stage, run_pipeline,
};
use crate::domain::universe::normalize_symbol;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::store_port::StorePort;

#[derive(Parser, Debug)]
#[command(name = "stockcast", about = "Daily walk-forward equity predictions")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync bars, evaluate due predictions and predict the next day
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: Option<String>,
        /// Treat this date as today (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Create store tables and indices
    InitSchema {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show stored bars, predictions and evaluations for one instrument
    Status {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
    },
    /// List the instrument universe
    ListInstruments {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Installs the stderr log subscriber. `RUST_LOG` applies unless `verbose`.
pub fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            code,
            as_of,
        } => run_daily(&config, code.as_deref(), as_of),
        Command::InitSchema { config } => run_init_schema(&config),
        Command::Status { config, code } => run_status(&config, &code),
        Command::ListInstruments { config } => run_list_instruments(&config),
    }
}

fn fail(err: &StockcastError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

/// Opens the configured backend. Fails if this build lacks its feature.
pub fn open_store(config: &StoreConfig) -> Result<Box<dyn StorePort>, StockcastError> {
    match config.backend {
        StoreBackend::Sqlite => open_sqlite(config),
        StoreBackend::Postgres => open_postgres(config),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &StoreConfig) -> Result<Box<dyn StorePort>, StockcastError> {
    let store = crate::adapters::sqlite_adapter::SqliteAdapter::new(config)?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &StoreConfig) -> Result<Box<dyn StorePort>, StockcastError> {
    Err(unsupported_backend("sqlite"))
}

#[cfg(feature = "postgres")]
fn open_postgres(config: &StoreConfig) -> Result<Box<dyn StorePort>, StockcastError> {
    let store = crate::adapters::postgres_adapter::PostgresAdapter::new(config)?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_config: &StoreConfig) -> Result<Box<dyn StorePort>, StockcastError> {
    Err(unsupported_backend("postgres"))
}

#[cfg(not(all(feature = "sqlite", feature = "postgres")))]
fn unsupported_backend(name: &str) -> StockcastError {
    StockcastError::ConfigInvalid {
        section: "store".into(),
        key: "backend".into(),
        reason: format!("built without the '{}' feature", name),
    }
}

pub fn build_source(config: &SourceConfig) -> CsvAdapter {
    let source = CsvAdapter::new(config.data_dir.clone());
    match &config.codes {
        Some(codes) => source.with_codes(codes.clone()),
        None => source,
    }
}

/// `[end - history_years, end]`, with `end` defaulting to today.
pub fn lookback_window(as_of: Option<NaiveDate>, history_years: u32) -> (NaiveDate, NaiveDate) {
    let end = as_of.unwrap_or_else(|| Local::now().date_naive());
    let start = end
        .checked_sub_months(Months::new(history_years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN);
    (start, end)
}

/// Normalizes a `--code` override into a one-instrument filter.
pub fn resolve_code_override(code: Option<&str>) -> Result<Option<Vec<String>>, StockcastError> {
    match code {
        None => Ok(None),
        Some(raw) => normalize_symbol(raw)
            .map(|symbol| Some(vec![symbol]))
            .ok_or_else(|| StockcastError::ConfigInvalid {
                section: "cli".into(),
                key: "code".into(),
                reason: "code must not be blank".into(),
            }),
    }
}

fn run_daily(config_path: &Path, code: Option<&str>, as_of: Option<NaiveDate>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let app = match load_app_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    let only = match resolve_code_override(code) {
        Ok(only) => only,
        Err(e) => return fail(&e),
    };

    let store = match open_store(&app.store) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    if let Err(e) = store.initialize_schema() {
        return fail(&e);
    }

    let source = build_source(&app.source);
    let models = build_models(&app.models);
    let (start_date, end_date) = lookback_window(as_of, app.source.history_years);
    let request = RunRequest {
        start_date,
        end_date,
        only,
    };

    run_prediction_pipeline(store.as_ref(), &source, &models, &app.pipeline, &request)
}

/// Runs every instrument through the orchestrator and prints a summary.
pub fn run_prediction_pipeline(
    store: &dyn StorePort,
    source: &dyn MarketDataPort,
    models: &[Box<dyn PredictiveModel>],
    pipeline: &PipelineConfig,
    request: &RunRequest,
) -> ExitCode {
    let orchestrator = Orchestrator::new(store, models, pipeline.clone());
    let summary = match run_pipeline(source, &orchestrator, request) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    for report in &summary.reports {
        println!("{}", format_report(report));
    }
    eprintln!("\n=== Run Summary ===");
    eprintln!("Instruments:      {}", summary.instruments);
    eprintln!("Processed:        {}", summary.processed);
    eprintln!("Skipped (data):   {}", summary.skipped_insufficient);
    eprintln!("Source failures:  {}", summary.source_failures);
    eprintln!("Bars written:     {}", summary.bars_written);
    eprintln!("Evaluations:      {}", summary.evaluations_written);
    eprintln!("Predictions:      {}", summary.predictions_written);
    eprintln!("Failures:         {}", summary.failures);

    ExitCode::SUCCESS
}

/// One line per instrument: bars written, then `model:eval/pred` cells.
pub fn format_report(report: &InstrumentReport) -> String {
    if report.stage == Stage::SkippedInsufficientData {
        return format!("{}: skipped (insufficient data)", report.instrument);
    }

    let mut line = format!("{}: +{} bars", report.instrument, report.bars_written);
    if report.sync_error.is_some() {
        line.push_str(" (sync failed)");
    }
    for model in &report.models {
        let evaluation = match &model.evaluation {
            EvaluationStep::NothingDue => "-".to_string(),
            EvaluationStep::Recorded { prediction_id, .. } => format!("eval#{}", prediction_id),
            EvaluationStep::Failed(_) => "eval failed".to_string(),
        };
        let prediction = match &model.prediction {
            PredictionStep::Recorded { target_date, .. } => format!("pred {}", target_date),
            PredictionStep::Failed(_) => "pred failed".to_string(),
        };
        line.push_str(&format!(", {} [{} {}]", model.model, evaluation, prediction));
    }
    line
}

fn run_init_schema(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let store_config = match load_store_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let store = match open_store(&store_config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match store.initialize_schema() {
        Ok(()) => {
            eprintln!("Schema ready");
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_status(config_path: &Path, code: &str) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let store_config = match load_store_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let instrument = match resolve_code_override(Some(code)) {
        Ok(Some(mut only)) => only.remove(0),
        Ok(None) => return ExitCode::from(2),
        Err(e) => return fail(&e),
    };
    let store = match open_store(&store_config) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    match store.instrument_status(&instrument) {
        Ok(status) => {
            let latest = status
                .latest_bar
                .map(|d| d.to_string())
                .unwrap_or_else(|| "none".to_string());
            println!("{}", instrument);
            println!("  Latest bar:   {}", latest);
            println!("  Bars:         {}", status.bars);
            println!("  Predictions:  {}", status.predictions);
            println!("  Evaluations:  {}", status.evaluations);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_list_instruments(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let source_config = match load_source_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    match build_source(&source_config).list_instruments() {
        Ok(instruments) => {
            for instrument in &instruments {
                println!("{}", instrument);
            }
            eprintln!("{} instruments", instruments.len());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
