//! Typed configuration, validated from a [`ConfigPort`].
//!
//! Each loader reads one INI section and rejects missing, malformed or
//! out-of-range values with `ConfigMissing` / `ConfigInvalid` before any work
//! starts.

use crate::domain::error::StockcastError;
use crate::domain::model::{Criterion, ModelConfig, ModelKind};
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MIN_ROWS: usize = 50;
pub const DEFAULT_HISTORY_YEARS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Postgres,
}

/// Connection settings handed to a store adapter at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub path: Option<PathBuf>,
    pub conninfo: Option<String>,
    pub pool_size: u32,
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: Some(path.into()),
            conninfo: None,
            pool_size: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    pub data_dir: PathBuf,
    pub history_years: u32,
    /// Explicit universe; `None` means every instrument the source lists.
    pub codes: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub min_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_rows: DEFAULT_MIN_ROWS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub models: Vec<ModelConfig>,
}

fn missing(section: &str, key: &str) -> StockcastError {
    StockcastError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StockcastError {
    StockcastError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_blank(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn load_store_config(config: &dyn ConfigPort) -> Result<StoreConfig, StockcastError> {
    let backend = match non_blank(config, "store", "backend")
        .unwrap_or_else(|| "sqlite".to_string())
        .to_lowercase()
        .as_str()
    {
        "sqlite" => StoreBackend::Sqlite,
        "postgres" | "postgresql" => StoreBackend::Postgres,
        other => {
            return Err(invalid(
                "store",
                "backend",
                format!("unknown backend '{}', expected sqlite or postgres", other),
            ));
        }
    };

    let path = non_blank(config, "store", "path").map(PathBuf::from);
    let conninfo = non_blank(config, "store", "conninfo");
    match backend {
        StoreBackend::Sqlite if path.is_none() => return Err(missing("store", "path")),
        StoreBackend::Postgres if conninfo.is_none() => return Err(missing("store", "conninfo")),
        _ => {}
    }

    let pool_size = config.get_int("store", "pool_size", 4)?;
    if !(1..=64).contains(&pool_size) {
        return Err(invalid("store", "pool_size", "pool_size must be between 1 and 64"));
    }

    let timeout_secs = config.get_int("store", "timeout_secs", 30)?;
    if timeout_secs <= 0 {
        return Err(invalid("store", "timeout_secs", "timeout_secs must be positive"));
    }

    Ok(StoreConfig {
        backend,
        path,
        conninfo,
        pool_size: pool_size as u32,
        timeout: Duration::from_secs(timeout_secs as u64),
    })
}

pub fn load_source_config(config: &dyn ConfigPort) -> Result<SourceConfig, StockcastError> {
    let data_dir = non_blank(config, "source", "data_dir")
        .map(PathBuf::from)
        .ok_or_else(|| missing("source", "data_dir"))?;

    let history_years = config.get_int("source", "history_years", DEFAULT_HISTORY_YEARS as i64)?;
    if !(1..=50).contains(&history_years) {
        return Err(invalid(
            "source",
            "history_years",
            "history_years must be between 1 and 50",
        ));
    }

    let codes = match config.get_string("source", "codes") {
        Some(raw) if !raw.trim().is_empty() => {
            Some(parse_codes(&raw).map_err(|e| invalid("source", "codes", e.to_string()))?)
        }
        _ => None,
    };

    Ok(SourceConfig {
        data_dir,
        history_years: history_years as u32,
        codes,
    })
}

pub fn load_pipeline_config(config: &dyn ConfigPort) -> Result<PipelineConfig, StockcastError> {
    let min_rows = config.get_int("pipeline", "min_rows", DEFAULT_MIN_ROWS as i64)?;
    if min_rows < 1 {
        return Err(invalid("pipeline", "min_rows", "min_rows must be at least 1"));
    }
    Ok(PipelineConfig {
        min_rows: min_rows as usize,
    })
}

/// Reads `[models] enabled` and each enabled model's own section.
/// Defaults to the decision-tree classifier alone.
pub fn load_model_configs(config: &dyn ConfigPort) -> Result<Vec<ModelConfig>, StockcastError> {
    let enabled = non_blank(config, "models", "enabled")
        .unwrap_or_else(|| ModelKind::DecisionTreeClassifier.key().to_string());

    let mut models: Vec<ModelConfig> = Vec::new();
    for token in enabled.split(',') {
        let kind: ModelKind = token
            .parse()
            .map_err(|e: String| invalid("models", "enabled", e))?;
        if models.iter().any(|m| m.kind == kind) {
            return Err(invalid("models", "enabled", format!("duplicate model '{}'", kind)));
        }
        models.push(load_model_config(config, kind)?);
    }
    Ok(models)
}

fn load_model_config(config: &dyn ConfigPort, kind: ModelKind) -> Result<ModelConfig, StockcastError> {
    let section = kind.key();
    let defaults = ModelConfig::defaults(kind);

    let max_depth = config.get_int(section, "max_depth", defaults.max_depth as i64)?;
    if !(1..=32).contains(&max_depth) {
        return Err(invalid(section, "max_depth", "max_depth must be between 1 and 32"));
    }

    let criterion = match non_blank(config, section, "criterion") {
        None => defaults.criterion,
        Some(raw) => {
            let criterion: Criterion = raw.parse().map_err(|e: String| invalid(section, "criterion", e))?;
            let fits = match kind {
                ModelKind::DecisionTreeClassifier => criterion != Criterion::SquaredError,
                ModelKind::DecisionTreeRegressor => criterion == Criterion::SquaredError,
            };
            if !fits {
                return Err(invalid(
                    section,
                    "criterion",
                    format!("criterion {} does not apply to {}", criterion, kind),
                ));
            }
            criterion
        }
    };

    let threshold = config.get_double(section, "threshold", defaults.threshold)?;
    if !threshold.is_finite() || threshold.abs() >= 1.0 {
        return Err(invalid(section, "threshold", "threshold must be a log return in (-1, 1)"));
    }

    Ok(ModelConfig {
        kind,
        max_depth: max_depth as usize,
        criterion,
        threshold,
    })
}

pub fn load_app_config(config: &dyn ConfigPort) -> Result<AppConfig, StockcastError> {
    Ok(AppConfig {
        store: load_store_config(config)?,
        source: load_source_config(config)?,
        pipeline: load_pipeline_config(config)?,
        models: load_model_configs(config)?,
    })
}
