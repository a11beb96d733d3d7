//! Feature frame: a bar series plus derived indicator columns.
//!
//! [`enrich`] turns raw bars for one instrument into a dense frame with the
//! canonical derived columns. The frame is column-oriented so models can pull
//! whole feature vectors and the pipeline can check for a column's presence.

use crate::domain::error::StockcastError;
use crate::domain::indicator::bollinger::{self, percent_b};
use crate::domain::indicator::macd;
use crate::domain::indicator::{
    IndicatorValue, calculate_atr, calculate_bollinger, calculate_ema, calculate_macd,
    calculate_mfi, calculate_roc, calculate_rsi,
};
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

/// Fewer bars than this leaves the input unenriched (the 200-bar EMA cannot warm up).
pub const MIN_ENRICH_ROWS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Open,
    High,
    Low,
    Close,
    Volume,
    LogReturn,
    Rsi14,
    Roc10,
    Atr14,
    Mfi14,
    Macd,
    MacdSignal,
    MacdHist,
    BbPercent,
    DistEma200,
}

impl Feature {
    pub const DERIVED: [Feature; 10] = [
        Feature::LogReturn,
        Feature::Rsi14,
        Feature::Roc10,
        Feature::Atr14,
        Feature::Mfi14,
        Feature::Macd,
        Feature::MacdSignal,
        Feature::MacdHist,
        Feature::BbPercent,
        Feature::DistEma200,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Open => "open",
            Feature::High => "high",
            Feature::Low => "low",
            Feature::Close => "close",
            Feature::Volume => "volume",
            Feature::LogReturn => "log_return",
            Feature::Rsi14 => "rsi_14",
            Feature::Roc10 => "roc_10",
            Feature::Atr14 => "atr_14",
            Feature::Mfi14 => "mfi_14",
            Feature::Macd => "macd",
            Feature::MacdSignal => "macd_signal",
            Feature::MacdHist => "macd_hist",
            Feature::BbPercent => "bb_percent",
            Feature::DistEma200 => "dist_ema_200",
        }
    }

    pub fn is_derived(&self) -> bool {
        Feature::DERIVED.contains(self)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct FeatureFrame {
    instrument: String,
    bars: Vec<Bar>,
    derived: BTreeMap<Feature, Vec<f64>>,
}

impl FeatureFrame {
    /// A frame holding only the raw OHLCV columns.
    pub fn new(instrument: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            instrument: instrument.into(),
            bars,
            derived: BTreeMap::new(),
        }
    }

    /// Attaches a derived column; its length must match the bar count.
    pub fn with_column(mut self, feature: Feature, values: Vec<f64>) -> Result<Self, StockcastError> {
        if !feature.is_derived() {
            return Err(StockcastError::Model {
                reason: format!("{} is a raw column and cannot be replaced", feature),
            });
        }
        if values.len() != self.bars.len() {
            return Err(StockcastError::Model {
                reason: format!(
                    "column {} has {} values for {} bars",
                    feature,
                    values.len(),
                    self.bars.len()
                ),
            });
        }
        self.derived.insert(feature, values);
        Ok(self)
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn has_column(&self, feature: Feature) -> bool {
        !feature.is_derived() || self.derived.contains_key(&feature)
    }

    pub fn value(&self, feature: Feature, row: usize) -> Option<f64> {
        let bar = self.bars.get(row)?;
        match feature {
            Feature::Open => Some(bar.open),
            Feature::High => Some(bar.high),
            Feature::Low => Some(bar.low),
            Feature::Close => Some(bar.close),
            Feature::Volume => Some(bar.volume as f64),
            derived => self.derived.get(&derived)?.get(row).copied(),
        }
    }

    pub fn column(&self, feature: Feature) -> Option<Vec<f64>> {
        if !self.has_column(feature) {
            return None;
        }
        (0..self.bars.len()).map(|row| self.value(feature, row)).collect()
    }

    /// Log return on the frame's final row, if the column exists.
    pub fn last_log_return(&self) -> Option<f64> {
        self.value(Feature::LogReturn, self.bars.len().checked_sub(1)?)
    }
}

/// Builds the enriched frame for one instrument's ascending bar series.
///
/// Inputs shorter than [`MIN_ENRICH_ROWS`] come back unenriched. Otherwise
/// every row still inside some indicator's warm-up window is dropped, so the
/// result is dense.
pub fn enrich(instrument: &str, bars: Vec<Bar>) -> FeatureFrame {
    if bars.len() < MIN_ENRICH_ROWS {
        return FeatureFrame::new(instrument, bars);
    }

    let log_return: Vec<Option<f64>> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev = bars.get(i.checked_sub(1)?)?.close;
            let r = (bar.close / prev).ln();
            r.is_finite().then_some(r)
        })
        .collect();

    let macd_series = calculate_macd(
        &bars,
        macd::DEFAULT_FAST,
        macd::DEFAULT_SLOW,
        macd::DEFAULT_SIGNAL,
    );
    let macd_part = |pick: fn(f64, f64, f64) -> f64| -> Vec<Option<f64>> {
        macd_series
            .values
            .iter()
            .map(|p| match p.value {
                IndicatorValue::Macd {
                    line,
                    signal,
                    histogram,
                } if p.valid => Some(pick(line, signal, histogram)),
                _ => None,
            })
            .collect()
    };

    let bb_percent: Vec<Option<f64>> = calculate_bollinger(
        &bars,
        bollinger::DEFAULT_PERIOD,
        bollinger::DEFAULT_STDDEV_MULT_X100,
    )
    .values
    .iter()
    .zip(&bars)
    .map(|(p, bar)| match p.value {
        IndicatorValue::Bollinger { upper, lower, .. } if p.valid => {
            Some(percent_b(bar.close, upper, lower))
        }
        _ => None,
    })
    .collect();

    let dist_ema_200: Vec<Option<f64>> = calculate_ema(&bars, 200)
        .simple_values()
        .into_iter()
        .zip(&bars)
        .map(|(ema, bar)| ema.filter(|e| *e != 0.0).map(|e| (bar.close - e) / e))
        .collect();

    let columns: Vec<(Feature, Vec<Option<f64>>)> = vec![
        (Feature::LogReturn, log_return),
        (Feature::Rsi14, calculate_rsi(&bars, 14).simple_values()),
        (Feature::Roc10, calculate_roc(&bars, 10).simple_values()),
        (Feature::Atr14, calculate_atr(&bars, 14).simple_values()),
        (Feature::Mfi14, calculate_mfi(&bars, 14).simple_values()),
        (Feature::Macd, macd_part(|line, _, _| line)),
        (Feature::MacdSignal, macd_part(|_, signal, _| signal)),
        (Feature::MacdHist, macd_part(|_, _, hist| hist)),
        (Feature::BbPercent, bb_percent),
        (Feature::DistEma200, dist_ema_200),
    ];

    let keep: Vec<bool> = (0..bars.len())
        .map(|row| columns.iter().all(|(_, values)| values[row].is_some()))
        .collect();

    let dense_bars: Vec<Bar> = bars
        .into_iter()
        .zip(&keep)
        .filter_map(|(bar, &k)| k.then_some(bar))
        .collect();

    let derived = columns
        .into_iter()
        .map(|(feature, values)| {
            let dense = values
                .into_iter()
                .zip(&keep)
                .filter_map(|(v, &k)| if k { v } else { None })
                .collect();
            (feature, dense)
        })
        .collect();

    FeatureFrame {
        instrument: instrument.to_string(),
        bars: dense_bars,
        derived,
    }
}
