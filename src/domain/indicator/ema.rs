//! Exponential Moving Average of close.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_ema(bars: &[Bar], period: usize) -> IndicatorSeries {
    if period == 0 || bars.is_empty() {
        return IndicatorSeries {
            indicator_type: IndicatorType::Ema(period),
            values: Vec::new(),
        };
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let values = ema_over(&closes, period)
        .into_iter()
        .zip(bars)
        .map(|(ema, bar)| IndicatorPoint {
            date: bar.date,
            valid: ema.is_some(),
            value: IndicatorValue::Simple(ema.unwrap_or(0.0)),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}

/// SMA-seeded EMA over an arbitrary series; `None` until `period` values are seen.
pub(crate) fn ema_over(series: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(series.len());
    if period == 0 {
        out.resize(series.len(), None);
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &x) in series.iter().enumerate() {
        if i < period - 1 {
            sum += x;
            out.push(None);
        } else if i == period - 1 {
            sum += x;
            ema = sum / period as f64;
            out.push(Some(ema));
        } else {
            ema = x * k + ema * (1.0 - k);
            out.push(Some(ema));
        }
    }
    out
}
