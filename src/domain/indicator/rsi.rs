//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); avg_loss == 0 gives 100.
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_rsi(bars: &[Bar], period: usize) -> IndicatorSeries {
    let invalid = |bar: &Bar| IndicatorPoint {
        date: bar.date,
        valid: false,
        value: IndicatorValue::Simple(0.0),
    };

    if period == 0 || bars.len() < 2 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values: bars.iter().map(invalid).collect(),
        };
    }

    let mut values = Vec::with_capacity(bars.len());
    values.push(invalid(&bars[0]));

    let (gains, losses): (Vec<f64>, Vec<f64>) = bars
        .windows(2)
        .map(|w| {
            let change = w[1].close - w[0].close;
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, bar) in bars.iter().enumerate().skip(1) {
        let change_idx = i - 1;

        if change_idx + 1 < period {
            values.push(invalid(bar));
            continue;
        }

        if change_idx + 1 == period {
            avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
            avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gains[change_idx]) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + losses[change_idx]) / period as f64;
        }

        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Simple(rsi_from_averages(avg_gain, avg_loss)),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}
