//! ROC (Rate of Change).
//!
//! ROC(n)[i] = ((C[i] - C[i-n]) / C[i-n]) * 100
//! If C[i-n] == 0: ROC = 0
//! Warmup: first n bars invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_roc(bars: &[Bar], period: usize) -> IndicatorSeries {
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = i >= period;
            let value = if valid {
                let prev_close = bars[i - period].close;
                if prev_close == 0.0 {
                    0.0
                } else {
                    ((bar.close - prev_close) / prev_close) * 100.0
                }
            } else {
                0.0
            };
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Simple(value),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Roc(period),
        values,
    }
}
