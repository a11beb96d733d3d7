//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper/Lower: Middle ± (multiplier × population StdDev)
//!
//! Warmup: first (period-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STDDEV_MULT_X100: u32 = 200;

pub fn calculate_bollinger(bars: &[Bar], period: usize, stddev_mult_x100: u32) -> IndicatorSeries {
    let warmup = period.saturating_sub(1);
    let mult = stddev_mult_x100 as f64 / 100.0;

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = period > 0 && i >= warmup;
            let (upper, middle, lower) = if valid {
                let window = &bars[i + 1 - period..=i];
                let middle = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
                let variance = window
                    .iter()
                    .map(|b| (b.close - middle).powi(2))
                    .sum::<f64>()
                    / period as f64;
                let stddev = variance.sqrt();
                (middle + mult * stddev, middle, middle - mult * stddev)
            } else {
                (0.0, 0.0, 0.0)
            };
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        values,
    }
}

/// Position of `close` inside the bands: 0 at the lower band, 1 at the upper.
/// Collapsed bands (zero width) place the close in the middle.
pub fn percent_b(close: f64, upper: f64, lower: f64) -> f64 {
    let width = upper - lower;
    if width == 0.0 {
        0.5
    } else {
        (close - lower) / width
    }
}
