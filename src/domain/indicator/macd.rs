//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line, seeded with the SMA of its first
//! `signal` defined values
//! Histogram = MACD Line - Signal Line
//!
//! Warmup: max(fast, slow) - 1 + signal - 1 bars.

use crate::domain::indicator::ema::ema_over;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[Bar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };

    if bars.is_empty() || fast == 0 || slow == 0 || signal_period == 0 {
        return IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        };
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_fast = ema_over(&closes, fast);
    let ema_slow = ema_over(&closes, slow);

    let macd_line: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    // The signal EMA only starts once the line itself is defined.
    let first_defined = macd_line.iter().position(Option::is_some).unwrap_or(bars.len());
    let defined_line: Vec<f64> = macd_line[first_defined..].iter().flatten().copied().collect();
    let mut signal_line = vec![None; first_defined];
    signal_line.extend(ema_over(&defined_line, signal_period));

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let (valid, line, signal) = match (macd_line[i], signal_line[i]) {
                (Some(line), Some(signal)) => (true, line, signal),
                (line, _) => (false, line.unwrap_or(0.0), 0.0),
            };
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Macd {
                    line,
                    signal,
                    histogram: line - signal,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
