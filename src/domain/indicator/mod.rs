//! Technical indicator implementations.
//!
//! Every calculator takes an ascending bar slice and returns an
//! [`IndicatorSeries`] with exactly one point per input bar. Points inside an
//! indicator's warm-up window are flagged `valid == false`.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod mfi;
pub mod roc;
pub mod rsi;

pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use mfi::calculate_mfi;
pub use roc::calculate_roc;
pub use rsi::calculate_rsi;

use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    Roc(usize),
    Atr(usize),
    Mfi(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Scalar value at `index`, `None` during warm-up or for composite indicators.
    pub fn simple_at(&self, index: usize) -> Option<f64> {
        let point = self.values.get(index)?;
        match point.value {
            IndicatorValue::Simple(v) if point.valid => Some(v),
            _ => None,
        }
    }

    /// The whole series as scalars, warm-up points mapped to `None`.
    pub fn simple_values(&self) -> Vec<Option<f64>> {
        (0..self.values.len()).map(|i| self.simple_at(i)).collect()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_at_hides_warmup_points() {
        let bars = test_bars::from_closes(&[10.0, 20.0, 30.0]);
        let series = calculate_ema(&bars, 2);

        assert_eq!(series.simple_at(0), None);
        assert_eq!(series.simple_at(1), Some(15.0));
        assert_eq!(series.simple_at(5), None);
        assert_eq!(series.simple_values().len(), 3);
    }

    #[test]
    fn simple_at_ignores_composite_values() {
        let bars = test_bars::from_closes(&[10.0, 20.0, 30.0]);
        let series = calculate_bollinger(&bars, 2, 200);
        assert!(series.values[2].valid);
        assert_eq!(series.simple_at(2), None);
    }
}
