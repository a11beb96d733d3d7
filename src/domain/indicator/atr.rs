//! Average True Range with Wilder's smoothing.
//!
//! TR[0] = high - low; TR[i] = true range against the previous close.
//! Seed = mean of the first n TR values, then ATR = (prev * (n-1) + TR) / n.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_atr(bars: &[Bar], period: usize) -> IndicatorSeries {
    if period == 0 || bars.len() < period {
        return IndicatorSeries {
            indicator_type: IndicatorType::Atr(period),
            values: bars
                .iter()
                .map(|b| IndicatorPoint {
                    date: b.date,
                    valid: false,
                    value: IndicatorValue::Simple(0.0),
                })
                .collect(),
        };
    }

    let tr_values: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let mut values = Vec::with_capacity(bars.len());
    let mut atr = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let valid = i + 1 >= period;
        if i + 1 == period {
            atr = tr_values[..period].iter().sum::<f64>() / period as f64;
        } else if valid {
            atr = (atr * (period - 1) as f64 + tr_values[i]) / period as f64;
        }
        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: IndicatorValue::Simple(if valid { atr } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bar(day: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            instrument: "TEST".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    fn staircase() -> Vec<Bar> {
        vec![
            make_bar(1, 110.0, 100.0, 105.0),
            make_bar(2, 115.0, 105.0, 110.0),
            make_bar(3, 120.0, 110.0, 115.0),
            make_bar(4, 125.0, 115.0, 120.0),
        ]
    }

    #[test]
    fn atr_warmup() {
        let series = calculate_atr(&staircase(), 3);
        assert_eq!(series.values.len(), 4);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[3].valid);
    }

    #[test]
    fn atr_seed_is_average() {
        let series = calculate_atr(&staircase(), 3);
        assert!((series.simple_at(2).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let series = calculate_atr(&staircase(), 3);
        let expected = (10.0 * 2.0 + 10.0) / 3.0;
        assert!((series.simple_at(3).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_gap_widens_true_range() {
        let bars = vec![
            make_bar(1, 110.0, 100.0, 105.0),
            make_bar(2, 130.0, 120.0, 125.0),
        ];
        let series = calculate_atr(&bars, 1);
        // |130 - 105| = 25 beats high-low of 10
        assert!((series.simple_at(1).unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn atr_insufficient_bars_all_invalid() {
        let series = calculate_atr(&staircase()[..2], 5);
        assert_eq!(series.values.len(), 2);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
