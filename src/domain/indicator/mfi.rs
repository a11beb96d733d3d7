//! Money Flow Index.
//!
//! Raw money flow = typical price × volume. A bar's flow counts as positive
//! when its typical price rose against the previous bar and negative when it
//! fell; unchanged bars contribute to neither side.
//!
//! MFI = 100 - 100 / (1 + Σpositive / Σnegative) over the last n flows;
//! Σnegative == 0 gives 100.
//! Warmup: first n bars are invalid (the first bar has no flow direction).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_mfi(bars: &[Bar], period: usize) -> IndicatorSeries {
    let mut positive = vec![0.0; bars.len()];
    let mut negative = vec![0.0; bars.len()];

    for i in 1..bars.len() {
        let tp = bars[i].typical_price();
        let prev_tp = bars[i - 1].typical_price();
        if tp > prev_tp {
            positive[i] = bars[i].money_flow();
        } else if tp < prev_tp {
            negative[i] = bars[i].money_flow();
        }
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = period > 0 && i >= period;
            let value = if valid {
                let window = i + 1 - period..=i;
                let pos: f64 = positive[window.clone()].iter().sum();
                let neg: f64 = negative[window].iter().sum();
                if neg == 0.0 {
                    100.0
                } else {
                    100.0 - 100.0 / (1.0 + pos / neg)
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
        indicator_type: IndicatorType::Mfi(period),
        values,
    }
}
