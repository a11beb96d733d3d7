//! Daily OHLCV bar representation.

use chrono::NaiveDate;

/// One daily observation for one instrument. Natural key is `(date, instrument)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub instrument: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// typical price * volume
    pub fn money_flow(&self) -> f64 {
        self.typical_price() * self.volume as f64
    }
}

/// Keeps only bars dated strictly after `watermark`; everything when there is none.
pub fn bars_after(bars: &[Bar], watermark: Option<NaiveDate>) -> Vec<Bar> {
    match watermark {
        Some(last) => bars.iter().filter(|b| b.date > last).cloned().collect(),
        None => bars.to_vec(),
    }
}
