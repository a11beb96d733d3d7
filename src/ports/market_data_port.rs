//! Market data source port.

use crate::domain::error::StockcastError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

pub trait MarketDataPort {
    /// Instrument symbols in the universe, already normalized.
    fn list_instruments(&self) -> Result<Vec<String>, StockcastError>;

    /// Daily bars for `instrument` within `[start_date, end_date]`, ascending by date.
    fn fetch_bars(
        &self,
        instrument: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockcastError>;
}
