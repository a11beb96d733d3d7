//! CSV directory market-data source.
//!
//! One `<SYMBOL>.csv` per instrument with a `date,open,high,low,close,volume`
//! header. File stems are normalized the same way as configured codes, so
//! `brk.b.csv` serves `BRK-B`.

use crate::domain::error::StockcastError;
use crate::domain::ohlcv::Bar;
use crate::domain::universe::{normalize_symbol, normalize_universe};
use crate::ports::market_data_port::MarketDataPort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
    codes: Option<Vec<String>>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            codes: None,
        }
    }

    /// Restricts the universe to `codes` instead of every file in the directory.
    pub fn with_codes(mut self, codes: Vec<String>) -> Self {
        self.codes = Some(codes);
        self
    }

    fn unavailable(instrument: &str, reason: String) -> StockcastError {
        StockcastError::SourceUnavailable {
            instrument: instrument.to_string(),
            reason,
        }
    }

    /// Finds the file whose normalized stem equals `instrument`.
    fn csv_path(&self, instrument: &str) -> Result<PathBuf, StockcastError> {
        let direct = self.base_path.join(format!("{}.csv", instrument));
        if direct.is_file() {
            return Ok(direct);
        }

        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            Self::unavailable(
                instrument,
                format!("failed to read directory {}: {}", self.base_path.display(), e),
            )
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            let matches = path.extension().is_some_and(|ext| ext == "csv")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(normalize_symbol)
                    .is_some_and(|s| s == instrument);
            if matches {
                return Ok(path);
            }
        }

        Err(Self::unavailable(
            instrument,
            format!("no CSV file for {} in {}", instrument, self.base_path.display()),
        ))
    }
}

fn field<'a>(
    record: &'a csv::StringRecord,
    index: usize,
    name: &str,
    instrument: &str,
    line: u64,
) -> Result<&'a str, StockcastError> {
    record.get(index).map(str::trim).ok_or_else(|| {
        CsvAdapter::unavailable(instrument, format!("line {}: missing {} column", line, name))
    })
}

fn number<T: std::str::FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    instrument: &str,
    line: u64,
) -> Result<T, StockcastError>
where
    T::Err: std::fmt::Display,
{
    let raw = field(record, index, name, instrument, line)?;
    raw.parse().map_err(|e: T::Err| {
        CsvAdapter::unavailable(
            instrument,
            format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
        )
    })
}

impl MarketDataPort for CsvAdapter {
    fn list_instruments(&self) -> Result<Vec<String>, StockcastError> {
        if let Some(codes) = &self.codes {
            return Ok(codes.clone());
        }

        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            Self::unavailable(
                "universe",
                format!("failed to read directory {}: {}", self.base_path.display(), e),
            )
        })?;

        let mut stems = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                Self::unavailable("universe", format!("directory entry error: {}", e))
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    stems.push(stem.to_string());
                }
            }
        }

        let mut instruments = normalize_universe(stems);
        instruments.sort();
        Ok(instruments)
    }

    fn fetch_bars(
        &self,
        instrument: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, StockcastError> {
        let path = self.csv_path(instrument)?;
        let mut rdr = csv::Reader::from_path(&path).map_err(|e| {
            Self::unavailable(instrument, format!("failed to open {}: {}", path.display(), e))
        })?;

        let mut bars = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let line = i as u64 + 2;
            let record = result
                .map_err(|e| Self::unavailable(instrument, format!("CSV parse error: {}", e)))?;

            let date_str = field(&record, 0, "date", instrument, line)?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                Self::unavailable(
                    instrument,
                    format!("line {}: invalid date '{}': {}", line, date_str, e),
                )
            })?;
            if date < start_date || date > end_date {
                continue;
            }

            bars.push(Bar {
                instrument: instrument.to_string(),
                date,
                open: number(&record, 1, "open", instrument, line)?,
                high: number(&record, 2, "high", instrument, line)?,
                low: number(&record, 3, "low", instrument, line)?,
                close: number(&record, 4, "close", instrument, line)?,
                volume: number::<f64>(&record, 5, "volume", instrument, line)? as i64,
            });
        }

        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume\n\
            2024-01-03,184.2,185.9,183.4,184.3,58414500\n\
            2024-01-02,187.2,188.4,183.9,185.6,82488700\n\
            2024-01-04,182.2,183.1,180.9,181.9,71983600\n";

        fs::write(path.join("AAPL.csv"), csv_content).unwrap();
        fs::write(path.join("brk.b.csv"), "date,open,high,low,close,volume\n").unwrap();
        fs::write(path.join("notes.txt"), "not market data").unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_bars_returns_sorted_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("AAPL", d(2024, 1, 1), d(2024, 1, 31)).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, d(2024, 1, 2));
        assert_eq!(bars[0].instrument, "AAPL");
        assert_eq!(bars[0].open, 187.2);
        assert_eq!(bars[0].close, 185.6);
        assert_eq!(bars[0].volume, 82_488_700);
        assert_eq!(bars[2].date, d(2024, 1, 4));
    }

    #[test]
    fn fetch_bars_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_bars("AAPL", d(2024, 1, 3), d(2024, 1, 3)).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, d(2024, 1, 3));
    }

    #[test]
    fn fetch_bars_missing_file_is_source_unavailable() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let err = adapter.fetch_bars("XYZ", d(2024, 1, 1), d(2024, 1, 31)).unwrap_err();
        assert!(
            matches!(err, StockcastError::SourceUnavailable { instrument, .. } if instrument == "XYZ")
        );
    }

    #[test]
    fn fetch_bars_resolves_normalized_symbol() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let bars = adapter.fetch_bars("BRK-B", d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert!(bars.is_empty());
    }

    #[test]
    fn malformed_row_is_reported_with_line() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("MSFT.csv"),
            "date,open,high,low,close,volume\n2024-01-02,1,2,0.5,abc,10\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());

        let err = adapter.fetch_bars("MSFT", d(2024, 1, 1), d(2024, 1, 31)).unwrap_err();
        assert!(
            matches!(err, StockcastError::SourceUnavailable { reason, .. } if reason.contains("line 2") && reason.contains("close"))
        );
    }

    #[test]
    fn list_instruments_normalizes_file_stems() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        assert_eq!(adapter.list_instruments().unwrap(), vec!["AAPL", "BRK-B"]);
    }

    #[test]
    fn configured_codes_override_directory() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path).with_codes(vec!["MSFT".into()]);
        assert_eq!(adapter.list_instruments().unwrap(), vec!["MSFT"]);
    }

    #[test]
    fn missing_directory_fails_listing() {
        let adapter = CsvAdapter::new(PathBuf::from("/nonexistent/stockcast/bars"));
        assert!(adapter.list_instruments().is_err());
    }
}
