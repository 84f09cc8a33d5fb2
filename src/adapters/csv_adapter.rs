//! Offline market data from a directory of `<SYMBOL>.csv` files.

use crate::domain::error::ForecastError;
use crate::domain::observation::{parse_day, Observation};
use crate::ports::market_data_port::MarketDataProvider;
use log::debug;
use std::fs;
use std::path::PathBuf;

const CLOSE_HEADERS: [&str; 3] = ["close", "4. close", "adj close"];

pub struct CsvMarketData {
    base_path: PathBuf,
}

impl CsvMarketData {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }
}

/// Index of the close column named in `headers`, if any. The first column
/// always holds the date and is never a candidate.
fn close_column(headers: &csv::StringRecord) -> Option<usize> {
    headers.iter().enumerate().skip(1).find_map(|(i, h)| {
        let name = h.trim().to_lowercase();
        CLOSE_HEADERS.contains(&name.as_str()).then_some(i)
    })
}

fn first_numeric(record: &csv::StringRecord) -> Option<f64> {
    record
        .iter()
        .skip(1)
        .find_map(|field| field.trim().parse::<f64>().ok())
}

impl MarketDataProvider for CsvMarketData {
    fn fetch_daily_series(&self, symbol: &str) -> Result<Vec<Observation>, ForecastError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| {
            ForecastError::UpstreamUnavailable {
                reason: format!("failed to read {}: {}", path.display(), e),
            }
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let close_idx = close_column(rdr.headers().map_err(|e| {
            ForecastError::UpstreamUnavailable {
                reason: format!("CSV header error in {}: {}", path.display(), e),
            }
        })?);

        let mut observations = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| ForecastError::UpstreamUnavailable {
                reason: format!("CSV parse error: {}", e),
            })?;

            let Some(date) = record.get(0).and_then(parse_day) else {
                debug!("skipping row without a valid date in {}", path.display());
                continue;
            };
            let close = match close_idx {
                Some(i) => record.get(i).and_then(|v| v.trim().parse::<f64>().ok()),
                None => first_numeric(&record),
            };
            let Some(close) = close else {
                debug!("skipping {} {}: no numeric close", symbol, date);
                continue;
            };

            match Observation::new(symbol, date, close) {
                Ok(obs) => observations.push(obs),
                Err(e) => debug!("skipping {} {}: {}", symbol, date, e),
            }
        }

        observations.sort_by_key(|o| o.date);
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        fs::write(
            path.join("AAPL.csv"),
            "date,open,high,low,Close,volume\n\
             2024-01-17,110.0,120.0,105.0,115.0,55000\n\
             2024-01-15,100.0,110.0,90.0,105.0,50000\n\
             2024-01-16,105.0,115.0,100.0,110.0,60000\n",
        )
        .unwrap();
        fs::write(
            path.join("MSFT.csv"),
            "timestamp,price\n\
             2024-01-15 16:00:00,400.5\n\
             not-a-date,401.0\n\
             2024-01-16 16:00:00,-3\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn reads_named_close_column_sorted() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let obs = adapter.fetch_daily_series("AAPL").unwrap();
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(obs[0].close, 105.0);
        assert_eq!(obs[2].close, 115.0);
    }

    #[test]
    fn falls_back_to_first_numeric_column_and_skips_bad_rows() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        let obs = adapter.fetch_daily_series("MSFT").unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].close, 400.5);
    }

    #[test]
    fn missing_file_is_upstream_unavailable() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvMarketData::new(path);

        assert!(matches!(
            adapter.fetch_daily_series("NVDA"),
            Err(ForecastError::UpstreamUnavailable { .. })
        ));
    }
}
