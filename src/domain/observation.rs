//! Daily close observations and persisted forecast records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::ForecastError;

/// One daily closing price for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
}

impl Observation {
    /// Rejects closes that are not positive finite reals.
    pub fn new(symbol: &str, date: NaiveDate, close: f64) -> Result<Self, ForecastError> {
        if !close.is_finite() || close <= 0.0 {
            return Err(ForecastError::InvalidRequest {
                reason: format!("close for {symbol} on {date} must be positive, got {close}"),
            });
        }
        Ok(Self {
            symbol: symbol.to_string(),
            date,
            close,
        })
    }
}

/// A stored point forecast for `(symbol, target_date)`.
///
/// Records are append-only; the one with the greatest `created_at` for a key
/// supersedes the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub symbol: String,
    pub target_date: NaiveDate,
    pub predicted_close: f64,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl ForecastRecord {
    /// Age of the record at `now`, in whole seconds.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

/// Parses a calendar date from the leading `YYYY-MM-DD` of `raw`.
///
/// Accepts plain dates as well as timestamps such as `2024-03-01 16:00:00`.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rejects_non_positive_close() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(Observation::new("AAPL", date, 0.0).is_err());
        assert!(Observation::new("AAPL", date, -3.0).is_err());
        assert!(Observation::new("AAPL", date, f64::NAN).is_err());
        assert!(Observation::new("AAPL", date, 185.2).is_ok());
    }

    #[test]
    fn parse_day_accepts_timestamps() {
        assert_eq!(
            parse_day("2024-03-01 16:00:00"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_day(" 2024-03-04 "), NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(parse_day("03/04/2024"), None);
    }

    #[test]
    fn record_age() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let record = ForecastRecord {
            symbol: "AAPL".into(),
            target_date: created.date_naive(),
            predicted_close: 180.0,
            model: "ARIMA(2,1,2)".into(),
            created_at: created,
        };
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(record.age_seconds(later), 5400);
    }
}
