//! Time-series persistence port.

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::error::ForecastError;
use crate::domain::observation::{ForecastRecord, Observation};

/// Outcome of a best-effort bulk write.
///
/// Rows that could not be written after the per-row retry are counted in
/// `failed`; they do not turn the call into an `Err`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub written: usize,
    pub failed: usize,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Durable storage for daily closes and point forecasts.
pub trait TimeSeriesStore {
    /// Observations for `symbol` dated on or after `today - lookback_days`,
    /// oldest first.
    fn read_observations(
        &self,
        symbol: &str,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<Vec<Observation>, ForecastError>;

    /// Upserts by `(symbol, date)`.
    fn write_observations(
        &self,
        symbol: &str,
        observations: &[Observation],
    ) -> Result<WriteReport, ForecastError>;

    /// The newest forecast record whose target date is `as_of`.
    fn read_latest_forecast(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ForecastRecord>, ForecastError>;

    /// Appends one record; older records for the same key are kept.
    fn write_forecast(&self, record: &ForecastRecord) -> Result<(), ForecastError>;
}
