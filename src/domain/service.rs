//! Request/response boundary.
//!
//! [`PredictionService`] is what a request layer (the CLI here) talks to.
//! Every operation normalizes the symbol, delegates to the store or the
//! orchestrator, and returns a serde-serializable payload or a
//! [`ForecastError`] whose [`kind`](ForecastError::kind) maps to a status.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::domain::error::ForecastError;
use crate::domain::guarantor::{DataCompletenessGuarantor, WarmUpOutcome};
use crate::domain::markets::{self, Market, SUPPORTED_MARKETS};
use crate::domain::orchestrator::{round2, ForecastOrchestrator, PredictionResult};
use crate::domain::settings::Settings;
use crate::domain::window::HistoricalWindow;
use crate::ports::clock_port::Clock;
use crate::ports::forecaster_port::Forecaster;
use crate::ports::market_data_port::MarketDataProvider;
use crate::ports::store_port::TimeSeriesStore;

const OPEN_FACTOR: f64 = 0.995;
const HIGH_FACTOR: f64 = 1.015;
const LOW_FACTOR: f64 = 0.985;
const INDICATIVE_VOLUME: u64 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Stored,
    Reference,
}

/// Last known close with an indicative open/high/low band around it.
///
/// The band is derived from the close, not observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub name: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub last_updated: NaiveDate,
    pub data_points: usize,
    pub source: SnapshotSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataStatus {
    pub symbol: String,
    pub today: NaiveDate,
    pub has_historical_data: bool,
    pub historical_days: usize,
    pub last_close: Option<f64>,
    pub last_date: Option<NaiveDate>,
    pub has_today_prediction: bool,
    pub today_prediction: Option<f64>,
    pub needs_more_data: bool,
    pub timestamp: DateTime<Utc>,
}

pub struct PredictionService<'a> {
    store: &'a dyn TimeSeriesStore,
    provider: &'a dyn MarketDataProvider,
    forecaster: &'a dyn Forecaster,
    clock: &'a dyn Clock,
    settings: &'a Settings,
}

impl<'a> PredictionService<'a> {
    pub fn new(
        store: &'a dyn TimeSeriesStore,
        provider: &'a dyn MarketDataProvider,
        forecaster: &'a dyn Forecaster,
        clock: &'a dyn Clock,
        settings: &'a Settings,
    ) -> Self {
        Self {
            store,
            provider,
            forecaster,
            clock,
            settings,
        }
    }

    pub fn get_markets(&self) -> &'static [Market] {
        &SUPPORTED_MARKETS
    }

    pub fn get_market_data(&self, symbol: &str) -> Result<MarketSnapshot, ForecastError> {
        let symbol = markets::normalize_symbol(symbol)?;
        let today = self.clock.today();
        let history = self.history(&symbol, today)?;

        let (close, last_updated, source) = match history.last() {
            Some(obs) => (obs.close, obs.date, SnapshotSource::Stored),
            None => (
                markets::reference_price(&symbol),
                today - Duration::days(1),
                SnapshotSource::Reference,
            ),
        };

        Ok(MarketSnapshot {
            name: markets::display_name(&symbol),
            symbol,
            open: round2(close * OPEN_FACTOR),
            high: round2(close * HIGH_FACTOR),
            low: round2(close * LOW_FACTOR),
            close: round2(close),
            volume: INDICATIVE_VOLUME,
            last_updated,
            data_points: history.len(),
            source,
        })
    }

    /// Forecast over the configured default horizon.
    pub fn get_prediction(&self, symbol: &str) -> Result<PredictionResult, ForecastError> {
        self.get_prediction_for(symbol, self.settings.forecast.horizon_days)
    }

    pub fn get_prediction_for(
        &self,
        symbol: &str,
        horizon_days: usize,
    ) -> Result<PredictionResult, ForecastError> {
        let symbol = markets::normalize_symbol(symbol)?;
        self.orchestrator().get_or_compute(
            &symbol,
            horizon_days,
            self.settings.forecast.min_history_days,
        )
    }

    pub fn get_status(&self, symbol: &str) -> Result<DataStatus, ForecastError> {
        let symbol = markets::normalize_symbol(symbol)?;
        let now = self.clock.now();
        let today = now.date_naive();
        let history = self.history(&symbol, today)?;
        let prediction = match self.store.read_latest_forecast(&symbol, today) {
            Ok(record) => record,
            Err(e) => {
                warn!("reading today's forecast for {} failed: {}", symbol, e);
                None
            }
        };

        Ok(DataStatus {
            today,
            has_historical_data: !history.is_empty(),
            historical_days: history.len(),
            last_close: history.last().map(|o| o.close),
            last_date: history.last_date(),
            has_today_prediction: prediction.is_some(),
            today_prediction: prediction.map(|r| r.predicted_close),
            needs_more_data: history.len() < self.settings.forecast.min_history_days,
            timestamp: now,
            symbol,
        })
    }

    /// Tops up history for `symbols`, or for the configured warm-up list
    /// (falling back to the full catalog) when `symbols` is empty.
    pub fn warm_up(&self, symbols: &[String]) -> Result<Vec<WarmUpOutcome>, ForecastError> {
        let requested: Vec<String> = if !symbols.is_empty() {
            symbols.to_vec()
        } else if !self.settings.warmup.symbols.is_empty() {
            self.settings.warmup.symbols.clone()
        } else {
            SUPPORTED_MARKETS.iter().map(|m| m.symbol.to_string()).collect()
        };
        let normalized = requested
            .iter()
            .map(|s| markets::normalize_symbol(s))
            .collect::<Result<Vec<_>, _>>()?;

        info!("warming up {} symbols", normalized.len());
        let guarantor = DataCompletenessGuarantor::new(
            self.store,
            self.provider,
            self.settings.forecast.lookback_days,
        );
        Ok(guarantor.warm_up(
            &normalized,
            self.settings.forecast.min_history_days,
            self.clock.today(),
            self.settings.warmup.pause,
        ))
    }

    fn orchestrator(&self) -> ForecastOrchestrator<'_> {
        ForecastOrchestrator::new(
            self.store,
            self.provider,
            self.forecaster,
            self.clock,
            &self.settings.forecast,
        )
    }

    fn history(&self, symbol: &str, today: NaiveDate) -> Result<HistoricalWindow, ForecastError> {
        let rows = self
            .store
            .read_observations(symbol, self.settings.forecast.lookback_days, today)?;
        Ok(HistoricalWindow::build(symbol, rows, today))
    }
}
