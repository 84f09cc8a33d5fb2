//! Forecast cache orchestration.
//!
//! One call to [`ForecastOrchestrator::get_or_compute`] walks
//! CheckCache → (CacheHit | EnsureData → Train → Persist) → result. A fresh
//! stored forecast for today short-circuits everything after the cache
//! check; otherwise history is topped up, a model is trained, and every
//! forecast day is persisted before the result is returned.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::domain::error::ForecastError;
use crate::domain::forecaster::{confidence_score, HoldoutDiagnostics};
use crate::domain::guarantor::DataCompletenessGuarantor;
use crate::domain::observation::ForecastRecord;
use crate::domain::settings::{validate_horizon, ForecastSettings};
use crate::domain::window::HistoricalWindow;
use crate::ports::clock_port::Clock;
use crate::ports::forecaster_port::Forecaster;
use crate::ports::market_data_port::MarketDataProvider;
use crate::ports::store_port::TimeSeriesStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Cached,
    NewTraining,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HorizonPoint {
    pub date: NaiveDate,
    pub predicted_close: f64,
    /// Day-over-day change against the previous point, or against
    /// yesterday's close for the first point.
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub predicted_close: f64,
    pub prediction_date: NaiveDate,
    pub yesterday_close: Option<f64>,
    pub change_percent: f64,
    pub model: String,
    pub source: PredictionSource,
    /// Presentation heuristic derived from history length. Not a
    /// statistical confidence level.
    pub confidence: u8,
    pub data_points: usize,
    pub cache_hit: bool,
    pub horizon: Vec<HorizonPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<HoldoutDiagnostics>,
    pub message: String,
    pub generated_at: DateTime<Utc>,
}

/// Percentage change from `from` to `to`, rounded to two decimals.
/// Zero when `from` is not a positive price.
pub fn change_percent(from: f64, to: f64) -> f64 {
    if from <= 0.0 || !from.is_finite() {
        return 0.0;
    }
    round2((to - from) / from * 100.0)
}

/// Rounds to two decimal places.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// A stored record counts as current while it is younger than `freshness`.
pub fn is_fresh(record: &ForecastRecord, now: DateTime<Utc>, freshness: Duration) -> bool {
    record.age_seconds(now) < freshness.num_seconds()
}

/// Forecast writes are best effort: the computed result is still returned
/// to the caller, and the next request simply misses the cache.
fn ignore_persistence_failure(record: &ForecastRecord, error: &ForecastError) {
    warn!(
        "could not persist forecast for {} on {}: {}",
        record.symbol, record.target_date, error
    );
}

pub struct ForecastOrchestrator<'a> {
    store: &'a dyn TimeSeriesStore,
    provider: &'a dyn MarketDataProvider,
    forecaster: &'a dyn Forecaster,
    clock: &'a dyn Clock,
    settings: &'a ForecastSettings,
}

impl<'a> ForecastOrchestrator<'a> {
    pub fn new(
        store: &'a dyn TimeSeriesStore,
        provider: &'a dyn MarketDataProvider,
        forecaster: &'a dyn Forecaster,
        clock: &'a dyn Clock,
        settings: &'a ForecastSettings,
    ) -> Self {
        Self {
            store,
            provider,
            forecaster,
            clock,
            settings,
        }
    }

    pub fn get_or_compute(
        &self,
        symbol: &str,
        horizon_days: usize,
        minimum_history_days: usize,
    ) -> Result<PredictionResult, ForecastError> {
        let horizon_days = validate_horizon(horizon_days)?;
        if minimum_history_days == 0 {
            return Err(ForecastError::InvalidRequest {
                reason: "minimum history must be at least 1 day".into(),
            });
        }

        let now = self.clock.now();
        let today = now.date_naive();
        info!("forecast requested for {} on {} (horizon {})", symbol, today, horizon_days);

        if let Some(record) = self.check_cache(symbol, today, now) {
            return Ok(self.cache_hit(symbol, record, horizon_days, today, now));
        }

        let guarantor =
            DataCompletenessGuarantor::new(self.store, self.provider, self.settings.lookback_days);
        let window = guarantor.ensure_minimum_history(symbol, minimum_history_days, today);
        if window.len() < minimum_history_days {
            return Err(ForecastError::InsufficientData {
                symbol: symbol.to_string(),
                days: window.len(),
                minimum: minimum_history_days,
            });
        }
        let yesterday_close = window.last().map(|o| o.close);

        let trained = self.forecaster.train_and_forecast(
            &window,
            horizon_days,
            &self.settings.model_configs(),
        )?;
        let model = trained.model();
        if trained.points.len() != horizon_days {
            return Err(ForecastError::TrainingFailure {
                symbol: symbol.to_string(),
                attempts: trained.failed_attempts,
            });
        }

        let values: Vec<(NaiveDate, f64)> = trained
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (today + Duration::days(i as i64), p.value))
            .collect();
        let horizon = horizon_points(yesterday_close, &values);

        for (date, value) in &values {
            let record = ForecastRecord {
                symbol: symbol.to_string(),
                target_date: *date,
                predicted_close: *value,
                model: model.clone(),
                created_at: now,
            };
            if let Err(e) = self.store.write_forecast(&record) {
                ignore_persistence_failure(&record, &e);
            }
        }

        let (predicted_close, first_change) =
            (horizon[0].predicted_close, horizon[0].change_percent);
        info!(
            "{} {} forecast for {}: {:.2} ({:+.2}%)",
            symbol, model, today, predicted_close, first_change
        );

        Ok(PredictionResult {
            symbol: symbol.to_string(),
            predicted_close,
            prediction_date: today,
            yesterday_close,
            change_percent: first_change,
            model,
            source: PredictionSource::NewTraining,
            confidence: confidence_score(window.len()),
            data_points: window.len(),
            cache_hit: false,
            horizon,
            diagnostics: trained.diagnostics,
            message: format!("close forecast for {} based on {} days", today, window.len()),
            generated_at: now,
        })
    }

    fn check_cache(
        &self,
        symbol: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<ForecastRecord> {
        match self.store.read_latest_forecast(symbol, today) {
            Ok(Some(record)) if is_fresh(&record, now, self.settings.freshness()) => {
                debug!("cache hit for {} on {}", symbol, today);
                Some(record)
            }
            Ok(Some(record)) => {
                debug!(
                    "stale forecast for {} on {} ({}s old)",
                    symbol,
                    today,
                    record.age_seconds(now)
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("cache lookup for {} failed, recomputing: {}", symbol, e);
                None
            }
        }
    }

    fn cache_hit(
        &self,
        symbol: &str,
        today_record: ForecastRecord,
        horizon_days: usize,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> PredictionResult {
        let freshness = self.settings.freshness();
        let mut values = vec![(today, today_record.predicted_close)];
        for i in 1..horizon_days {
            let date = today + Duration::days(i as i64);
            match self.store.read_latest_forecast(symbol, date) {
                Ok(Some(r)) if is_fresh(&r, now, freshness) => {
                    values.push((date, r.predicted_close))
                }
                Ok(_) => {}
                Err(e) => warn!("reading cached forecast for {} on {} failed: {}", symbol, date, e),
            }
        }

        let history = match self
            .store
            .read_observations(symbol, self.settings.lookback_days, today)
        {
            Ok(rows) => HistoricalWindow::build(symbol, rows, today),
            Err(e) => {
                warn!("reading history for {} failed: {}", symbol, e);
                HistoricalWindow::build(symbol, Vec::new(), today)
            }
        };
        let yesterday_close = history.last().map(|o| o.close);
        let horizon = horizon_points(yesterday_close, &values);

        PredictionResult {
            symbol: symbol.to_string(),
            predicted_close: today_record.predicted_close,
            prediction_date: today,
            yesterday_close,
            change_percent: horizon[0].change_percent,
            model: today_record.model,
            source: PredictionSource::Cached,
            confidence: confidence_score(history.len()),
            data_points: history.len(),
            cache_hit: true,
            horizon,
            diagnostics: None,
            message: format!("recent forecast (<{}h) for {}", self.settings.freshness_hours, today),
            generated_at: now,
        }
    }
}

fn horizon_points(yesterday_close: Option<f64>, values: &[(NaiveDate, f64)]) -> Vec<HorizonPoint> {
    let mut previous = yesterday_close.unwrap_or(0.0);
    values
        .iter()
        .map(|(date, value)| {
            let point = HorizonPoint {
                date: *date,
                predicted_close: *value,
                change_percent: change_percent(previous, *value),
            };
            previous = *value;
            point
        })
        .collect()
}
