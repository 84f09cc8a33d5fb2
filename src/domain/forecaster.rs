//! ARIMA forecaster with ordered configuration fallback.

use chrono::{Duration, NaiveDate};
use log::{debug, info, warn};
use serde::Serialize;

use crate::domain::arima::{self, ArimaOrder};
use crate::domain::error::{FitAttempt, ForecastError};
use crate::domain::window::HistoricalWindow;
use crate::ports::forecaster_port::Forecaster;

/// Share of the window used as the training prefix for the hold-out check.
pub const HOLDOUT_TRAIN_FRACTION: f64 = 0.8;

const CONFIDENCE_BASE: usize = 70;
const CONFIDENCE_BONUS_CAP: usize = 25;
const CONFIDENCE_CEILING: usize = 95;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Out-of-sample accuracy of the first configuration on the last 20 % of
/// the window. Observability only; never decides success.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldoutDiagnostics {
    pub model: String,
    pub train_size: usize,
    pub test_size: usize,
    pub rmse: f64,
    pub mae: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainedForecast {
    pub order: ArimaOrder,
    pub points: Vec<ForecastPoint>,
    pub window_len: usize,
    pub diagnostics: Option<HoldoutDiagnostics>,
    /// Configurations that failed before `order` succeeded.
    pub failed_attempts: Vec<FitAttempt>,
}

impl TrainedForecast {
    pub fn model(&self) -> String {
        self.order.to_string()
    }
}

/// Presentation-only confidence: `min(95, 70 + min(len / 2, 25))`.
///
/// Grows with the amount of history and says nothing about the statistical
/// uncertainty of the forecast. Do not read it as an interval or probability.
pub fn confidence_score(window_len: usize) -> u8 {
    let score = CONFIDENCE_BASE + (window_len / 2).min(CONFIDENCE_BONUS_CAP);
    score.min(CONFIDENCE_CEILING) as u8
}

/// Fits `order` on the first 80 % of `closes` and scores it on the rest.
pub fn holdout_diagnostics(closes: &[f64], order: ArimaOrder) -> Option<HoldoutDiagnostics> {
    let train_size = (closes.len() as f64 * HOLDOUT_TRAIN_FRACTION) as usize;
    let (train, test) = closes.split_at(train_size);
    if test.is_empty() {
        return None;
    }

    let model = match arima::fit(train, order) {
        Ok(m) => m,
        Err(e) => {
            debug!("hold-out fit of {} skipped: {}", order, e);
            return None;
        }
    };

    let predicted = model.forecast(test.len());
    let n = test.len() as f64;
    let mut squared = 0.0;
    let mut absolute = 0.0;
    for (actual, pred) in test.iter().zip(&predicted) {
        let err = actual - pred;
        squared += err * err;
        absolute += err.abs();
    }

    Some(HoldoutDiagnostics {
        model: order.to_string(),
        train_size,
        test_size: test.len(),
        rmse: (squared / n).sqrt(),
        mae: absolute / n,
    })
}

/// Production forecaster backed by [`arima::fit`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ArimaForecaster;

impl Forecaster for ArimaForecaster {
    fn train_and_forecast(
        &self,
        window: &HistoricalWindow,
        horizon: usize,
        configs: &[ArimaOrder],
    ) -> Result<TrainedForecast, ForecastError> {
        let last_date = match window.last_date() {
            Some(d) => d,
            None => {
                return Err(ForecastError::InvalidRequest {
                    reason: format!("empty history window for {}", window.symbol()),
                });
            }
        };
        if horizon == 0 {
            return Err(ForecastError::InvalidRequest {
                reason: "forecast horizon must be at least 1".into(),
            });
        }

        let closes = window.closes();

        let diagnostics = configs
            .first()
            .and_then(|order| holdout_diagnostics(&closes, *order));
        if let Some(d) = &diagnostics {
            info!(
                "{} hold-out {}: train={} test={} rmse={:.4} mae={:.4}",
                window.symbol(),
                d.model,
                d.train_size,
                d.test_size,
                d.rmse,
                d.mae
            );
        }

        let mut failed_attempts = Vec::new();
        for order in configs {
            match arima::fit(&closes, *order) {
                Ok(model) => {
                    info!(
                        "{} trained {} on {} days ({} iterations, sigma2={:.6})",
                        window.symbol(),
                        model.order(),
                        closes.len(),
                        model.iterations(),
                        model.sigma2()
                    );
                    debug!(
                        "{} coefficients ar={:?} ma={:?}",
                        model.order(),
                        model.ar(),
                        model.ma()
                    );
                    let points = model
                        .forecast(horizon)
                        .into_iter()
                        .enumerate()
                        .map(|(i, value)| ForecastPoint {
                            date: last_date + Duration::days(i as i64 + 1),
                            value,
                        })
                        .collect();
                    return Ok(TrainedForecast {
                        order: *order,
                        points,
                        window_len: closes.len(),
                        diagnostics,
                        failed_attempts,
                    });
                }
                Err(error) => {
                    warn!("{} {} failed: {}", window.symbol(), order, error);
                    failed_attempts.push(FitAttempt {
                        model: order.to_string(),
                        error,
                    });
                }
            }
        }

        Err(ForecastError::TrainingFailure {
            symbol: window.symbol().to_string(),
            attempts: failed_attempts,
        })
    }
}
