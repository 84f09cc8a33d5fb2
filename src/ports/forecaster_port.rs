//! Forecasting model port.

use crate::domain::arima::ArimaOrder;
use crate::domain::error::ForecastError;
use crate::domain::forecaster::TrainedForecast;
use crate::domain::window::HistoricalWindow;

/// Trains on a window and returns `horizon` point forecasts.
///
/// `configs` is tried in order; the first configuration that fits produces
/// the forecast. The fitted model never leaves the implementation.
pub trait Forecaster {
    fn train_and_forecast(
        &self,
        window: &HistoricalWindow,
        horizon: usize,
        configs: &[ArimaOrder],
    ) -> Result<TrainedForecast, ForecastError>;
}
