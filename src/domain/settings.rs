//! Typed, validated configuration.
//!
//! [`Settings::from_config`] reads every section the service understands
//! from a [`ConfigPort`], applies defaults for absent keys, and rejects
//! values that would make the forecast cycle meaningless.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::arima::{ArimaOrder, MAX_DIFFERENCE, MAX_LAG};
use crate::domain::error::ForecastError;
use crate::ports::config_port::ConfigPort;

/// Longest horizon a single request may ask for.
pub const MAX_HORIZON_DAYS: usize = 30;

/// Upper bounds for integer keys; larger values are configuration mistakes.
const MAX_LOOKBACK_DAYS: i64 = 3_650;
const MAX_FRESHNESS_HOURS: i64 = 24 * 365;
const MAX_POOL_SIZE: i64 = 64;
const MAX_BATCH_SIZE: i64 = 10_000;

pub const ALPHAVANTAGE_API_KEY_ENV: &str = "ALPHAVANTAGE_API_KEY";
pub const ALPHAVANTAGE_DEFAULT_URL: &str = "https://www.alphavantage.co/query";

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSettings {
    pub horizon_days: usize,
    pub min_history_days: usize,
    pub lookback_days: u32,
    pub freshness_hours: i64,
    pub primary_order: ArimaOrder,
    pub fallback_order: ArimaOrder,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizon_days: 1,
            min_history_days: 30,
            lookback_days: 100,
            freshness_hours: 24,
            primary_order: ArimaOrder::new(2, 1, 2),
            fallback_order: ArimaOrder::new(1, 1, 1),
        }
    }
}

impl ForecastSettings {
    /// Configurations in the order the forecaster should try them.
    pub fn model_configs(&self) -> Vec<ArimaOrder> {
        vec![self.primary_order, self.fallback_order]
    }

    pub fn freshness(&self) -> chrono::Duration {
        chrono::Duration::hours(self.freshness_hours)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub pool_size: u32,
    pub batch_size: usize,
    pub busy_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            pool_size: 4,
            batch_size: 50,
            busy_timeout: Duration::from_millis(5_000),
            connection_timeout: Duration::from_millis(30_000),
        }
    }
}

impl StoreSettings {
    /// Reads the `[sqlite]` tuning keys; the Postgres store shares the
    /// batch size and timeouts.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ForecastError> {
        let defaults = Self::default();
        Ok(Self {
            pool_size: bounded_int(
                config,
                "sqlite",
                "pool_size",
                defaults.pool_size as i64,
                MAX_POOL_SIZE,
            )? as u32,
            batch_size: bounded_int(
                config,
                "sqlite",
                "batch_size",
                defaults.batch_size as i64,
                MAX_BATCH_SIZE,
            )? as usize,
            busy_timeout: millis(config, "sqlite", "busy_timeout_ms", defaults.busy_timeout)?,
            connection_timeout: millis(
                config,
                "sqlite",
                "connection_timeout_ms",
                defaults.connection_timeout,
            )?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlphaVantageSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AlphaVantageSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: ALPHAVANTAGE_DEFAULT_URL.to_string(),
            timeout: Duration::from_millis(10_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WarmUpSettings {
    pub symbols: Vec<String>,
    pub pause: Duration,
}

impl Default for WarmUpSettings {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            pause: Duration::from_millis(15_000),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub forecast: ForecastSettings,
    pub store: StoreSettings,
    pub alphavantage: AlphaVantageSettings,
    pub csv_dir: Option<PathBuf>,
    pub warmup: WarmUpSettings,
}

impl Settings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ForecastError> {
        Ok(Self {
            forecast: load_forecast(config)?,
            store: StoreSettings::from_config(config)?,
            alphavantage: load_alphavantage(config)?,
            csv_dir: non_empty(config.get_string("csv", "directory")).map(PathBuf::from),
            warmup: load_warmup(config)?,
        })
    }
}

/// Checks a requested horizon against `1..=MAX_HORIZON_DAYS`.
pub fn validate_horizon(horizon_days: usize) -> Result<usize, ForecastError> {
    if horizon_days == 0 || horizon_days > MAX_HORIZON_DAYS {
        return Err(ForecastError::InvalidRequest {
            reason: format!(
                "horizon must be between 1 and {MAX_HORIZON_DAYS} days, got {horizon_days}"
            ),
        });
    }
    Ok(horizon_days)
}

fn load_forecast(config: &dyn ConfigPort) -> Result<ForecastSettings, ForecastError> {
    let defaults = ForecastSettings::default();

    let horizon = positive_int(config, "forecast", "horizon_days", defaults.horizon_days as i64)?;
    validate_horizon(horizon as usize).map_err(|e| {
        ForecastError::config_invalid("forecast", "horizon_days", e.to_string())
    })?;

    let min_history = positive_int(
        config,
        "forecast",
        "min_history_days",
        defaults.min_history_days as i64,
    )?;
    let lookback = bounded_int(
        config,
        "forecast",
        "lookback_days",
        defaults.lookback_days as i64,
        MAX_LOOKBACK_DAYS,
    )?;
    if lookback < min_history {
        return Err(ForecastError::config_invalid(
            "forecast",
            "lookback_days",
            format!("lookback_days ({lookback}) must cover min_history_days ({min_history})"),
        ));
    }

    let freshness = bounded_int(
        config,
        "forecast",
        "freshness_hours",
        defaults.freshness_hours,
        MAX_FRESHNESS_HOURS,
    )?;

    Ok(ForecastSettings {
        horizon_days: horizon as usize,
        min_history_days: min_history as usize,
        lookback_days: lookback as u32,
        freshness_hours: freshness,
        primary_order: order(config, "primary_order", defaults.primary_order)?,
        fallback_order: order(config, "fallback_order", defaults.fallback_order)?,
    })
}

fn load_alphavantage(config: &dyn ConfigPort) -> Result<AlphaVantageSettings, ForecastError> {
    let defaults = AlphaVantageSettings::default();
    let api_key = non_empty(config.get_string("alphavantage", "api_key"))
        .or_else(|| non_empty(std::env::var(ALPHAVANTAGE_API_KEY_ENV).ok()));
    Ok(AlphaVantageSettings {
        api_key,
        base_url: non_empty(config.get_string("alphavantage", "base_url"))
            .unwrap_or(defaults.base_url),
        timeout: millis(config, "alphavantage", "timeout_ms", defaults.timeout)?,
    })
}

fn load_warmup(config: &dyn ConfigPort) -> Result<WarmUpSettings, ForecastError> {
    let defaults = WarmUpSettings::default();
    let symbols = config
        .get_string("warmup", "symbols")
        .map(|s| parse_symbol_list(&s))
        .unwrap_or_default();
    let pause_ms = config.get_int("warmup", "pause_ms", defaults.pause.as_millis() as i64);
    if pause_ms < 0 {
        return Err(ForecastError::config_invalid(
            "warmup",
            "pause_ms",
            "pause_ms must be non-negative",
        ));
    }
    Ok(WarmUpSettings {
        symbols,
        pause: Duration::from_millis(pause_ms as u64),
    })
}

/// Splits a comma separated symbol list, uppercasing and dropping blanks.
pub fn parse_symbol_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn positive_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, ForecastError> {
    let value = config.get_int(section, key, default);
    if value <= 0 {
        return Err(ForecastError::config_invalid(
            section,
            key,
            format!("{key} must be positive"),
        ));
    }
    Ok(value)
}

fn bounded_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    max: i64,
) -> Result<i64, ForecastError> {
    let value = positive_int(config, section, key, default)?;
    if value > max {
        return Err(ForecastError::config_invalid(
            section,
            key,
            format!("{key} must be at most {max}, got {value}"),
        ));
    }
    Ok(value)
}

fn millis(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Duration,
) -> Result<Duration, ForecastError> {
    let value = positive_int(config, section, key, default.as_millis() as i64)?;
    Ok(Duration::from_millis(value as u64))
}

fn order(
    config: &dyn ConfigPort,
    key: &str,
    default: ArimaOrder,
) -> Result<ArimaOrder, ForecastError> {
    match config.get_string("forecast", key) {
        None => Ok(default),
        Some(raw) => ArimaOrder::parse(&raw).ok_or_else(|| {
            ForecastError::config_invalid(
                "forecast",
                key,
                format!(
                    "expected \"p,d,q\" with lags up to {MAX_LAG} and d up to \
                     {MAX_DIFFERENCE}, got \"{raw}\""
                ),
            )
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
