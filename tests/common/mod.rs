#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use closecast::domain::arima::ArimaOrder;
use closecast::domain::error::ForecastError;
use closecast::domain::forecaster::{ArimaForecaster, TrainedForecast};
use closecast::domain::observation::{ForecastRecord, Observation};
use closecast::domain::settings::Settings;
use closecast::domain::window::HistoricalWindow;
use closecast::ports::clock_port::Clock;
use closecast::ports::forecaster_port::Forecaster;
use closecast::ports::market_data_port::MarketDataProvider;
use closecast::ports::store_port::{TimeSeriesStore, WriteReport};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

/// In-memory store that records every write.
pub struct MockStore {
    observations: RefCell<BTreeMap<(String, NaiveDate), f64>>,
    forecasts: RefCell<Vec<ForecastRecord>>,
    fail_reads: bool,
    fail_forecast_reads: bool,
    fail_forecast_writes: bool,
    observation_writes: Cell<usize>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            observations: RefCell::new(BTreeMap::new()),
            forecasts: RefCell::new(Vec::new()),
            fail_reads: false,
            fail_forecast_reads: false,
            fail_forecast_writes: false,
            observation_writes: Cell::new(0),
        }
    }

    pub fn with_observations(self, observations: Vec<Observation>) -> Self {
        for obs in observations {
            self.observations
                .borrow_mut()
                .insert((obs.symbol.clone(), obs.date), obs.close);
        }
        self
    }

    pub fn with_forecast(self, record: ForecastRecord) -> Self {
        self.forecasts.borrow_mut().push(record);
        self
    }

    pub fn with_failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Forecast lookups fail while history reads keep working.
    pub fn with_failing_forecast_reads(mut self) -> Self {
        self.fail_forecast_reads = true;
        self
    }

    pub fn with_failing_forecast_writes(mut self) -> Self {
        self.fail_forecast_writes = true;
        self
    }

    pub fn forecasts(&self) -> Vec<ForecastRecord> {
        self.forecasts.borrow().clone()
    }

    pub fn stored(&self, symbol: &str) -> Vec<Observation> {
        self.observations
            .borrow()
            .iter()
            .filter(|((s, _), _)| s == symbol)
            .map(|((s, d), c)| Observation {
                symbol: s.clone(),
                date: *d,
                close: *c,
            })
            .collect()
    }

    pub fn observation_writes(&self) -> usize {
        self.observation_writes.get()
    }
}

impl TimeSeriesStore for MockStore {
    fn read_observations(
        &self,
        symbol: &str,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<Vec<Observation>, ForecastError> {
        if self.fail_reads {
            return Err(ForecastError::DatabaseQuery {
                reason: "store offline".into(),
            });
        }
        let start = today - Duration::days(i64::from(lookback_days));
        Ok(self
            .stored(symbol)
            .into_iter()
            .filter(|o| o.date >= start)
            .collect())
    }

    fn write_observations(
        &self,
        symbol: &str,
        observations: &[Observation],
    ) -> Result<WriteReport, ForecastError> {
        self.observation_writes.set(self.observation_writes.get() + 1);
        let mut map = self.observations.borrow_mut();
        for obs in observations {
            map.insert((symbol.to_string(), obs.date), obs.close);
        }
        Ok(WriteReport {
            written: observations.len(),
            failed: 0,
        })
    }

    fn read_latest_forecast(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ForecastRecord>, ForecastError> {
        if self.fail_reads || self.fail_forecast_reads {
            return Err(ForecastError::DatabaseQuery {
                reason: "store offline".into(),
            });
        }
        Ok(self
            .forecasts
            .borrow()
            .iter()
            .filter(|r| r.symbol == symbol && r.target_date == as_of)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    fn write_forecast(&self, record: &ForecastRecord) -> Result<(), ForecastError> {
        if self.fail_forecast_writes {
            return Err(ForecastError::PersistenceFailure {
                reason: "disk full".into(),
            });
        }
        self.forecasts.borrow_mut().push(record.clone());
        Ok(())
    }
}

/// Provider returning canned series and counting calls.
pub struct MockProvider {
    data: HashMap<String, Vec<Observation>>,
    errors: HashMap<String, String>,
    calls: Cell<usize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            calls: Cell::new(0),
        }
    }

    pub fn with_series(mut self, symbol: &str, observations: Vec<Observation>) -> Self {
        self.data.insert(symbol.to_string(), observations);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl MarketDataProvider for MockProvider {
    fn fetch_daily_series(&self, symbol: &str) -> Result<Vec<Observation>, ForecastError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(reason) = self.errors.get(symbol) {
            return Err(ForecastError::UpstreamUnavailable {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }
}

/// Clock that only moves when told to.
pub struct FixedClock {
    now: Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Real ARIMA forecaster that counts invocations.
pub struct SpyForecaster {
    calls: Cell<usize>,
}

impl SpyForecaster {
    pub fn new() -> Self {
        Self {
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Forecaster for SpyForecaster {
    fn train_and_forecast(
        &self,
        window: &HistoricalWindow,
        horizon: usize,
        configs: &[ArimaOrder],
    ) -> Result<TrainedForecast, ForecastError> {
        self.calls.set(self.calls.get() + 1);
        ArimaForecaster.train_and_forecast(window, horizon, configs)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// `count` consecutive daily closes ending the day before `end`, following
/// a deterministic random walk that finishes exactly at `last_close`.
pub fn daily_series(
    symbol: &str,
    end: NaiveDate,
    count: usize,
    last_close: f64,
) -> Vec<Observation> {
    let mut state = 0x2545_f491_4f6c_dd1d_u64;
    let mut steps = Vec::with_capacity(count);
    for _ in 0..count {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        steps.push(((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 3.0);
    }

    // Walk backwards from the final close so the last value is exact.
    let mut closes = vec![last_close; count];
    for i in (0..count.saturating_sub(1)).rev() {
        closes[i] = closes[i + 1] - steps[i];
    }

    closes
        .into_iter()
        .enumerate()
        .map(|(i, close)| Observation {
            symbol: symbol.to_string(),
            date: end - Duration::days((count - i) as i64),
            close,
        })
        .collect()
}

pub fn flat_series(symbol: &str, end: NaiveDate, count: usize, close: f64) -> Vec<Observation> {
    (0..count)
        .map(|i| Observation {
            symbol: symbol.to_string(),
            date: end - Duration::days((count - i) as i64),
            close,
        })
        .collect()
}

pub fn forecast_record(
    symbol: &str,
    target_date: NaiveDate,
    predicted_close: f64,
    created_at: DateTime<Utc>,
) -> ForecastRecord {
    ForecastRecord {
        symbol: symbol.to_string(),
        target_date,
        predicted_close,
        model: "ARIMA(2,1,2)".to_string(),
        created_at,
    }
}

/// Default settings with the warm-up pause disabled.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.warmup.pause = std::time::Duration::ZERO;
    settings
}

/// Routes `log` output through the test harness; safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
