//! Ensures enough daily history exists before any model trains.

use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

use crate::domain::window::{merge_observations, HistoricalWindow};
use crate::ports::market_data_port::MarketDataProvider;
use crate::ports::store_port::TimeSeriesStore;

/// Per-symbol result of [`DataCompletenessGuarantor::warm_up`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmUpOutcome {
    pub symbol: String,
    pub days: usize,
    pub satisfied: bool,
}

pub struct DataCompletenessGuarantor<'a> {
    store: &'a dyn TimeSeriesStore,
    provider: &'a dyn MarketDataProvider,
    lookback_days: u32,
}

impl<'a> DataCompletenessGuarantor<'a> {
    pub fn new(
        store: &'a dyn TimeSeriesStore,
        provider: &'a dyn MarketDataProvider,
        lookback_days: u32,
    ) -> Self {
        Self {
            store,
            provider,
            lookback_days,
        }
    }

    /// Returns the best window obtainable for `symbol` as of `today`.
    ///
    /// The provider is only contacted when the stored window is shorter than
    /// `minimum_days`. The result may still be short; callers decide what a
    /// short window means. Store and provider failures degrade to "no data"
    /// rather than propagating.
    pub fn ensure_minimum_history(
        &self,
        symbol: &str,
        minimum_days: usize,
        today: NaiveDate,
    ) -> HistoricalWindow {
        self.ensure(symbol, minimum_days, today).0
    }

    /// Runs [`Self::ensure_minimum_history`] over several symbols, sleeping
    /// `pause` after every symbol that needed a provider call.
    pub fn warm_up(
        &self,
        symbols: &[String],
        minimum_days: usize,
        today: NaiveDate,
        pause: Duration,
    ) -> Vec<WarmUpOutcome> {
        let mut outcomes = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            let (window, fetched) = self.ensure(symbol, minimum_days, today);
            let outcome = WarmUpOutcome {
                symbol: symbol.clone(),
                days: window.len(),
                satisfied: window.len() >= minimum_days,
            };
            if outcome.satisfied {
                info!("warm-up {}: {} days", symbol, outcome.days);
            } else {
                warn!(
                    "warm-up {}: only {} of {} days",
                    symbol, outcome.days, minimum_days
                );
            }
            outcomes.push(outcome);

            if fetched && !pause.is_zero() && i + 1 < symbols.len() {
                debug!("pausing {:?} before next symbol", pause);
                std::thread::sleep(pause);
            }
        }
        outcomes
    }

    fn ensure(
        &self,
        symbol: &str,
        minimum_days: usize,
        today: NaiveDate,
    ) -> (HistoricalWindow, bool) {
        let existing = match self
            .store
            .read_observations(symbol, self.lookback_days, today)
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("reading stored history for {} failed: {}", symbol, e);
                Vec::new()
            }
        };

        let stored = HistoricalWindow::build(symbol, existing.clone(), today);
        if stored.len() >= minimum_days {
            debug!(
                "{} has {} stored days (need {}), skipping fetch",
                symbol,
                stored.len(),
                minimum_days
            );
            return (stored, false);
        }

        info!(
            "{} has {} stored days, fetching to reach {}",
            symbol,
            stored.len(),
            minimum_days
        );
        let fetched = match self.provider.fetch_daily_series(symbol) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("fetching {} failed: {}", symbol, e);
                Vec::new()
            }
        };
        if fetched.is_empty() {
            warn!("no market data returned for {}", symbol);
            return (stored, true);
        }

        let merged = merge_observations(&existing, &fetched);
        match self.store.write_observations(symbol, &merged) {
            Ok(report) if report.is_complete() => {
                debug!("{} stored {} observations", symbol, report.written)
            }
            Ok(report) => warn!(
                "{} stored {} observations, {} failed",
                symbol, report.written, report.failed
            ),
            Err(e) => warn!("persisting merged history for {} failed: {}", symbol, e),
        }

        let window = HistoricalWindow::build(symbol, merged, today);
        if window.len() >= minimum_days {
            info!("{} now has {} days", symbol, window.len());
        } else {
            warn!(
                "{} still short after fetch: {} of {} days",
                symbol,
                window.len(),
                minimum_days
            );
        }
        (window, true)
    }
}
