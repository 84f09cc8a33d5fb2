//! PostgreSQL time-series store.
//!
//! Same table layout and semantics as the SQLite store, using native
//! `DATE` and `TIMESTAMPTZ` columns.

use crate::domain::error::ForecastError;
use crate::domain::observation::{ForecastRecord, Observation};
use crate::domain::settings::StoreSettings;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{TimeSeriesStore, WriteReport};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, warn};
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use std::cell::RefCell;

const UPSERT_PRICE: &str = "INSERT INTO stock_prices (symbol, date, close) VALUES ($1, $2, $3) \
     ON CONFLICT (symbol, date) DO UPDATE SET close = EXCLUDED.close";

pub struct PostgresStore {
    client: RefCell<Client>,
    batch_size: usize,
}

impl PostgresStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ForecastError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| ForecastError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;
        let statement_timeout_ms = config.get_int("postgres", "statement_timeout_ms", 30_000);
        if statement_timeout_ms <= 0 {
            return Err(ForecastError::config_invalid(
                "postgres",
                "statement_timeout_ms",
                "statement_timeout_ms must be positive",
            ));
        }
        let settings = StoreSettings::from_config(config)?;

        let mut client =
            Client::connect(&connection_string, NoTls).map_err(|e| ForecastError::Database {
                reason: e.to_string(),
            })?;
        client
            .batch_execute(&format!("SET statement_timeout = {statement_timeout_ms}"))
            .map_err(|e| ForecastError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client: RefCell::new(client),
            batch_size: settings.batch_size.max(1),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), ForecastError> {
        self.client
            .borrow_mut()
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS stock_prices (
                    symbol TEXT NOT NULL,
                    date DATE NOT NULL,
                    close DOUBLE PRECISION NOT NULL CHECK (close > 0),
                    PRIMARY KEY (symbol, date)
                );
                CREATE TABLE IF NOT EXISTS predictions (
                    id BIGSERIAL PRIMARY KEY,
                    symbol TEXT NOT NULL,
                    target_date DATE NOT NULL,
                    predicted_close DOUBLE PRECISION NOT NULL,
                    model TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_predictions_key
                    ON predictions(symbol, target_date, created_at);",
            )
            .map_err(|e| ForecastError::DatabaseQuery {
                reason: e.to_string(),
            })
    }

    fn write_batch(
        client: &mut Client,
        symbol: &str,
        batch: &[Observation],
    ) -> Result<(), postgres::Error> {
        let mut tx = client.transaction()?;
        let stmt = tx.prepare(UPSERT_PRICE)?;
        for obs in batch {
            tx.execute(&stmt, &[&symbol, &obs.date, &obs.close])?;
        }
        tx.commit()
    }
}

impl TimeSeriesStore for PostgresStore {
    fn read_observations(
        &self,
        symbol: &str,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<Vec<Observation>, ForecastError> {
        let start = today - Duration::days(i64::from(lookback_days));
        let query = "SELECT date, close FROM stock_prices \
                     WHERE symbol = $1 AND date >= $2 \
                     ORDER BY date ASC";

        let params: &[&(dyn ToSql + Sync)] = &[&symbol, &start];
        let rows = self
            .client
            .borrow_mut()
            .query(query, params)
            .map_err(|e| ForecastError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(rows
            .into_iter()
            .map(|row| Observation {
                symbol: symbol.to_string(),
                date: row.get(0),
                close: row.get(1),
            })
            .collect())
    }

    fn write_observations(
        &self,
        symbol: &str,
        observations: &[Observation],
    ) -> Result<WriteReport, ForecastError> {
        let mut client = self.client.borrow_mut();
        if client.is_closed() {
            return Err(ForecastError::PersistenceFailure {
                reason: "connection closed".into(),
            });
        }

        let mut report = WriteReport::default();
        for batch in observations.chunks(self.batch_size) {
            match Self::write_batch(&mut client, symbol, batch) {
                Ok(()) => report.written += batch.len(),
                Err(e) => {
                    warn!(
                        "batch of {} rows for {} failed ({}), retrying row by row",
                        batch.len(),
                        symbol,
                        e
                    );
                    for obs in batch {
                        match client.execute(UPSERT_PRICE, &[&symbol, &obs.date, &obs.close]) {
                            Ok(_) => report.written += 1,
                            Err(e) => {
                                warn!("dropping {} {}: {}", symbol, obs.date, e);
                                report.failed += 1;
                            }
                        }
                    }
                }
            }
        }

        debug!(
            "{}: wrote {} observations, {} failed",
            symbol, report.written, report.failed
        );
        Ok(report)
    }

    fn read_latest_forecast(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> Result<Option<ForecastRecord>, ForecastError> {
        let query = "SELECT target_date, predicted_close, model, created_at FROM predictions \
                     WHERE symbol = $1 AND target_date = $2 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT 1";

        let rows = self
            .client
            .borrow_mut()
            .query(query, &[&symbol, &as_of])
            .map_err(|e| ForecastError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(rows.first().map(|row| {
            let created_at: DateTime<Utc> = row.get(3);
            ForecastRecord {
                symbol: symbol.to_string(),
                target_date: row.get(0),
                predicted_close: row.get(1),
                model: row.get(2),
                created_at,
            }
        }))
    }

    fn write_forecast(&self, record: &ForecastRecord) -> Result<(), ForecastError> {
        self.client
            .borrow_mut()
            .execute(
                "INSERT INTO predictions (symbol, target_date, predicted_close, model, created_at) \
                 VALUES ($1, $2, $3, $4, $5)",
                &[
                    &record.symbol,
                    &record.target_date,
                    &record.predicted_close,
                    &record.model,
                    &record.created_at,
                ],
            )
            .map_err(|e| ForecastError::PersistenceFailure {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn from_config_missing_connection_string() {
        let config = FileConfigAdapter::empty();
        let result = PostgresStore::from_config(&config);
        match result {
            Err(ForecastError::ConfigMissing { section, key }) => {
                assert_eq!(section, "postgres");
                assert_eq!(key, "connection_string");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
