//! SQLite time-series store.
//!
//! Two tables: `stock_prices` holds one close per `(symbol, date)` and is
//! written with upserts; `predictions` is append-only and the row with the
//! newest `created_at` wins for a `(symbol, target_date)` key.

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, warn};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::error::ForecastError;
use crate::domain::observation::{ForecastRecord, Observation};
use crate::domain::settings::StoreSettings;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{TimeSeriesStore, WriteReport};

const DATE_FORMAT: &str = "%Y-%m-%d";
/// Fixed-width UTC timestamps so text ordering matches time ordering.
const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const UPSERT_PRICE: &str = "INSERT INTO stock_prices (symbol, date, close) VALUES (?1, ?2, ?3)
     ON CONFLICT(symbol, date) DO UPDATE SET close = excluded.close";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
    batch_size: usize,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ForecastError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| ForecastError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;
        let settings = StoreSettings::from_config(config)?;
        Self::open(db_path, &settings)
    }

    pub fn open<P: AsRef<Path>>(path: P, settings: &StoreSettings) -> Result<Self, ForecastError> {
        let busy_timeout = settings.busy_timeout;
        let manager = SqliteConnectionManager::file(path)
            .with_init(move |conn: &mut Connection| conn.busy_timeout(busy_timeout));
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .connection_timeout(settings.connection_timeout)
            .build(manager)
            .map_err(|e: r2d2::Error| ForecastError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            pool,
            batch_size: settings.batch_size.max(1),
        })
    }

    pub fn in_memory() -> Result<Self, ForecastError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| ForecastError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self {
            pool,
            batch_size: StoreSettings::default().batch_size,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn initialize_schema(&self) -> Result<(), ForecastError> {
        let conn = self.connection()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS stock_prices (
                symbol TEXT NOT NULL,
                date TEXT NOT NULL,
                close REAL NOT NULL CHECK (close > 0),
                PRIMARY KEY (symbol, date)
            );
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                target_date TEXT NOT NULL,
                predicted_close REAL NOT NULL,
                model TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_predictions_key
                ON predictions(symbol, target_date, created_at);",
        )
        .map_err(|e: rusqlite::Error| ForecastError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, ForecastError> {
        self.pool.get().map_err(|e: r2d2::Error| ForecastError::Database {
            reason: e.to_string(),
        })
    }

    fn write_batch(
        conn: &mut Connection,
        symbol: &str,
        batch: &[Observation],
    ) -> Result<(), rusqlite::Error> {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_PRICE)?;
            for obs in batch {
                stmt.execute(params![symbol, obs.date.format(DATE_FORMAT).to_string(), obs.close])?;
            }
        }
        tx.commit()
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn parse_created_at(raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                raw.len(),
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

impl TimeSeriesStore for SqliteStore {
    fn read_observations(
        &self,
        symbol: &str,
        lookback_days: u32,
        today: NaiveDate,
    ) -> Result<Vec<Observation>, ForecastError> {
        let conn = self.connection()?;
        let start = (today - Duration::days(i64::from(lookback_days)))
            .format(DATE_FORMAT)
            .to_string();

        let mut stmt = conn
            .prepare(
                "SELECT date, close FROM stock_prices
                 WHERE symbol = ?1 AND date >= ?2
                 ORDER BY date ASC",
            )
            .map_err(|e: rusqlite::Error| ForecastError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(params![symbol, start], |row| {
                let date_str: String = row.get(0)?;
                Ok(Observation {
                    symbol: symbol.to_string(),
                    date: parse_date(&date_str)?,
                    close: row.get(1)?,
                })
            })
            .map_err(|e: rusqlite::Error| ForecastError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut observations = Vec::new();
        for row in rows {
            observations.push(row.map_err(|e: rusqlite::Error| {
                ForecastError::DatabaseQuery {
                    reason: e.to_string(),
                }
            })?);
        }

        Ok(observations)
    }

    fn write_observations(
        &self,
        symbol: &str,
        observations: &[Observation],
    ) -> Result<WriteReport, ForecastError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e: r2d2::Error| ForecastError::PersistenceFailure {
                reason: e.to_string(),
            })?;

        let mut report = WriteReport::default();
        for batch in observations.chunks(self.batch_size) {
            match Self::write_batch(&mut conn, symbol, batch) {
                Ok(()) => report.written += batch.len(),
                Err(e) => {
                    warn!(
                        "batch of {} rows for {} failed ({}), retrying row by row",
                        batch.len(),
                        symbol,
                        e
                    );
                    for obs in batch {
                        let result = conn.execute(
                            UPSERT_PRICE,
                            params![symbol, obs.date.format(DATE_FORMAT).to_string(), obs.close],
                        );
                        match result {
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
        let conn = self.connection()?;

        conn.query_row(
            "SELECT target_date, predicted_close, model, created_at FROM predictions
             WHERE symbol = ?1 AND target_date = ?2
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
            params![symbol, as_of.format(DATE_FORMAT).to_string()],
            |row| {
                let target: String = row.get(0)?;
                let created: String = row.get(3)?;
                Ok(ForecastRecord {
                    symbol: symbol.to_string(),
                    target_date: parse_date(&target)?,
                    predicted_close: row.get(1)?,
                    model: row.get(2)?,
                    created_at: parse_created_at(&created)?,
                })
            },
        )
        .optional()
        .map_err(|e: rusqlite::Error| ForecastError::DatabaseQuery {
            reason: e.to_string(),
        })
    }

    fn write_forecast(&self, record: &ForecastRecord) -> Result<(), ForecastError> {
        let conn = self
            .pool
            .get()
            .map_err(|e: r2d2::Error| ForecastError::PersistenceFailure {
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO predictions (symbol, target_date, predicted_close, model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.symbol,
                record.target_date.format(DATE_FORMAT).to_string(),
                record.predicted_close,
                record.model,
                record.created_at.format(CREATED_AT_FORMAT).to_string(),
            ],
        )
        .map_err(|e: rusqlite::Error| ForecastError::PersistenceFailure {
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use chrono::TimeZone;

    fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize_schema().unwrap();
        store
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn obs(day: u32, close: f64) -> Observation {
        Observation {
            symbol: "AAPL".to_string(),
            date: date(2024, 3, day),
            close,
        }
    }

    fn record(target: NaiveDate, value: f64, created_at: DateTime<Utc>) -> ForecastRecord {
        ForecastRecord {
            symbol: "AAPL".to_string(),
            target_date: target,
            predicted_close: value,
            model: "ARIMA(2,1,2)".to_string(),
            created_at,
        }
    }

    #[test]
    fn from_config_missing_path() {
        let result = SqliteStore::from_config(&FileConfigAdapter::empty());
        match result {
            Err(ForecastError::ConfigMissing { section, key }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "path");
            }
            Err(other) => panic!("expected ConfigMissing, got: {other}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn in_memory_initialization_is_idempotent() {
        let store = store();
        store.initialize_schema().unwrap();
    }

    #[test]
    fn observations_round_trip_in_date_order() {
        let store = store();
        let report = store
            .write_observations("AAPL", &[obs(3, 103.0), obs(1, 101.0), obs(2, 102.0)])
            .unwrap();
        assert_eq!(report, WriteReport { written: 3, failed: 0 });

        let rows = store.read_observations("AAPL", 100, date(2024, 3, 10)).unwrap();
        let closes: Vec<f64> = rows.iter().map(|o| o.close).collect();
        assert_eq!(closes, vec![101.0, 102.0, 103.0]);
        assert!(store.read_observations("MSFT", 100, date(2024, 3, 10)).unwrap().is_empty());
    }

    #[test]
    fn observations_upsert_by_date() {
        let store = store();
        store.write_observations("AAPL", &[obs(1, 101.0)]).unwrap();
        store.write_observations("AAPL", &[obs(1, 111.0)]).unwrap();

        let rows = store.read_observations("AAPL", 100, date(2024, 3, 10)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].close, 111.0);
    }

    #[test]
    fn read_respects_lookback() {
        let store = store();
        store
            .write_observations("AAPL", &[obs(1, 101.0), obs(5, 105.0), obs(9, 109.0)])
            .unwrap();

        let rows = store.read_observations("AAPL", 5, date(2024, 3, 10)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, date(2024, 3, 5));
    }

    #[test]
    fn failing_row_is_counted_and_rest_of_batch_written() {
        let store = store().with_batch_size(2);
        let report = store
            .write_observations(
                "AAPL",
                &[obs(1, 101.0), obs(2, -1.0), obs(3, 103.0), obs(4, 104.0)],
            )
            .unwrap();
        assert_eq!(report, WriteReport { written: 3, failed: 1 });
        assert!(!report.is_complete());

        let rows = store.read_observations("AAPL", 100, date(2024, 3, 10)).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn latest_forecast_wins() {
        let store = store();
        let target = date(2024, 3, 4);
        let early = Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        store.write_forecast(&record(target, 180.0, late)).unwrap();
        store.write_forecast(&record(target, 170.0, early)).unwrap();

        let found = store.read_latest_forecast("AAPL", target).unwrap().unwrap();
        assert_eq!(found.predicted_close, 180.0);
        assert_eq!(found.created_at, late);
        assert_eq!(found.model, "ARIMA(2,1,2)");
    }

    #[test]
    fn forecast_lookup_matches_target_date_only() {
        let store = store();
        let created = Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap();
        store
            .write_forecast(&record(date(2024, 3, 5), 181.0, created))
            .unwrap();

        assert!(store
            .read_latest_forecast("AAPL", date(2024, 3, 4))
            .unwrap()
            .is_none());
        assert!(store
            .read_latest_forecast("MSFT", date(2024, 3, 5))
            .unwrap()
            .is_none());
    }

    #[test]
    fn file_backed_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("closes.db");
        {
            let store = SqliteStore::open(&path, &StoreSettings::default()).unwrap();
            store.initialize_schema().unwrap();
            store.write_observations("AAPL", &[obs(1, 101.0)]).unwrap();
        }
        let store = SqliteStore::open(&path, &StoreSettings::default()).unwrap();
        let rows = store.read_observations("AAPL", 100, date(2024, 3, 10)).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
