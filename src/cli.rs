//! CLI definition and dispatch.
//!
//! Every command prints pretty JSON on stdout; logs and errors go to stderr.

use clap::{Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::alphavantage_adapter::AlphaVantageProvider;
use crate::adapters::csv_adapter::CsvMarketData;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::ForecastError;
use crate::domain::forecaster::ArimaForecaster;
use crate::domain::markets::SUPPORTED_MARKETS;
use crate::domain::observation::Observation;
use crate::domain::service::PredictionService;
use crate::domain::settings::{parse_symbol_list, Settings};
use crate::ports::clock_port::SystemClock;
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataProvider;
use crate::ports::store_port::TimeSeriesStore;

#[derive(Parser, Debug)]
#[command(name = "closecast", about = "Daily close forecasting with a persisted cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List supported markets
    Markets,
    /// Last stored close with an indicative price band
    MarketData {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Forecast the close, reusing a fresh stored forecast when present
    Predict {
        #[arg(short, long)]
        symbol: String,
        /// Days to forecast, 1 to 30 (defaults to [forecast] horizon_days)
        #[arg(long)]
        horizon: Option<usize>,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Report stored history and today's forecast for a symbol
    Status {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Fetch and store history for several symbols
    WarmUp {
        /// Comma separated symbols (defaults to [warmup] symbols, then the catalog)
        #[arg(long)]
        symbols: Option<String>,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the store tables
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Markets => emit(&SUPPORTED_MARKETS),
        Command::MarketData { symbol, config } => {
            with_service(&config, |service| emit(&service.get_market_data(&symbol)?))
        }
        Command::Predict {
            symbol,
            horizon,
            config,
        } => with_service(&config, |service| {
            let result = match horizon {
                Some(days) => service.get_prediction_for(&symbol, days)?,
                None => service.get_prediction(&symbol)?,
            };
            emit(&result)
        }),
        Command::Status { symbol, config } => {
            with_service(&config, |service| emit(&service.get_status(&symbol)?))
        }
        Command::WarmUp { symbols, config } => with_service(&config, |service| {
            let requested = symbols.as_deref().map(parse_symbol_list).unwrap_or_default();
            emit(&service.warm_up(&requested)?)
        }),
        Command::InitDb { config } => run_init_db(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {e}", e.kind().as_str());
            (&e).into()
        }
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ForecastError> {
    info!("loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

/// Opens the configured store and makes sure its tables exist.
///
/// A `[postgres] connection_string` selects Postgres when that feature is
/// built; otherwise `[sqlite] path` is used.
pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn TimeSeriesStore>, ForecastError> {
    #[cfg(feature = "postgres")]
    {
        if config.get_string("postgres", "connection_string").is_some() {
            use crate::adapters::postgres_adapter::PostgresStore;
            let store = PostgresStore::from_config(config)?;
            store.initialize_schema()?;
            return Ok(Box::new(store));
        }
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteStore;
        let store = SqliteStore::from_config(config)?;
        store.initialize_schema()?;
        Ok(Box::new(store))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        Err(ForecastError::ConfigMissing {
            section: "postgres".into(),
            key: "connection_string".into(),
        })
    }
}

/// Picks the market data source: a CSV directory when configured, else
/// Alpha Vantage. Without either, fetches fail and only stored history is
/// used.
pub fn open_provider(settings: &Settings) -> Result<Box<dyn MarketDataProvider>, ForecastError> {
    if let Some(dir) = &settings.csv_dir {
        info!("using CSV market data from {}", dir.display());
        return Ok(Box::new(CsvMarketData::new(dir.clone())));
    }
    if settings.alphavantage.api_key.is_some() {
        return Ok(Box::new(AlphaVantageProvider::from_settings(
            &settings.alphavantage,
        )?));
    }
    warn!("no market data source configured; relying on stored history");
    Ok(Box::new(NoMarketData))
}

struct NoMarketData;

impl MarketDataProvider for NoMarketData {
    fn fetch_daily_series(&self, _symbol: &str) -> Result<Vec<Observation>, ForecastError> {
        Err(ForecastError::UpstreamUnavailable {
            reason: "no market data source configured".into(),
        })
    }
}

fn with_service<F>(config_path: &PathBuf, f: F) -> Result<(), ForecastError>
where
    F: FnOnce(&PredictionService<'_>) -> Result<(), ForecastError>,
{
    let config = load_config(config_path)?;
    let settings = Settings::from_config(&config)?;
    let store = open_store(&config)?;
    let provider = open_provider(&settings)?;
    let forecaster = ArimaForecaster;
    let clock = SystemClock;

    let service = PredictionService::new(
        store.as_ref(),
        provider.as_ref(),
        &forecaster,
        &clock,
        &settings,
    );
    f(&service)
}

#[derive(Serialize)]
struct InitDbReport {
    initialized: bool,
}

fn run_init_db(config_path: &PathBuf) -> Result<(), ForecastError> {
    let config = load_config(config_path)?;
    open_store(&config)?;
    emit(&InitDbReport { initialized: true })
}

fn emit<T: Serialize + ?Sized>(value: &T) -> Result<(), ForecastError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{json}");
    Ok(())
}
