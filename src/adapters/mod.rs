//! Concrete adapter implementations for ports.

#[cfg(feature = "postgres")]
pub mod postgres_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
pub mod alphavantage_adapter;
pub mod csv_adapter;
pub mod file_config_adapter;
