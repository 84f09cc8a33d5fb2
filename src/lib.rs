//! closecast: daily close forecasting with a persisted cache.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`domain::service::PredictionService`]
//! is the entry point for request layers such as the CLI.

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
