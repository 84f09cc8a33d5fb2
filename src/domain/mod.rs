//! Core domain types and logic.

pub mod arima;
pub mod error;
pub mod forecaster;
pub mod guarantor;
pub mod markets;
pub mod observation;
pub mod orchestrator;
pub mod service;
pub mod settings;
pub mod window;
