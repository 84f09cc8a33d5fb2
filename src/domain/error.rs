//! Domain error types.
//!
//! Every adapter converts its transport-specific failures (SQL, HTTP, CSV,
//! JSON) into [`ForecastError`] so nothing below the orchestrator leaks a
//! foreign error type upward.

use std::fmt::{Display, Formatter};

/// Why a single model configuration could not be fitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("need at least {needed} observations, have {have}")]
    InsufficientData { needed: usize, have: usize },

    #[error("degenerate series: {reason}")]
    DegenerateSeries { reason: String },

    #[error("optimizer did not converge after {iterations} iterations")]
    NoConvergence { iterations: usize },
}

/// One failed configuration inside a training cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FitAttempt {
    pub model: String,
    pub error: FitError,
}

impl Display for FitAttempt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.model, self.error)
    }
}

/// Top-level error type for closecast.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("persistence failure: {reason}")]
    PersistenceFailure { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("upstream market data unavailable: {reason}")]
    UpstreamUnavailable { reason: String },

    #[error("insufficient data for {symbol}: have {days} days, need {minimum}")]
    InsufficientData {
        symbol: String,
        days: usize,
        minimum: usize,
    },

    #[error("training failed for {symbol}: {}", join_attempts(.attempts))]
    TrainingFailure {
        symbol: String,
        attempts: Vec<FitAttempt>,
    },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join_attempts(attempts: &[FitAttempt]) -> String {
    if attempts.is_empty() {
        return "no model configurations supplied".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse classification handed to whatever request layer sits on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InsufficientData,
    TrainingFailure,
    UpstreamUnavailable,
    InvalidRequest,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status code for this kind.
    pub const fn status(self) -> u16 {
        match self {
            Self::InsufficientData => 422,
            Self::TrainingFailure => 500,
            Self::UpstreamUnavailable => 503,
            Self::InvalidRequest => 400,
            Self::Internal => 500,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::TrainingFailure => "training_failure",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::Internal => "internal",
        }
    }
}

impl ForecastError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForecastError::InsufficientData { .. } => ErrorKind::InsufficientData,
            ForecastError::TrainingFailure { .. } => ErrorKind::TrainingFailure,
            ForecastError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            ForecastError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ForecastError::Database { .. }
            | ForecastError::DatabaseQuery { .. }
            | ForecastError::PersistenceFailure { .. }
            | ForecastError::ConfigParse { .. }
            | ForecastError::ConfigMissing { .. }
            | ForecastError::ConfigInvalid { .. }
            | ForecastError::Io(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        ForecastError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&ForecastError> for std::process::ExitCode {
    fn from(err: &ForecastError) -> Self {
        let code: u8 = match err {
            ForecastError::Io(_) => 1,
            ForecastError::ConfigParse { .. }
            | ForecastError::ConfigMissing { .. }
            | ForecastError::ConfigInvalid { .. } => 2,
            ForecastError::Database { .. }
            | ForecastError::DatabaseQuery { .. }
            | ForecastError::PersistenceFailure { .. } => 3,
            ForecastError::InvalidRequest { .. } => 4,
            ForecastError::InsufficientData { .. } => 5,
            ForecastError::UpstreamUnavailable { .. } => 6,
            ForecastError::TrainingFailure { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}
