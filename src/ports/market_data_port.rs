//! External market data port.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::error::ForecastError;
use crate::domain::observation::Observation;

/// Supplies a daily close series for one symbol.
///
/// The result may be empty, partial, or span more than the caller needs.
/// Order is unspecified; callers normalize through a window.
pub trait MarketDataProvider {
    fn fetch_daily_series(&self, symbol: &str) -> Result<Vec<Observation>, ForecastError>;
}

/// A plain GET request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub query: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            query: BTreeMap::new(),
            timeout,
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP seam so providers can be exercised offline.
pub trait HttpTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ForecastError>;
}
