//! Alpha Vantage daily series provider.

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::domain::error::ForecastError;
use crate::domain::observation::{parse_day, Observation};
use crate::domain::settings::AlphaVantageSettings;
use crate::ports::market_data_port::{
    HttpRequest, HttpResponse, HttpTransport, MarketDataProvider,
};

/// Output sizes tried in order; `None` omits the parameter.
const OUTPUT_SIZES: [Option<&str>; 3] = [Some("compact"), Some("full"), None];
const CLOSE_FIELD: &str = "4. close";
const UPSTREAM_MESSAGE_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

/// Blocking reqwest client behind [`HttpTransport`].
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ForecastError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("closecast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ForecastError::UpstreamUnavailable {
                reason: format!("failed to build http client: {e}"),
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ForecastError> {
        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .timeout(request.timeout)
            .send()
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("request timeout: {e}")
                } else if e.is_connect() {
                    format!("connection failed: {e}")
                } else {
                    format!("request failed: {e}")
                };
                ForecastError::UpstreamUnavailable { reason }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| ForecastError::UpstreamUnavailable {
                reason: format!("failed to read response body: {e}"),
            })?;
        Ok(HttpResponse { status, body })
    }
}

pub struct AlphaVantageProvider {
    transport: Box<dyn HttpTransport>,
    api_key: String,
    settings: AlphaVantageSettings,
}

impl AlphaVantageProvider {
    pub fn new(
        transport: Box<dyn HttpTransport>,
        settings: &AlphaVantageSettings,
    ) -> Result<Self, ForecastError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| ForecastError::ConfigMissing {
                section: "alphavantage".into(),
                key: "api_key".into(),
            })?;
        Ok(Self {
            transport,
            api_key,
            settings: settings.clone(),
        })
    }

    pub fn from_settings(settings: &AlphaVantageSettings) -> Result<Self, ForecastError> {
        Self::new(Box::new(ReqwestTransport::new()?), settings)
    }

    fn request(&self, symbol: &str, output_size: Option<&str>) -> HttpRequest {
        let request = HttpRequest::get(&self.settings.base_url, self.settings.timeout)
            .param("function", "TIME_SERIES_DAILY")
            .param("symbol", symbol)
            .param("apikey", self.api_key.as_str());
        match output_size {
            Some(size) => request.param("outputsize", size),
            None => request,
        }
    }

    fn fetch_once(
        &self,
        symbol: &str,
        output_size: Option<&str>,
    ) -> Result<Vec<Observation>, ForecastError> {
        let response = self.transport.execute(&self.request(symbol, output_size))?;
        if !response.is_success() {
            return Err(ForecastError::UpstreamUnavailable {
                reason: format!("HTTP {} from Alpha Vantage", response.status),
            });
        }
        parse_daily_series(symbol, &response.body)
    }
}

impl MarketDataProvider for AlphaVantageProvider {
    fn fetch_daily_series(&self, symbol: &str) -> Result<Vec<Observation>, ForecastError> {
        let mut last_error = None;
        for size in OUTPUT_SIZES {
            let mode = size.unwrap_or("default");
            match self.fetch_once(symbol, size) {
                Ok(observations) => {
                    info!(
                        "fetched {} daily closes for {} (outputsize {})",
                        observations.len(),
                        symbol,
                        mode
                    );
                    return Ok(observations);
                }
                Err(e) => {
                    warn!("Alpha Vantage {} outputsize {} failed: {}", symbol, mode, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ForecastError::UpstreamUnavailable {
            reason: "no output size attempted".into(),
        }))
    }
}

/// Parses a `TIME_SERIES_DAILY` JSON payload into closes sorted by date.
///
/// Uses `"4. close"` when present, otherwise the first numeric field of the
/// entry. Entries without a usable date or positive close are skipped.
pub fn parse_daily_series(symbol: &str, body: &str) -> Result<Vec<Observation>, ForecastError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|e| ForecastError::UpstreamUnavailable {
            reason: format!("invalid JSON from Alpha Vantage: {e}"),
        })?;
    let object = payload
        .as_object()
        .ok_or_else(|| ForecastError::UpstreamUnavailable {
            reason: "unexpected Alpha Vantage payload".into(),
        })?;

    for key in UPSTREAM_MESSAGE_KEYS {
        if let Some(message) = object.get(key) {
            return Err(ForecastError::UpstreamUnavailable {
                reason: format!("{key}: {}", message.as_str().unwrap_or_default()),
            });
        }
    }

    let series = object
        .iter()
        .find(|(key, _)| key.starts_with("Time Series"))
        .and_then(|(_, value)| value.as_object())
        .ok_or_else(|| ForecastError::UpstreamUnavailable {
            reason: "response has no time series".into(),
        })?;

    let mut observations: Vec<Observation> = series
        .iter()
        .filter_map(|(day, fields)| {
            let date = parse_day(day)?;
            let close = fields.as_object().and_then(close_value)?;
            match Observation::new(symbol, date, close) {
                Ok(obs) => Some(obs),
                Err(e) => {
                    debug!("skipping {} {}: {}", symbol, day, e);
                    None
                }
            }
        })
        .collect();
    observations.sort_by_key(|o| o.date);
    Ok(observations)
}

fn close_value(fields: &Map<String, Value>) -> Option<f64> {
    fields
        .get(CLOSE_FIELD)
        .and_then(numeric)
        .or_else(|| fields.values().find_map(numeric))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
