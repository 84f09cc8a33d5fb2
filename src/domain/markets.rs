//! Supported instruments and their reference prices.

use serde::Serialize;

use crate::domain::error::ForecastError;

/// Close reported for symbols outside the catalog when no history exists.
pub const FALLBACK_REFERENCE_PRICE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Market {
    pub symbol: &'static str,
    pub name: &'static str,
    #[serde(skip)]
    pub reference_price: f64,
}

pub const SUPPORTED_MARKETS: [Market; 10] = [
    Market {
        symbol: "AAPL",
        name: "Apple Inc.",
        reference_price: 185.0,
    },
    Market {
        symbol: "MSFT",
        name: "Microsoft Corporation",
        reference_price: 375.0,
    },
    Market {
        symbol: "GOOGL",
        name: "Alphabet Inc.",
        reference_price: 140.0,
    },
    Market {
        symbol: "AMZN",
        name: "Amazon.com Inc.",
        reference_price: 150.0,
    },
    Market {
        symbol: "TSLA",
        name: "Tesla Inc.",
        reference_price: 240.0,
    },
    Market {
        symbol: "META",
        name: "Meta Platforms Inc.",
        reference_price: 325.0,
    },
    Market {
        symbol: "NVDA",
        name: "NVIDIA Corporation",
        reference_price: 485.0,
    },
    Market {
        symbol: "NFLX",
        name: "Netflix Inc.",
        reference_price: 620.0,
    },
    Market {
        symbol: "JPM",
        name: "JPMorgan Chase & Co.",
        reference_price: 170.0,
    },
    Market {
        symbol: "V",
        name: "Visa Inc.",
        reference_price: 260.0,
    },
];

pub fn find(symbol: &str) -> Option<&'static Market> {
    SUPPORTED_MARKETS.iter().find(|m| m.symbol == symbol)
}

/// Display name, or the symbol itself when it is not in the catalog.
pub fn display_name(symbol: &str) -> String {
    find(symbol)
        .map(|m| m.name.to_string())
        .unwrap_or_else(|| symbol.to_string())
}

pub fn reference_price(symbol: &str) -> f64 {
    find(symbol)
        .map(|m| m.reference_price)
        .unwrap_or(FALLBACK_REFERENCE_PRICE)
}

/// Trims and uppercases a ticker, rejecting anything that is not
/// alphanumeric with optional `.` or `-`.
pub fn normalize_symbol(raw: &str) -> Result<String, ForecastError> {
    let symbol = raw.trim().to_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 12
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if !valid {
        return Err(ForecastError::InvalidRequest {
            reason: format!("invalid symbol \"{}\"", raw.trim()),
        });
    }
    Ok(symbol)
}
