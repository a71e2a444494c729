//! Market data: quotes, one-year price history and the sector benchmark map.
//!
//! Both endpoints are bucketed by UTC date, so prices refresh once a day.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::MarketConfig;
use crate::constants::providers::MARKET;
use crate::fetch::FetchRequest;
use crate::types::{AgentError, Result, as_f64, json_f64, json_string};

/// Benchmark used when a sector has no dedicated ETF
pub const DEFAULT_BENCHMARK: &str = "SPY";

const SECTOR_TO_ETF: &[(&str, &str)] = &[
    ("Technology", "XLK"),
    ("Information Technology", "XLK"),
    ("Health Care", "XLV"),
    ("Financial Services", "XLF"),
    ("Financials", "XLF"),
    ("Consumer Cyclical", "XLY"),
    ("Consumer Defensive", "XLP"),
    ("Industrials", "XLI"),
    ("Energy", "XLE"),
    ("Materials", "XLB"),
    ("Utilities", "XLU"),
    ("Real Estate", "XLRE"),
    ("Communication Services", "XLC"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub shares_outstanding: Option<f64>,
    pub price: Option<f64>,
}

impl Quote {
    /// Market cap, derived from price and share count when not reported
    pub fn effective_market_cap(&self) -> Option<f64> {
        self.market_cap.filter(|mc| *mc > 0.0).or_else(|| {
            match (self.price, self.shares_outstanding) {
                (Some(price), Some(shares)) if price > 0.0 && shares > 0.0 => Some(price * shares),
                _ => None,
            }
        })
    }
}

pub fn quote_request(config: &MarketConfig, symbol: &str) -> FetchRequest {
    FetchRequest::new(MARKET, format!("{}/quote", config.base_url.trim_end_matches('/')))
        .param("symbol", symbol)
        .daily()
}

pub fn history_request(config: &MarketConfig, symbol: &str) -> FetchRequest {
    FetchRequest::new(MARKET, format!("{}/history", config.base_url.trim_end_matches('/')))
        .param("symbol", symbol)
        .param("range", "1y")
        .daily()
}

/// Decode a quote payload; camelCase field names are accepted as well.
pub fn parse_quote(symbol: &str, payload: &Value) -> Result<Quote> {
    if !payload.is_object() {
        return Err(AgentError::malformed(
            format!("quote {}", symbol),
            "expected a JSON object",
        ));
    }

    let number = |keys: &[&str]| keys.iter().find_map(|k| json_f64(payload, k));
    let text = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| json_string(payload, k))
            .filter(|s| !s.trim().is_empty())
    };

    Ok(Quote {
        symbol: json_string(payload, "symbol").unwrap_or_else(|| symbol.to_string()),
        market_cap: number(&["market_cap", "marketCap"]),
        trailing_pe: number(&["trailing_pe", "trailingPE", "trailingPe"]),
        sector: text(&["sector", "sectorKey"]),
        industry: text(&["industry", "industryKey"]),
        shares_outstanding: number(&["shares_outstanding", "sharesOutstanding"]),
        price: number(&["price", "regularMarketPrice"]),
    })
}

/// Last close over first close minus one; 0.0 for an empty history
pub fn one_year_return(history: &Value) -> f64 {
    let closes: Vec<f64> = history
        .get("closes")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(as_f64).collect())
        .unwrap_or_default();

    match (closes.first(), closes.last()) {
        (Some(first), Some(last)) if *first != 0.0 => last / first - 1.0,
        _ => 0.0,
    }
}

pub fn sector_etf(sector: &str) -> &'static str {
    SECTOR_TO_ETF
        .iter()
        .find(|(name, _)| *name == sector)
        .map(|(_, etf)| *etf)
        .unwrap_or(DEFAULT_BENCHMARK)
}
