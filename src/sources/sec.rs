//! SEC EDGAR endpoints: ticker index, submissions and XBRL company facts.
//!
//! Filing data is not date-bucketed; a cached response stays valid until the
//! cache is cleaned.

use serde_json::Value;

use crate::config::SecConfig;
use crate::constants::providers::SEC;
use crate::fetch::FetchRequest;
use crate::types::{Cik, Ticker, json_string, json_u64};

/// Company identity resolved from the ticker index
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyId {
    pub cik: Cik,
    pub title: Option<String>,
}

pub fn ticker_index_request(config: &SecConfig) -> FetchRequest {
    FetchRequest::new(SEC, config.index_url.clone())
}

pub fn submissions_request(config: &SecConfig, cik: Cik) -> FetchRequest {
    FetchRequest::new(
        SEC,
        format!(
            "{}/submissions/CIK{}.json",
            config.base_url.trim_end_matches('/'),
            cik.padded()
        ),
    )
}

pub fn company_facts_request(config: &SecConfig, cik: Cik) -> FetchRequest {
    FetchRequest::new(
        SEC,
        format!(
            "{}/api/xbrl/companyfacts/CIK{}.json",
            config.base_url.trim_end_matches('/'),
            cik.padded()
        ),
    )
}

/// Find a ticker in `company_tickers.json`.
///
/// The index is an object of `{"0": {"cik_str": .., "ticker": .., "title": ..}, ..}`;
/// an array of the same records is accepted too.
pub fn resolve_cik(index: &Value, ticker: &Ticker) -> Option<CompanyId> {
    let records: Box<dyn Iterator<Item = &Value>> = match index {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => return None,
    };

    let wanted = [ticker.as_str().to_string(), ticker.sec_symbol()];
    records
        .filter(|record| {
            json_string(record, "ticker")
                .map(|t| t.to_uppercase())
                .is_some_and(|t| wanted.contains(&t))
        })
        .find_map(|record| {
            json_u64(record, "cik_str").map(|cik| CompanyId {
                cik: Cik::new(cik),
                title: json_string(record, "title"),
            })
        })
}

/// Company name from submissions, falling back to the company facts entity name
pub fn company_name(submissions: &Value, facts: &Value) -> Option<String> {
    json_string(submissions, "name").or_else(|| json_string(facts, "entityName"))
}
