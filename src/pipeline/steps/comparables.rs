use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::pipeline::artifacts::{
    COMPARABLES, Comparables, PeerFailure, RAW_FILINGS, RawFilings, SectorBenchmark,
};
use crate::pipeline::state::{AgentState, StepId};
use crate::pipeline::step::{PipelineStep, StepContext, StepOutput};
use crate::sources::market::{self, Quote};
use crate::types::{Result, Ticker};

const UNKNOWN_SECTOR: &str = "Unknown";

/// Target quote, peer multiples and sector benchmark
pub struct GatherComparables;

#[async_trait]
impl PipelineStep for GatherComparables {
    fn id(&self) -> StepId {
        StepId::GatherComparables
    }

    fn requires(&self) -> &'static [&'static str] {
        &[RAW_FILINGS]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[COMPARABLES]
    }

    async fn execute(&self, ctx: &StepContext, state: &AgentState) -> Result<StepOutput> {
        let raw: RawFilings = ctx.artifacts.read_json(state, RAW_FILINGS)?;
        let market_config = &ctx.config.market;

        let target = fetch_quote(ctx, raw.ticker.as_str()).await?;
        if target.effective_market_cap().is_none() {
            warn!(subject = %ctx.subject, "quote reports no market cap; valuation uses book equity");
        }

        let peers = peer_list(
            &ctx.config.pipeline.peer_universe,
            target.industry.as_deref(),
            &raw.ticker,
        );
        let total = peers.len();

        let mut results = stream::iter(peers.iter().cloned())
            .map(|symbol| async move {
                let result = fetch_quote(ctx, &symbol).await;
                (symbol, result)
            })
            .buffer_unordered(ctx.config.pipeline.peer_concurrency.max(1));

        let mut peer_quotes = Vec::new();
        let mut peer_failures = Vec::new();
        let mut completed = 0usize;
        while let Some((symbol, result)) = results.next().await {
            completed += 1;
            ctx.progress.note(
                "comparables.progress",
                json!({"completed": completed, "total": total, "last": symbol}),
            );
            match result {
                Ok(quote) => peer_quotes.push(quote),
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) => {
                    warn!(subject = %ctx.subject, peer = %symbol, error = %e, "peer quote unavailable, skipping");
                    peer_failures.push(PeerFailure {
                        symbol,
                        error: e.to_string(),
                    });
                }
            }
        }
        drop(results);

        peer_quotes.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        peer_failures.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        let peer_median_pe = median_pe(&peer_quotes);

        let sector = target
            .sector
            .clone()
            .unwrap_or_else(|| UNKNOWN_SECTOR.to_string());
        let etf = market::sector_etf(&sector);
        let history = ctx
            .fetcher
            .fetch(&market::history_request(market_config, etf))
            .await?;
        let benchmark = SectorBenchmark {
            sector,
            benchmark_etf: etf.to_string(),
            sector_return_1y: market::one_year_return(&history),
        };

        info!(
            subject = %ctx.subject,
            peers = peer_quotes.len(),
            failed = peer_failures.len(),
            benchmark = %benchmark.benchmark_etf,
            "gathered comparables"
        );

        let comparables = Comparables {
            ticker: raw.ticker.clone(),
            market_cap: target.effective_market_cap(),
            sector: target.sector.clone(),
            industry: target.industry.clone(),
            peers,
            peer_quotes,
            peer_failures,
            peer_median_pe,
            sector_benchmark: benchmark,
        };
        let path = ctx.artifacts.write_json(COMPARABLES, &comparables)?;

        let mut output = StepOutput::new()
            .artifact(COMPARABLES, path)
            .note("peers", json!(comparables.peers))
            .note("sector_benchmark", json!(comparables.sector_benchmark));
        if !comparables.peer_failures.is_empty() {
            output = output.note("comparables.peer_failures", json!(comparables.peer_failures));
        }
        Ok(output)
    }
}

async fn fetch_quote(ctx: &StepContext, symbol: &str) -> Result<Quote> {
    let payload = ctx
        .fetcher
        .fetch(&market::quote_request(&ctx.config.market, symbol))
        .await?;
    market::parse_quote(symbol, &payload)
}

/// Configured peers for the industry, or the subject alone
fn peer_list(
    universe: &BTreeMap<String, Vec<String>>,
    industry: Option<&str>,
    subject: &Ticker,
) -> Vec<String> {
    industry
        .and_then(|name| universe.get(name))
        .filter(|peers| !peers.is_empty())
        .map(|peers| peers.iter().map(|p| p.trim().to_uppercase()).collect())
        .unwrap_or_else(|| vec![subject.to_string()])
}

/// Median of the positive trailing P/E values
fn median_pe(quotes: &[Quote]) -> Option<f64> {
    let mut values: Vec<f64> = quotes
        .iter()
        .filter_map(|q| q.trailing_pe)
        .filter(|pe| pe.is_finite() && *pe > 0.0)
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(symbol: &str, pe: Option<f64>) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            market_cap: None,
            trailing_pe: pe,
            sector: None,
            industry: None,
            shares_outstanding: None,
            price: None,
        }
    }

    #[test]
    fn test_median_pe() {
        assert_eq!(median_pe(&[]), None);
        assert_eq!(median_pe(&[quote("A", Some(-3.0)), quote("B", None)]), None);
        assert_eq!(
            median_pe(&[quote("A", Some(30.0)), quote("B", Some(10.0)), quote("C", Some(20.0))]),
            Some(20.0)
        );
        assert_eq!(
            median_pe(&[quote("A", Some(10.0)), quote("B", Some(20.0)), quote("C", Some(0.0))]),
            Some(15.0)
        );
    }

    #[test]
    fn test_peer_list_falls_back_to_subject() {
        let mut universe = BTreeMap::new();
        universe.insert("Widgets".to_string(), vec!["abc".to_string(), "DEF".to_string()]);
        let subject = Ticker::parse("XYZ").unwrap();

        assert_eq!(peer_list(&universe, Some("Widgets"), &subject), vec!["ABC", "DEF"]);
        assert_eq!(peer_list(&universe, Some("Gadgets"), &subject), vec!["XYZ"]);
        assert_eq!(peer_list(&universe, None, &subject), vec!["XYZ"]);
    }
}
