//! External data sources
//!
//! Request builders and payload parsers for each provider, plus the wiring
//! that registers one `HttpProvider` per source with the fetcher.

pub mod macro_data;
pub mod market;
pub mod sec;

use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::constants::providers::{MACRO, MARKET, SEC};
use crate::fetch::{FetchCache, HttpProvider, RetryPolicy, RetryingFetcher};
use crate::shutdown::ShutdownSignal;
use crate::types::Result;

/// Build the fetcher with the SEC, market and macro providers registered
pub fn build_fetcher(
    config: &Config,
    cache: Arc<FetchCache>,
    shutdown: ShutdownSignal,
) -> Result<RetryingFetcher> {
    let timeout = config.fetch.timeout();
    let user_agent = config.sec.user_agent();

    let sec = HttpProvider::new(SEC, &user_agent, timeout)?
        .with_min_interval(config.sec.min_interval());

    let market = HttpProvider::new(MARKET, &user_agent, timeout)?
        .with_min_interval(Duration::from_millis(config.market.min_interval_ms));

    let mut macro_provider = HttpProvider::new(MACRO, &user_agent, timeout)?;
    if let Some(key) = config.macro_data.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        macro_provider =
            macro_provider.with_api_key("api_key", SecretString::from(key.trim().to_string()));
    }

    Ok(
        RetryingFetcher::new(cache, RetryPolicy::from_config(&config.fetch), shutdown)
            .with_provider(Arc::new(sec))
            .with_provider(Arc::new(market))
            .with_provider(Arc::new(macro_provider)),
    )
}
