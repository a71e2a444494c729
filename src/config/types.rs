//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/equity-agent/) and project (.equity-agent/) level configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::constants;
use crate::types::{AgentError, Result};

/// Placeholder contact used when none is configured
pub const PLACEHOLDER_CONTACT: &str = "email@example.com";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for state, cache and output directories
    pub data_dir: PathBuf,

    /// SEC EDGAR provider settings
    pub sec: SecConfig,

    /// Market data provider settings
    pub market: MarketConfig,

    /// Macro indicator provider settings
    pub macro_data: MacroConfig,

    /// Retry and timeout settings shared by all providers
    pub fetch: FetchConfig,

    /// Checkpoint trigger settings
    pub checkpoint: CheckpointConfig,

    /// Step scheduling and peer universe
    pub pipeline: PipelineConfig,

    /// Valuation model constants
    pub valuation: ValuationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(constants::paths::DATA_DIR),
            sec: SecConfig::default(),
            market: MarketConfig::default(),
            macro_data: MacroConfig::default(),
            fetch: FetchConfig::default(),
            checkpoint: CheckpointConfig::default(),
            pipeline: PipelineConfig::default(),
            valuation: ValuationConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `AgentError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        let contact = self.sec.contact_email.trim();
        if contact.is_empty() || !contact.contains('@') {
            return Err(AgentError::Config(format!(
                "sec.contact_email must be an email address, got '{}'",
                self.sec.contact_email
            )));
        }

        for (name, value) in [
            ("sec.base_url", &self.sec.base_url),
            ("sec.index_url", &self.sec.index_url),
            ("market.base_url", &self.market.base_url),
            ("macro_data.base_url", &self.macro_data.base_url),
        ] {
            validate_url(name, value)?;
        }

        if self.fetch.max_attempts == 0 {
            return Err(AgentError::Config(
                "fetch.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.fetch.timeout_secs == 0 {
            return Err(AgentError::Config(
                "fetch.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.fetch.backoff_factor < 1.0 {
            return Err(AgentError::Config(format!(
                "fetch.backoff_factor must be at least 1.0, got {}",
                self.fetch.backoff_factor
            )));
        }

        if self.checkpoint.save_every_secs == 0 {
            return Err(AgentError::Config(
                "checkpoint.save_every_secs must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.peer_concurrency == 0 {
            return Err(AgentError::Config(
                "pipeline.peer_concurrency must be greater than 0".to_string(),
            ));
        }

        self.valuation.validate()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join(constants::paths::STATE_DIR)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join(constants::paths::CACHE_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join(constants::paths::OUTPUT_DIR)
    }

    pub fn cache_db_path(&self) -> PathBuf {
        self.cache_dir().join(constants::paths::CACHE_DB)
    }
}

fn validate_url(name: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| AgentError::Config(format!("{} is not a valid URL ({}): {}", name, value, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AgentError::Config(format!(
            "{} must use http or https, got {}",
            name, value
        )));
    }
    Ok(())
}

// =============================================================================
// Provider Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecConfig {
    /// Contact address sent in the User-Agent header (SEC fair-access policy)
    pub contact_email: String,

    /// Base URL for submissions and XBRL company facts
    pub base_url: String,

    /// Ticker to CIK index
    pub index_url: String,

    /// Minimum interval between consecutive requests
    pub min_interval_ms: u64,
}

impl Default for SecConfig {
    fn default() -> Self {
        Self {
            contact_email: PLACEHOLDER_CONTACT.to_string(),
            base_url: constants::providers::SEC_BASE_URL.to_string(),
            index_url: constants::providers::SEC_INDEX_URL.to_string(),
            min_interval_ms: constants::providers::SEC_MIN_INTERVAL_MS,
        }
    }
}

impl SecConfig {
    pub fn user_agent(&self) -> String {
        format!("EquityAgent/1.0 (email: {})", self.contact_email.trim())
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub base_url: String,
    pub min_interval_ms: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            base_url: constants::providers::MARKET_BASE_URL.to_string(),
            min_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroConfig {
    pub base_url: String,

    /// FRED API key; without one the risk-free rate falls back to its default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Series used as the risk-free rate
    pub series_id: String,
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            base_url: constants::providers::MACRO_BASE_URL.to_string(),
            api_key: None,
            series_id: constants::providers::RISK_FREE_SERIES.to_string(),
        }
    }
}

// =============================================================================
// Fetch Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Attempts per request, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub backoff_factor: f32,
    pub timeout_secs: u64,
    /// Randomize backoff delays
    pub jitter: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::fetch::MAX_ATTEMPTS,
            base_delay_ms: constants::fetch::BASE_DELAY_MS,
            max_delay_secs: constants::fetch::MAX_DELAY_SECS,
            backoff_factor: constants::fetch::BACKOFF_FACTOR,
            timeout_secs: constants::fetch::TIMEOUT_SECS,
            jitter: true,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Checkpoint & Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Periodic save interval while a step is running
    pub save_every_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            save_every_secs: constants::checkpoint::SAVE_EVERY_SECS,
        }
    }
}

impl CheckpointConfig {
    pub fn save_every(&self) -> Duration {
        Duration::from_secs(self.save_every_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent peer quote fetches
    pub peer_concurrency: usize,

    /// Seconds to wait between refresh runs; 0 runs once
    pub loop_interval_secs: u64,

    /// Industry name to peer tickers
    pub peer_universe: BTreeMap<String, Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut peer_universe = BTreeMap::new();
        peer_universe.insert(
            "Consumer Electronics".to_string(),
            ["AAPL", "MSFT", "GOOGL", "AMZN"].map(String::from).to_vec(),
        );
        peer_universe.insert(
            "Semiconductors".to_string(),
            ["NVDA", "AMD", "INTC", "AVGO"].map(String::from).to_vec(),
        );
        Self {
            peer_concurrency: constants::pipeline::PEER_CONCURRENCY,
            loop_interval_secs: 0,
            peer_universe,
        }
    }
}

// =============================================================================
// Valuation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationConfig {
    pub risk_free_fallback: f64,
    pub market_risk_premium: f64,
    pub beta: f64,
    pub debt_cost: f64,
    pub tax_rate: f64,
    pub terminal_growth: f64,
    pub projection_years: u32,
    pub default_growth: f64,
    pub growth_floor: f64,
    pub growth_cap: f64,
    pub wacc_floor: f64,
    pub default_peer_pe: f64,
    pub dcf_weight: f64,
}

impl Default for ValuationConfig {
    fn default() -> Self {
        use constants::valuation as v;
        Self {
            risk_free_fallback: v::RISK_FREE_FALLBACK,
            market_risk_premium: v::MARKET_RISK_PREMIUM,
            beta: v::BETA,
            debt_cost: v::DEBT_COST,
            tax_rate: v::TAX_RATE,
            terminal_growth: v::TERMINAL_GROWTH,
            projection_years: v::PROJECTION_YEARS,
            default_growth: v::DEFAULT_GROWTH,
            growth_floor: v::GROWTH_FLOOR,
            growth_cap: v::GROWTH_CAP,
            wacc_floor: v::WACC_FLOOR,
            default_peer_pe: v::DEFAULT_PEER_PE,
            dcf_weight: v::DCF_WEIGHT,
        }
    }
}

impl ValuationConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.dcf_weight) {
            return Err(AgentError::Config(format!(
                "valuation.dcf_weight must be between 0.0 and 1.0, got {}",
                self.dcf_weight
            )));
        }
        if !(0.0..1.0).contains(&self.tax_rate) {
            return Err(AgentError::Config(format!(
                "valuation.tax_rate must be between 0.0 and 1.0, got {}",
                self.tax_rate
            )));
        }
        if self.projection_years == 0 {
            return Err(AgentError::Config(
                "valuation.projection_years must be greater than 0".to_string(),
            ));
        }
        if self.growth_floor > self.growth_cap {
            return Err(AgentError::Config(format!(
                "valuation.growth_floor ({}) exceeds growth_cap ({})",
                self.growth_floor, self.growth_cap
            )));
        }
        if self.default_peer_pe <= 0.0 {
            return Err(AgentError::Config(
                "valuation.default_peer_pe must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
