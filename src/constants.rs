//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Fetch retry constants
pub mod fetch {
    /// Maximum attempts per request, including the first
    pub const MAX_ATTEMPTS: u32 = 4;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;

    /// Per-request HTTP timeout (seconds)
    pub const TIMEOUT_SECS: u64 = 30;

    /// In-process memo limits; larger payloads are always read from SQLite
    pub const MEMO_MAX_ENTRIES: usize = 256;
    pub const MEMO_MAX_PAYLOAD_BYTES: usize = 256 * 1024;
}

/// Data provider constants
pub mod providers {
    pub const SEC: &str = "sec";
    pub const MARKET: &str = "market";
    pub const MACRO: &str = "macro";

    pub const SEC_BASE_URL: &str = "https://data.sec.gov";
    pub const SEC_INDEX_URL: &str = "https://www.sec.gov/files/company_tickers.json";
    pub const MARKET_BASE_URL: &str = "https://query1.finance.yahoo.com";
    pub const MACRO_BASE_URL: &str = "https://api.stlouisfed.org/fred";

    /// SEC fair-access guidance allows about 10 requests per second
    pub const SEC_MIN_INTERVAL_MS: u64 = 200;

    /// Ten-year treasury constant maturity series
    pub const RISK_FREE_SERIES: &str = "DGS10";
}

/// Checkpoint constants
pub mod checkpoint {
    /// Checkpoint format version
    pub const VERSION: u32 = 1;

    /// Periodic checkpoint interval during long steps (seconds)
    pub const SAVE_EVERY_SECS: u64 = 120;

    /// Suffix for a checkpoint moved aside by a fresh start
    pub const BACKUP_SUFFIX: &str = "json.bak";
}

/// Pipeline scheduling constants
pub mod pipeline {
    /// Maximum concurrent peer quote fetches
    pub const PEER_CONCURRENCY: usize = 4;

    /// Orchestrator tick for draining progress and periodic saves (milliseconds)
    pub const TICK_MS: u64 = 250;
}

/// Valuation constants
pub mod valuation {
    pub const RISK_FREE_FALLBACK: f64 = 0.04;
    pub const MARKET_RISK_PREMIUM: f64 = 0.05;
    pub const BETA: f64 = 1.0;
    pub const DEBT_COST: f64 = 0.05;
    pub const TAX_RATE: f64 = 0.21;
    pub const TERMINAL_GROWTH: f64 = 0.02;
    pub const PROJECTION_YEARS: u32 = 5;
    pub const DEFAULT_GROWTH: f64 = 0.03;
    pub const GROWTH_FLOOR: f64 = -0.10;
    pub const GROWTH_CAP: f64 = 0.20;
    pub const WACC_FLOOR: f64 = 0.03;
    pub const DEFAULT_PEER_PE: f64 = 15.0;
    pub const DCF_WEIGHT: f64 = 0.6;
}

/// Report constants
pub mod report {
    /// Fiscal years shown in the key ratios table
    pub const RATIO_YEARS: usize = 5;
}

/// Directory layout constants
pub mod paths {
    pub const DATA_DIR: &str = ".equity-agent";
    pub const STATE_DIR: &str = "state";
    pub const CACHE_DIR: &str = "cache";
    pub const OUTPUT_DIR: &str = "output";
    pub const CACHE_DB: &str = "fetch_cache.db";
    pub const CONFIG_FILE: &str = "config.toml";
    pub const REPORT_FILE: &str = "valuation_report.md";
}
