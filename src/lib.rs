//! Equity Agent - Resumable Equity Research Pipeline
//!
//! Takes a ticker from raw SEC filings to a Markdown valuation report in six
//! checkpointed steps. Every provider response goes through a persistent,
//! content-keyed cache and a bounded retry loop, so an interrupted or failed
//! run resumes without repeating work.
//!
//! ## Core Features
//!
//! - **Checkpoint/Resume**: atomic, checksummed state file per ticker
//! - **Fetch Cache**: SQLite store keyed by request fingerprint
//! - **Retry**: exponential backoff for rate limits and transient failures
//! - **Fallbacks**: documented defaults for optional signals, recorded in notes
//! - **Cooperative Shutdown**: SIGINT/SIGTERM save state and exit cleanly
//!
//! ## Quick Start
//!
//! ```ignore
//! use equity_agent::{ConfigLoader, Orchestrator, RunMode, ShutdownSignal, Ticker};
//!
//! let config = Arc::new(ConfigLoader::load()?);
//! let shutdown = ShutdownSignal::new();
//! let cache = Arc::new(FetchCache::open(&config.cache_db_path(), 4)?);
//! let fetcher = Arc::new(build_fetcher(&config, cache, shutdown.clone())?);
//! let engine = Arc::new(DefaultValuationEngine::new(config.valuation.clone()));
//! let mut orchestrator =
//!     Orchestrator::new(Ticker::parse("AAPL")?, config, fetcher, engine, shutdown);
//! let outcome = orchestrator.run(RunMode::Resume).await?;
//! ```
//!
//! ## Modules
//!
//! - [`fetch`]: request fingerprints, fetch cache, retrying fetcher, HTTP provider
//! - [`sources`]: SEC, market and macro request builders and parsers
//! - [`financials`]: normalized statements and ratios
//! - [`valuation`]: valuation engine trait and the default DCF/P-E blend
//! - [`pipeline`]: agent state, checkpointer, steps and orchestrator
//! - [`storage`]: SQLite pool and atomic file writes
//! - [`config`]: layered configuration

pub mod cli;
pub mod config;
pub mod constants;
pub mod fetch;
pub mod financials;
pub mod pipeline;
pub mod shutdown;
pub mod sources;
pub mod storage;
pub mod types;
pub mod valuation;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{AgentError, ErrorCategory, ExitClass, FetchError, Result, ResultExt};
pub use types::{Cik, Ticker};

// Storage
pub use storage::{Database, PoolConfig, SharedDatabase};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use fetch::{FetchCache, FetchRequest, Provider, RetryPolicy, RetryingFetcher};
pub use pipeline::{AgentState, Checkpointer, Orchestrator, RunMode, RunOutcome, StepId};
pub use shutdown::ShutdownSignal;
pub use sources::build_fetcher;
pub use valuation::{DefaultValuationEngine, ValuationEngine, ValuationResult};
