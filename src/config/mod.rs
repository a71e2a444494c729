//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/equity-agent/config.toml)
//! 3. Project config (.equity-agent/config.toml)
//! 4. Environment variables (EQUITY_AGENT_*, SEC_API_EMAIL, FRED_API_KEY)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
