//! CLI Common Utilities
//!
//! Shared configuration loading and resource setup for command handlers.

use clap::ValueEnum;
use std::sync::Arc;

use crate::config::{Config, ConfigLoader};
use crate::fetch::FetchCache;
use crate::types::Result;

/// Structured output format for informational commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Command-line values that take precedence over every config source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub save_every_secs: Option<u64>,
    pub loop_interval_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(secs) = self.save_every_secs {
            config.checkpoint.save_every_secs = secs;
        }
        if let Some(secs) = self.loop_interval_secs {
            config.pipeline.loop_interval_secs = secs;
        }
    }
}

/// Command execution context
///
/// Effective configuration (with CLI overrides applied and validated) plus
/// the shared fetch cache.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Arc<Config>,
    pub cache: Arc<FetchCache>,
}

impl CommandContext {
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let config = load_config(overrides)?;
        let cache = FetchCache::open(&config.cache_db_path(), config.pipeline.peer_concurrency)?;
        Ok(Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
        })
    }
}

/// Load the layered configuration and apply overrides
pub fn load_config(overrides: &ConfigOverrides) -> Result<Config> {
    let mut config = ConfigLoader::load()?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}
