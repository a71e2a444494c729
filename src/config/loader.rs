//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/equity-agent/config.toml)
//! 3. Project config (.equity-agent/config.toml)
//! 4. Environment variables (EQUITY_AGENT_<SECTION>__<KEY>)
//! 5. Legacy variables (SEC_API_EMAIL, FRED_API_KEY)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::types::{Config, PLACEHOLDER_CONTACT};
use crate::constants;
use crate::types::{AgentError, Result, ResultExt};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars → legacy env vars
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .map_err(|e| AgentError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        if config.sec.contact_email.trim() == PLACEHOLDER_CONTACT {
            warn!("sec.contact_email is the placeholder address; set SEC_API_EMAIL");
        }

        Ok(config)
    }

    /// The merged provider chain, before extraction
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // EQUITY_AGENT_SEC__CONTACT_EMAIL -> sec.contact_email
        figment = figment.merge(Env::prefixed("EQUITY_AGENT_").split("__"));

        figment
            .merge(
                Env::raw()
                    .only(&["SEC_API_EMAIL"])
                    .map(|_| "sec.contact_email".into()),
            )
            .merge(
                Env::raw()
                    .only(&["FRED_API_KEY"])
                    .map(|_| "macro_data.api_key".into()),
            )
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| AgentError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/equity-agent/)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "equity-agent").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join(constants::paths::CONFIG_FILE))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join(constants::paths::CONFIG_FILE)
    }

    /// Get project directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(constants::paths::DATA_DIR)
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Render the effective configuration; the FRED key is masked
    pub fn render(config: &Config, as_json: bool) -> Result<String> {
        let mut shown = config.clone();
        if shown.macro_data.api_key.is_some() {
            shown.macro_data.api_key = Some("********".to_string());
        }

        if as_json {
            Ok(serde_json::to_string_pretty(&shown)?)
        } else {
            toml::to_string_pretty(&shown).map_err(|e| AgentError::Config(e.to_string()))
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write the default project config, keeping an existing one unless forced
    pub fn init_project(force: bool) -> Result<PathBuf> {
        let project_dir = Self::project_dir();
        fs::create_dir_all(&project_dir)?;

        let config_path = project_dir.join(constants::paths::CONFIG_FILE);
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_project_config())
                .with_context_fn(|| format!("Failed to write {}", config_path.display()))?;
            info!("Created project config: {}", config_path.display());
        } else {
            info!("Project config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Generate default project config content (TOML)
    fn default_project_config() -> String {
        r#"# Equity Agent Project Configuration
# Values here override ~/.config/equity-agent/config.toml.
# Environment: EQUITY_AGENT_<SECTION>__<KEY>, SEC_API_EMAIL, FRED_API_KEY.

data_dir = ".equity-agent"

[sec]
contact_email = "email@example.com"
min_interval_ms = 200

[fetch]
max_attempts = 4
base_delay_ms = 500
max_delay_secs = 30
timeout_secs = 30

[checkpoint]
save_every_secs = 120

[pipeline]
peer_concurrency = 4
loop_interval_secs = 0

[pipeline.peer_universe]
"Consumer Electronics" = ["AAPL", "MSFT", "GOOGL", "AMZN"]
"Semiconductors" = ["NVDA", "AMD", "INTC", "AVGO"]
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn extract(jail_result: std::result::Result<(), figment::Error>) {
        if let Err(e) = jail_result {
            panic!("jail failed: {}", e);
        }
    }

    #[test]
    fn test_defaults_extract() {
        extract(Jail::try_with(|_jail| {
            let config: Config = ConfigLoader::figment().extract()?;
            assert_eq!(config.fetch.max_attempts, 4);
            assert_eq!(config.data_dir, PathBuf::from(".equity-agent"));
            Ok(())
        }));
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        extract(Jail::try_with(|jail| {
            jail.create_dir(".equity-agent")?;
            jail.create_file(
                ".equity-agent/config.toml",
                r#"
                [fetch]
                max_attempts = 7

                [pipeline.peer_universe]
                "Banks" = ["JPM", "BAC"]
                "#,
            )?;
            let config: Config = ConfigLoader::figment().extract()?;
            assert_eq!(config.fetch.max_attempts, 7);
            assert_eq!(config.pipeline.peer_universe["Banks"], vec!["JPM", "BAC"]);
            Ok(())
        }));
    }

    #[test]
    fn test_env_overrides_file() {
        extract(Jail::try_with(|jail| {
            jail.create_dir(".equity-agent")?;
            jail.create_file(
                ".equity-agent/config.toml",
                "[checkpoint]\nsave_every_secs = 60\n",
            )?;
            jail.set_env("EQUITY_AGENT_CHECKPOINT__SAVE_EVERY_SECS", "15");
            jail.set_env("EQUITY_AGENT_SEC__CONTACT_EMAIL", "ops@example.org");
            let config: Config = ConfigLoader::figment().extract()?;
            assert_eq!(config.checkpoint.save_every_secs, 15);
            assert_eq!(config.sec.contact_email, "ops@example.org");
            Ok(())
        }));
    }

    #[test]
    fn test_legacy_env_names() {
        extract(Jail::try_with(|jail| {
            jail.set_env("SEC_API_EMAIL", "research@example.org");
            jail.set_env("FRED_API_KEY", "abc123");
            let config: Config = ConfigLoader::figment().extract()?;
            assert_eq!(config.sec.contact_email, "research@example.org");
            assert_eq!(config.macro_data.api_key.as_deref(), Some("abc123"));
            Ok(())
        }));
    }

    #[test]
    fn test_load_from_file_validates() {
        extract(Jail::try_with(|jail| {
            jail.create_file("bad.toml", "[pipeline]\npeer_concurrency = 0\n")?;
            let result = ConfigLoader::load_from_file(Path::new("bad.toml"));
            assert!(matches!(result, Err(AgentError::Config(_))));
            Ok(())
        }));
    }

    #[test]
    fn test_render_masks_api_key() {
        let mut config = Config::default();
        config.macro_data.api_key = Some("secret-key".to_string());
        let rendered = ConfigLoader::render(&config, false).unwrap();
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("contact_email"));
    }

    #[test]
    fn test_default_project_config_parses() {
        extract(Jail::try_with(|jail| {
            jail.create_file("default.toml", &ConfigLoader::default_project_config())?;
            let config = ConfigLoader::load_from_file(Path::new("default.toml"))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.pipeline.peer_universe.len(), 2);
            Ok(())
        }));
    }
}
