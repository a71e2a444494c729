//! Config Command
//!
//! Usage:
//!   equity-agent config show [--format json]
//!   equity-agent config path
//!   equity-agent config init [--force]

use crate::cli::ui::Output;
use crate::config::ConfigLoader;
use crate::types::Result;

/// Print the merged effective configuration
pub fn show(as_json: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    println!("{}", ConfigLoader::render(&config, as_json)?);
    Ok(())
}

/// Print configuration file locations in precedence order
pub fn path() -> Result<()> {
    let output = Output::new();
    match ConfigLoader::global_config_path() {
        Some(global) => output.field("Global", mark_existing(&global)),
        None => output.field("Global", "(no config directory on this platform)"),
    }
    output.field("Project", mark_existing(&ConfigLoader::project_config_path()));
    output.field("Environment", "EQUITY_AGENT_<SECTION>__<KEY>, SEC_API_EMAIL, FRED_API_KEY");
    Ok(())
}

pub fn init(force: bool) -> Result<()> {
    let path = ConfigLoader::init_project(force)?;
    let output = Output::new();
    output.success("Initialized project configuration");
    output.field("Config", path.display());
    output.info("Set sec.contact_email (or SEC_API_EMAIL) before running");
    Ok(())
}

fn mark_existing(path: &std::path::Path) -> String {
    if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found)", path.display())
    }
}
