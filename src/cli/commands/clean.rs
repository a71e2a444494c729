//! Clean Command
//!
//! Clears the fetch cache, checkpoints and generated outputs.

use std::path::Path;

use crate::cli::ui::Output;
use crate::cli::util::{ConfigOverrides, load_config};
use crate::fetch::FetchCache;
use crate::types::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct CleanTargets {
    pub cache: bool,
    pub checkpoints: bool,
    pub outputs: bool,
    pub all: bool,
}

pub async fn run(targets: CleanTargets) -> Result<()> {
    let config = load_config(&ConfigOverrides::default())?;
    let output = Output::new();

    if targets.all {
        if config.data_dir.exists() {
            tokio::fs::remove_dir_all(&config.data_dir).await?;
            output.success(&format!("Removed {}", config.data_dir.display()));
        } else {
            output.info("Nothing to remove");
        }
        return Ok(());
    }

    if !(targets.cache || targets.checkpoints || targets.outputs) {
        output.info("Nothing selected; use --cache, --checkpoints, --outputs or --all");
        return Ok(());
    }

    if targets.cache {
        let path = config.cache_db_path();
        if path.exists() {
            let cache = FetchCache::open(&path, 1)?;
            let stats = cache.stats()?;
            let cleared = cache.clear()?;
            output.success(&format!(
                "Cleared {} cached responses ({} bytes)",
                cleared, stats.payload_bytes
            ));
        } else {
            output.info("No fetch cache");
        }
    }

    if targets.checkpoints {
        remove_dir(&output, &config.state_dir(), "checkpoints").await?;
    }

    if targets.outputs {
        remove_dir(&output, &config.output_dir(), "outputs").await?;
    }

    Ok(())
}

async fn remove_dir(output: &Output, dir: &Path, label: &str) -> Result<()> {
    if dir.exists() {
        tokio::fs::remove_dir_all(dir).await?;
        output.success(&format!("Cleared {}", label));
    } else {
        output.info(&format!("No {} to clear", label));
    }
    Ok(())
}
