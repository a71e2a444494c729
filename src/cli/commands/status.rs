//! Status Command
//!
//! Shows saved pipeline state per ticker and fetch cache size.

use serde_json::json;

use crate::cli::ui::Output;
use crate::cli::util::{ConfigOverrides, OutputFormat, load_config};
use crate::config::Config;
use crate::fetch::{CacheStats, FetchCache};
use crate::pipeline::{AgentState, Checkpointer, StepId};
use crate::types::{AgentError, Result, Ticker, log_filter_warn};

pub fn run(ticker: Option<&str>, format: OutputFormat) -> Result<()> {
    let config = load_config(&ConfigOverrides::default())?;
    let checkpointer = Checkpointer::new(config.state_dir(), config.checkpoint.save_every());

    match ticker {
        Some(raw) => {
            let subject = Ticker::parse(raw)?;
            match checkpointer.load(&subject)? {
                Some(state) => show_state(&state, format),
                None => {
                    if format == OutputFormat::Text {
                        Output::new().info(&format!("No saved state for {}", subject));
                    } else {
                        emit(&json!({"subject": subject, "status": "not_started"}), format)?;
                    }
                    Ok(())
                }
            }
        }
        None => show_overview(&config, &checkpointer, format),
    }
}

fn show_state(state: &AgentState, format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Text {
        return emit(state, format);
    }

    let output = Output::new();
    output.header(&format!("Equity Agent Status: {}", state.subject_id));
    output.field("Current step", state.current_step.name());
    output.field("Started", state.created_at.to_rfc3339());
    if let Some(saved) = state.last_checkpoint_time {
        output.field("Last checkpoint", saved.to_rfc3339());
    }

    output.section("Steps");
    for step in StepId::PIPELINE {
        output.step(step, state.current_step);
    }

    if !state.artifact_paths.is_empty() {
        output.section("Artifacts");
        for (name, path) in &state.artifact_paths {
            output.field(name, path.display());
        }
    }

    let fallbacks: Vec<_> = state
        .notes
        .iter()
        .filter(|(key, _)| key.ends_with("fallbacks") || key.ends_with("peer_failures"))
        .collect();
    if !fallbacks.is_empty() {
        output.section("Fallbacks");
        for (key, value) in fallbacks {
            output.warning(&format!("{}: {}", key, value));
        }
    }
    Ok(())
}

fn show_overview(config: &Config, checkpointer: &Checkpointer, format: OutputFormat) -> Result<()> {
    let subjects = checkpointer.list_subjects()?;
    let cache = log_filter_warn(cache_stats(config), "fetch cache unavailable").unwrap_or_default();

    let mut rows = Vec::new();
    for name in &subjects {
        let row = match Ticker::parse(name).and_then(|t| checkpointer.load(&t)) {
            Ok(Some(state)) => json!({"subject": name, "current_step": state.current_step}),
            Ok(None) => continue,
            Err(e) => json!({"subject": name, "error": e.to_string()}),
        };
        rows.push(row);
    }

    if format != OutputFormat::Text {
        return emit(&json!({"subjects": rows, "cache": cache}), format);
    }

    let output = Output::new();
    output.header("Equity Agent Status");
    output.field("Data dir", config.data_dir.display());

    output.section("Subjects");
    if rows.is_empty() {
        output.info("No saved runs");
    }
    for row in &rows {
        let subject = row["subject"].as_str().unwrap_or_default();
        match (row.get("current_step"), row.get("error")) {
            (Some(step), _) => output.field(subject, step.as_str().unwrap_or_default()),
            (None, Some(error)) => output.warning(&format!("{}: {}", subject, error)),
            _ => {}
        }
    }

    output.section("Fetch cache");
    output.field("Entries", cache.entries);
    output.field("Payload bytes", cache.payload_bytes);
    for (provider, count) in &cache.by_provider {
        output.field(provider, count);
    }
    Ok(())
}

fn cache_stats(config: &Config) -> Result<CacheStats> {
    let path = config.cache_db_path();
    if !path.exists() {
        return Ok(CacheStats::default());
    }
    FetchCache::open(&path, 1)?.stats()
}

fn emit<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Yaml => {
            serde_yaml::to_string(value).map_err(|e| AgentError::Storage(e.to_string()))?
        }
        _ => serde_json::to_string_pretty(value)?,
    };
    println!("{}", rendered);
    Ok(())
}
