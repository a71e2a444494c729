//! Step artifacts
//!
//! Typed JSON documents exchanged between steps, and the store that writes
//! them atomically under `output/<SUBJECT>/`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::state::AgentState;
use crate::sources::market::Quote;
use crate::storage::write_atomic;
use crate::types::{AgentError, Result, Ticker};

pub const RAW_FILINGS: &str = "raw_filings";
pub const RATIOS_TABLE: &str = "ratios_table";
pub const COMPARABLES: &str = "comparables";
pub const MACRO_CONTEXT: &str = "macro_context";
pub const VALUATION_RESULT: &str = "valuation_result";
pub const REPORT: &str = "report";

// =============================================================================
// Artifact Documents
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFilings {
    pub ticker: Ticker,
    /// Zero-padded ten-digit CIK
    pub cik: String,
    pub company_name: Option<String>,
    pub submissions: Value,
    pub company_facts: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerFailure {
    pub symbol: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorBenchmark {
    pub sector: String,
    pub benchmark_etf: String,
    pub sector_return_1y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparables {
    pub ticker: Ticker,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub peers: Vec<String>,
    /// Quotes of peers that answered, sorted by symbol
    pub peer_quotes: Vec<Quote>,
    pub peer_failures: Vec<PeerFailure>,
    pub peer_median_pe: Option<f64>,
    pub sector_benchmark: SectorBenchmark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroFallback {
    pub input: String,
    pub value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroContext {
    pub risk_free_rate: f64,
    pub market_risk_premium: f64,
    /// Series the rate came from, or "default"
    pub risk_free_source: String,
    pub fallbacks: Vec<MacroFallback>,
}

// =============================================================================
// Artifact Store
// =============================================================================

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(output_dir: &Path, subject: &Ticker) -> Self {
        Self {
            dir: output_dir.join(subject.as_str()),
        }
    }

    pub fn json_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.json_path(name);
        let mut bytes = serde_json::to_vec_pretty(value)?;
        bytes.push(b'\n');
        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    pub fn write_text(&self, file_name: &str, text: &str) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        write_atomic(&path, text.as_bytes())?;
        Ok(path)
    }

    /// Read an artifact recorded in `state`
    pub fn read_json<T: DeserializeOwned>(&self, state: &AgentState, name: &str) -> Result<T> {
        let path = state.artifact(name).ok_or_else(|| AgentError::MissingArtifact {
            subject: state.subject_id.to_string(),
            message: format!("artifact '{}' is not recorded", name),
        })?;

        let raw = std::fs::read(path).map_err(|e| AgentError::MissingArtifact {
            subject: state.subject_id.to_string(),
            message: format!("artifact '{}' at {} is unreadable: {}", name, path.display(), e),
        })?;

        serde_json::from_slice(&raw).map_err(|e| AgentError::malformed(name, e.to_string()))
    }
}
