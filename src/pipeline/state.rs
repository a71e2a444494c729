//! Agent State
//!
//! The single-writer progress record for one subject. Only the orchestrator
//! mutates it; steps receive a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::constants;
use crate::types::{AgentError, Result, Ticker};

/// Step identifier in execution order
///
/// `current_step` names the next step to run; completing a step moves it to
/// the step after. `Start` precedes the first step and `Done` follows the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Start,
    FetchRawData,
    BuildNormalizedDataset,
    GatherComparables,
    GatherMacroContext,
    RunValuation,
    RenderReport,
    Done,
}

impl StepId {
    /// Executable steps in order (excludes `Start` and `Done`)
    pub const PIPELINE: [StepId; 6] = [
        Self::FetchRawData,
        Self::BuildNormalizedDataset,
        Self::GatherComparables,
        Self::GatherMacroContext,
        Self::RunValuation,
        Self::RenderReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::FetchRawData => "fetch_raw_data",
            Self::BuildNormalizedDataset => "build_normalized_dataset",
            Self::GatherComparables => "gather_comparables",
            Self::GatherMacroContext => "gather_macro_context",
            Self::RunValuation => "run_valuation",
            Self::RenderReport => "render_report",
            Self::Done => "done",
        }
    }

    /// Human-readable label
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::FetchRawData => "Fetch Raw Data",
            Self::BuildNormalizedDataset => "Build Normalized Dataset",
            Self::GatherComparables => "Gather Comparables",
            Self::GatherMacroContext => "Gather Macro Context",
            Self::RunValuation => "Run Valuation",
            Self::RenderReport => "Render Report",
            Self::Done => "Done",
        }
    }

    pub fn next(&self) -> Option<StepId> {
        match self {
            Self::Start => Some(Self::FetchRawData),
            Self::FetchRawData => Some(Self::BuildNormalizedDataset),
            Self::BuildNormalizedDataset => Some(Self::GatherComparables),
            Self::GatherComparables => Some(Self::GatherMacroContext),
            Self::GatherMacroContext => Some(Self::RunValuation),
            Self::RunValuation => Some(Self::RenderReport),
            Self::RenderReport => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// 1-based position among executable steps
    pub fn ordinal(&self) -> Option<usize> {
        Self::PIPELINE.iter().position(|s| s == self).map(|i| i + 1)
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable progress record for one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub version: u32,
    pub subject_id: Ticker,
    pub current_step: StepId,
    /// Logical artifact name to location; keys are never removed
    #[serde(default)]
    pub artifact_paths: BTreeMap<String, PathBuf>,
    /// Open notes; keys are never removed
    #[serde(default)]
    pub notes: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checkpoint_time: Option<DateTime<Utc>>,
}

impl AgentState {
    pub fn new(subject_id: Ticker) -> Self {
        Self {
            version: constants::checkpoint::VERSION,
            subject_id,
            current_step: StepId::Start,
            artifact_paths: BTreeMap::new(),
            notes: BTreeMap::new(),
            created_at: Utc::now(),
            last_checkpoint_time: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.current_step == StepId::Done
    }

    /// Whether `step` was already completed
    pub fn has_passed(&self, step: StepId) -> bool {
        self.current_step > step
    }

    /// Move `current_step` forward. Moving backwards is an error.
    pub fn advance_to(&mut self, step: StepId) -> Result<()> {
        if step < self.current_step {
            return Err(AgentError::StateTransition(format!(
                "cannot move from {} back to {}",
                self.current_step, step
            )));
        }
        self.current_step = step;
        Ok(())
    }

    /// Record an artifact location; an existing name is repointed, never dropped
    pub fn record_artifact(&mut self, name: impl Into<String>, path: PathBuf) {
        self.artifact_paths.insert(name.into(), path);
    }

    pub fn artifact(&self, name: &str) -> Option<&PathBuf> {
        self.artifact_paths.get(name)
    }

    /// Add or refresh a note
    pub fn set_note(&mut self, key: impl Into<String>, value: Value) {
        self.notes.insert(key.into(), value);
    }

    pub fn note(&self, key: &str) -> Option<&Value> {
        self.notes.get(key)
    }
}
