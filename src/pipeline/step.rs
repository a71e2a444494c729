//! Pipeline step contract
//!
//! A step reads prior artifacts from a state snapshot, does its fetching and
//! transformation, writes its own artifacts and returns their locations plus
//! notes. Steps never mutate state; progress notes go through the reporter
//! and the orchestrator applies them.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::artifacts::ArtifactStore;
use super::state::{AgentState, StepId};
use crate::config::Config;
use crate::fetch::RetryingFetcher;
use crate::shutdown::ShutdownSignal;
use crate::types::{Result, Ticker};
use crate::valuation::ValuationEngine;

/// What a completed step hands back to the orchestrator
#[derive(Debug, Default)]
pub struct StepOutput {
    pub artifacts: Vec<(String, PathBuf)>,
    pub notes: BTreeMap<String, Value>,
}

impl StepOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifact(mut self, name: impl Into<String>, path: PathBuf) -> Self {
        self.artifacts.push((name.into(), path));
        self
    }

    pub fn note(mut self, key: impl Into<String>, value: Value) -> Self {
        self.notes.insert(key.into(), value);
        self
    }
}

/// Sends in-flight notes to the orchestrator
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(String, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn note(&self, key: impl Into<String>, value: Value) {
        // Receiver gone means the run is over; nothing left to record
        let _ = self.tx.send((key.into(), value));
    }
}

/// Shared services available to every step
pub struct StepContext {
    pub subject: Ticker,
    pub config: Arc<Config>,
    pub fetcher: Arc<RetryingFetcher>,
    pub artifacts: ArtifactStore,
    pub engine: Arc<dyn ValuationEngine>,
    pub shutdown: ShutdownSignal,
    pub progress: ProgressReporter,
}

#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn id(&self) -> StepId;

    /// Artifacts that must be recorded before this step runs
    fn requires(&self) -> &'static [&'static str];

    /// Artifacts this step records on success
    fn produces(&self) -> &'static [&'static str];

    async fn execute(&self, ctx: &StepContext, state: &AgentState) -> Result<StepOutput>;
}
