//! Pipeline Orchestrator
//!
//! Drives the fixed step list for one subject. It is the only writer of
//! `AgentState`: steps run against a snapshot while the orchestrator drains
//! their progress notes and takes periodic checkpoints.

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use super::artifacts::{ArtifactStore, REPORT};
use super::checkpoint::Checkpointer;
use super::state::{AgentState, StepId};
use super::step::{PipelineStep, ProgressReporter, StepContext};
use super::steps::default_steps;
use crate::config::Config;
use crate::constants;
use crate::fetch::RetryingFetcher;
use crate::shutdown::ShutdownSignal;
use crate::types::{AgentError, ExitClass, Result, Ticker};
use crate::valuation::ValuationEngine;

/// How to treat an existing checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Continue from the saved state, or start new when there is none
    Resume,
    /// Move any saved state aside and start from the first step
    Fresh,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed { report: PathBuf },
    /// Stopped by a shutdown request; state saved
    Interrupted { resume_at: StepId },
    /// A step failed; state saved at the last completed step
    Failed { step: StepId, error: AgentError },
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed { .. } => 0,
            Self::Interrupted { .. } => ExitClass::Interrupted.code(),
            Self::Failed { .. } => ExitClass::Resumable.code(),
        }
    }
}

pub struct Orchestrator {
    steps: Vec<Box<dyn PipelineStep>>,
    checkpointer: Checkpointer,
    ctx: StepContext,
    progress_rx: mpsc::UnboundedReceiver<(String, Value)>,
    tick: Duration,
}

impl Orchestrator {
    pub fn new(
        subject: Ticker,
        config: Arc<Config>,
        fetcher: Arc<RetryingFetcher>,
        engine: Arc<dyn ValuationEngine>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let checkpointer = Checkpointer::new(config.state_dir(), config.checkpoint.save_every());
        let artifacts = ArtifactStore::new(&config.output_dir(), &subject);
        let (progress, progress_rx) = ProgressReporter::channel();

        Self {
            steps: default_steps(),
            checkpointer,
            ctx: StepContext {
                subject,
                config,
                fetcher,
                artifacts,
                engine,
                shutdown,
                progress,
            },
            progress_rx,
            tick: Duration::from_millis(constants::pipeline::TICK_MS),
        }
    }

    /// Replace the step list; it must follow the fixed pipeline order
    pub fn with_steps(mut self, steps: Vec<Box<dyn PipelineStep>>) -> Result<Self> {
        validate_steps(&steps)?;
        self.steps = steps;
        Ok(self)
    }

    pub fn subject(&self) -> &Ticker {
        &self.ctx.subject
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    pub fn fetcher(&self) -> &RetryingFetcher {
        &self.ctx.fetcher
    }

    /// Run the pipeline to completion, interruption or the first failure.
    ///
    /// Fatal errors (bad configuration, corrupt checkpoint, failed checkpoint
    /// write, unmet precondition) come back as `Err`; everything resumable is
    /// an outcome.
    #[instrument(skip_all, fields(subject = %self.ctx.subject, mode = ?mode))]
    pub async fn run(&mut self, mode: RunMode) -> Result<RunOutcome> {
        validate_steps(&self.steps)?;
        let mut state = self.prepare_state(mode)?;

        if state.is_done() {
            info!("Pipeline already complete for {}", self.ctx.subject);
            return completed(&state);
        }

        if state.current_step == StepId::Start {
            state.advance_to(StepId::FetchRawData)?;
        }
        self.checkpointer.save(&mut state)?;

        let total = self.steps.len();
        for step in &self.steps {
            let id = step.id();
            let ordinal = id.ordinal().unwrap_or_default();

            if state.has_passed(id) {
                info!("Step {}/{}: {} skipped (resuming from checkpoint)", ordinal, total, id.name());
                continue;
            }

            if self.ctx.shutdown.is_shutdown_requested() {
                self.checkpointer.save(&mut state)?;
                warn!(resume_at = %id, "Shutdown requested; state saved");
                return Ok(RunOutcome::Interrupted { resume_at: id });
            }

            for artifact in step.requires() {
                if state.artifact(artifact).is_none() {
                    error!(step = %id, artifact, "precondition not met");
                    return Err(AgentError::Precondition {
                        step: id.to_string(),
                        artifact: artifact.to_string(),
                    });
                }
            }

            info!("Step {}/{}: {}", ordinal, total, id.name());
            let snapshot = state.clone();
            let result = {
                let execution = step.execute(&self.ctx, &snapshot);
                tokio::pin!(execution);

                let mut ticker = tokio::time::interval(self.tick);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        result = &mut execution => break result,
                        Some((key, value)) = self.progress_rx.recv() => {
                            state.set_note(key, value);
                        }
                        _ = ticker.tick() => {
                            self.checkpointer.maybe_save(&mut state)?;
                        }
                    }
                }
            };

            while let Ok((key, value)) = self.progress_rx.try_recv() {
                state.set_note(key, value);
            }

            match result {
                Ok(output) => {
                    for expected in step.produces() {
                        if !output.artifacts.iter().any(|(name, _)| name == expected) {
                            return Err(AgentError::StateTransition(format!(
                                "step {} did not produce '{}'",
                                id, expected
                            )));
                        }
                    }
                    for (name, path) in output.artifacts {
                        state.record_artifact(name, path);
                    }
                    for (key, value) in output.notes {
                        state.set_note(key, value);
                    }

                    let next = id.next().unwrap_or(StepId::Done);
                    state.advance_to(next)?;
                    self.checkpointer.save(&mut state)?;
                    info!(step = %id, next = %next, "Step completed");
                }
                Err(e) if e.is_interrupted() => {
                    self.checkpointer.save(&mut state)?;
                    warn!(resume_at = %id, "Interrupted during step; state saved");
                    return Ok(RunOutcome::Interrupted { resume_at: id });
                }
                Err(e) => {
                    let e = e.in_step(id.as_str());
                    if e.exit_class() == ExitClass::Fatal {
                        error!(step = %id, error = %e, "fatal step error");
                        return Err(e);
                    }
                    self.checkpointer.save(&mut state)?;
                    error!(step = %id, error = %e, "Step failed; resume with --resume");
                    return Ok(RunOutcome::Failed { step: id, error: e });
                }
            }
        }

        completed(&state)
    }

    fn prepare_state(&self, mode: RunMode) -> Result<AgentState> {
        let subject = &self.ctx.subject;
        match mode {
            RunMode::Resume => match self.checkpointer.load(subject)? {
                Some(state) => {
                    info!("Resuming {} at {}", subject, state.current_step);
                    Ok(state)
                }
                None => {
                    info!("No checkpoint for {}; starting fresh", subject);
                    Ok(AgentState::new(subject.clone()))
                }
            },
            RunMode::Fresh => {
                self.checkpointer.backup_existing(subject)?;
                Ok(AgentState::new(subject.clone()))
            }
        }
    }
}

fn completed(state: &AgentState) -> Result<RunOutcome> {
    let report = state.artifact(REPORT).cloned().ok_or_else(|| {
        AgentError::StateTransition(format!(
            "{} is done but no report is recorded",
            state.subject_id
        ))
    })?;
    Ok(RunOutcome::Completed { report })
}

fn validate_steps(steps: &[Box<dyn PipelineStep>]) -> Result<()> {
    let ids: Vec<StepId> = steps.iter().map(|s| s.id()).collect();
    if ids != StepId::PIPELINE {
        return Err(AgentError::Config(format!(
            "registered steps {:?} do not match the pipeline order {:?}",
            ids,
            StepId::PIPELINE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::artifacts::{MACRO_CONTEXT, MacroContext, RAW_FILINGS};
    use crate::pipeline::step::StepOutput;
    use crate::pipeline::test_support::{Harness, abc_quote};
    use crate::sources::{macro_data, market};
    use crate::types::ErrorCategory;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Reports progress, waits until the note is on disk, then stops
    struct SlowComparables {
        note_saved_mid_step: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PipelineStep for SlowComparables {
        fn id(&self) -> StepId {
            StepId::GatherComparables
        }

        fn requires(&self) -> &'static [&'static str] {
            &[]
        }

        fn produces(&self) -> &'static [&'static str] {
            &[]
        }

        async fn execute(&self, ctx: &StepContext, _state: &AgentState) -> Result<StepOutput> {
            ctx.progress
                .note("comparables.progress", json!({"completed": 1, "total": 2}));

            let reader = Checkpointer::new(ctx.config.state_dir(), Duration::ZERO);
            for _ in 0..200 {
                tokio::time::sleep(Duration::from_millis(25)).await;
                if let Ok(Some(saved)) = reader.load(&ctx.subject)
                    && saved.note("comparables.progress").is_some()
                {
                    self.note_saved_mid_step.store(true, Ordering::SeqCst);
                    break;
                }
            }

            ctx.shutdown.request_shutdown();
            Err(AgentError::Interrupted)
        }
    }

    fn read_report(path: &PathBuf) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_run_completes() {
        let harness = Harness::xyz();
        let mut orchestrator = harness.orchestrator(ShutdownSignal::new());

        let outcome = orchestrator.run(RunMode::Fresh).await.unwrap();
        let RunOutcome::Completed { report } = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };

        let state = harness.load_state();
        assert!(state.is_done());
        assert_eq!(state.artifact_paths.len(), 6);
        assert_eq!(state.note("cik"), Some(&serde_json::json!("0000001234")));
        assert!(state.note("fiscal_years").is_some());
        assert!(state.note("comparables.progress").is_some());
        assert!(state.note("valuation").is_some());
        assert!(state.note("macro.fallbacks").is_none());

        let markdown = read_report(&report);
        assert_eq!(markdown.matches("Fair value estimate").count(), 1);
        assert!(markdown.contains("XYZ Corp"));
        assert!(markdown.contains("Peer median P/E: 20.00"));
    }

    #[tokio::test]
    async fn test_resume_after_completion_is_idempotent() {
        let harness = Harness::xyz();
        let first = harness.orchestrator(ShutdownSignal::new()).run(RunMode::Fresh).await.unwrap();
        let RunOutcome::Completed { report } = first else {
            panic!("expected completion");
        };
        let before = read_report(&report);
        let calls = harness.network_calls();

        let mut again = harness.orchestrator(ShutdownSignal::new());
        let second = again.run(RunMode::Resume).await.unwrap();
        assert!(matches!(second, RunOutcome::Completed { .. }));
        assert_eq!(harness.network_calls(), calls);
        assert_eq!(again.fetcher().network_calls(), 0);
        assert_eq!(read_report(&report), before);
    }

    #[tokio::test]
    async fn test_interrupt_mid_comparables_then_resume() {
        let harness = Harness::xyz();
        let first_signal = ShutdownSignal::new();
        harness.market.interrupt_once(
            &market::quote_request(&harness.config.market, "ABC"),
            first_signal.clone(),
            abc_quote(),
        );

        let outcome = harness.orchestrator(first_signal).run(RunMode::Fresh).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Interrupted { resume_at: StepId::GatherComparables }
        ));
        assert_eq!(outcome.exit_code(), 130);

        let saved = harness.load_state();
        assert_eq!(saved.current_step, StepId::GatherComparables);
        assert!(saved.artifact(RAW_FILINGS).is_some());
        assert_eq!(saved.artifact_paths.len(), 2);

        let sec_calls = harness.sec.calls();
        let outcome = harness.orchestrator(ShutdownSignal::new()).run(RunMode::Resume).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        // Filing steps were skipped, not re-fetched
        assert_eq!(harness.sec.calls(), sec_calls);
        assert!(harness.load_state().is_done());
        assert_eq!(harness.load_state().created_at, saved.created_at);
    }

    #[tokio::test]
    async fn test_macro_permanent_failure_uses_default_rate() {
        let harness = Harness::xyz();
        harness.macro_source.fail(
            &macro_data::risk_free_request(&harness.config.macro_data),
            ErrorCategory::NotFound,
        );

        let outcome = harness.orchestrator(ShutdownSignal::new()).run(RunMode::Fresh).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        let state = harness.load_state();
        let fallbacks = state.note("macro.fallbacks").unwrap();
        assert_eq!(fallbacks[0]["value"], serde_json::json!(0.04));
        let context: MacroContext = harness.read_artifact(&state, MACRO_CONTEXT);
        assert_eq!(context.risk_free_rate, 0.04);
        assert_eq!(context.risk_free_source, "default");
        // permanent failures are not retried
        assert_eq!(harness.macro_source.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_api_key_skips_macro_fetch() {
        let harness = Harness::with_config("XYZ", |config| config.macro_data.api_key = None);
        let outcome = harness.orchestrator(ShutdownSignal::new()).run(RunMode::Fresh).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(harness.macro_source.calls(), 0);
        assert!(harness.load_state().note("macro.fallbacks").is_some());
    }

    #[tokio::test]
    async fn test_peer_failure_is_skipped_and_recorded() {
        let harness = Harness::xyz();
        harness.market.fail(
            &market::quote_request(&harness.config.market, "DEF"),
            ErrorCategory::NotFound,
        );

        let outcome = harness.orchestrator(ShutdownSignal::new()).run(RunMode::Fresh).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));

        let state = harness.load_state();
        let failures = state.note("comparables.peer_failures").unwrap();
        assert_eq!(failures[0]["symbol"], serde_json::json!("DEF"));
    }

    #[tokio::test]
    async fn test_unknown_ticker_fails_resumably() {
        let harness = Harness::with_config("NOPE", |_| {});
        let outcome = harness.orchestrator(ShutdownSignal::new()).run(RunMode::Fresh).await.unwrap();

        let RunOutcome::Failed { step, error } = &outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(*step, StepId::FetchRawData);
        assert!(matches!(error.root(), AgentError::MissingArtifact { .. }));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(harness.load_state().current_step, StepId::FetchRawData);
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_is_fatal_until_fresh() {
        let harness = Harness::xyz();
        let path = harness.checkpoint_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ truncated").unwrap();

        let err = harness
            .orchestrator(ShutdownSignal::new())
            .run(RunMode::Resume)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::CorruptCheckpoint { .. }));
        assert_eq!(err.exit_class(), ExitClass::Fatal);
        assert_eq!(harness.network_calls(), 0);

        let outcome = harness.orchestrator(ShutdownSignal::new()).run(RunMode::Fresh).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert!(path.with_extension("json.bak").exists());
    }

    #[tokio::test]
    async fn test_missing_precondition_is_fatal() {
        let harness = Harness::xyz();
        let mut state = AgentState::new(Ticker::parse("XYZ").unwrap());
        state.advance_to(StepId::GatherComparables).unwrap();
        let mut checkpointer = Checkpointer::new(harness.config.state_dir(), Duration::from_secs(60));
        checkpointer.save(&mut state).unwrap();

        let err = harness
            .orchestrator(ShutdownSignal::new())
            .run(RunMode::Resume)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Precondition { ref artifact, .. } if artifact == RAW_FILINGS));
    }

    #[tokio::test]
    async fn test_shutdown_before_first_step() {
        let harness = Harness::xyz();
        let signal = ShutdownSignal::new();
        signal.request_shutdown();

        let outcome = harness.orchestrator(signal).run(RunMode::Fresh).await.unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::Interrupted { resume_at: StepId::FetchRawData }
        ));
        assert_eq!(harness.network_calls(), 0);
        assert_eq!(harness.load_state().current_step, StepId::FetchRawData);
    }

    #[tokio::test]
    async fn test_progress_notes_saved_while_step_runs() {
        let harness =
            Harness::with_config("XYZ", |config| config.checkpoint.save_every_secs = 0);
        let note_saved_mid_step = Arc::new(AtomicBool::new(false));
        let mut steps = default_steps();
        steps[2] = Box::new(SlowComparables {
            note_saved_mid_step: note_saved_mid_step.clone(),
        });

        let signal = ShutdownSignal::new();
        let mut orchestrator = harness.orchestrator(signal).with_steps(steps).unwrap();
        let outcome = orchestrator.run(RunMode::Fresh).await.unwrap();

        assert!(matches!(
            outcome,
            RunOutcome::Interrupted { resume_at: StepId::GatherComparables }
        ));
        assert!(note_saved_mid_step.load(Ordering::SeqCst));

        let saved = harness.load_state();
        assert_eq!(saved.current_step, StepId::GatherComparables);
        assert_eq!(
            saved.note("comparables.progress"),
            Some(&json!({"completed": 1, "total": 2}))
        );
    }

    #[test]
    fn test_step_order_is_validated() {
        let harness = Harness::xyz();
        let mut steps = default_steps();
        steps.swap(0, 1);
        let result = harness.orchestrator(ShutdownSignal::new()).with_steps(steps);
        assert!(matches!(result, Err(AgentError::Config(_))));
    }
}
