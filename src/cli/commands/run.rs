//! Run Command
//!
//! Executes the pipeline for one ticker, optionally repeating it on an
//! interval. Each repeat starts fresh; unchanged filing requests are served
//! by the cache while daily-bucketed market and macro data refresh.

use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, ConfigOverrides};
use crate::pipeline::{Orchestrator, RunMode, RunOutcome};
use crate::shutdown::ShutdownSignal;
use crate::sources::build_fetcher;
use crate::types::{Result, Ticker};
use crate::valuation::{DefaultValuationEngine, ValuationEngine};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub ticker: String,
    pub fresh: bool,
    pub overrides: ConfigOverrides,
}

pub async fn run(options: RunOptions) -> Result<RunOutcome> {
    let subject = Ticker::parse(&options.ticker)?;
    let ctx = CommandContext::load(&options.overrides)?;
    let config = ctx.config.clone();

    let shutdown = ShutdownSignal::new();
    shutdown.install_handlers();

    let fetcher = Arc::new(build_fetcher(&config, ctx.cache.clone(), shutdown.clone())?);
    let engine: Arc<dyn ValuationEngine> =
        Arc::new(DefaultValuationEngine::new(config.valuation.clone()));

    let output = Output::new();
    let run_id = Uuid::new_v4();
    let interval = Duration::from_secs(config.pipeline.loop_interval_secs);
    let mut mode = if options.fresh {
        RunMode::Fresh
    } else {
        RunMode::Resume
    };

    output.header(&format!("Equity Agent: {}", subject));
    let mut iteration: u64 = 0;
    loop {
        iteration += 1;
        let calls_before = fetcher.network_calls();

        let mut orchestrator = Orchestrator::new(
            subject.clone(),
            config.clone(),
            fetcher.clone(),
            engine.clone(),
            shutdown.clone(),
        );
        let span = info_span!("run", run_id = %run_id, iteration);
        let outcome = orchestrator.run(mode).instrument(span).await?;

        output.outcome(subject.as_str(), &outcome);
        output.field("Network calls", fetcher.network_calls() - calls_before);
        output.field("Cache hits", fetcher.cache_hits());

        if interval.is_zero() || !matches!(outcome, RunOutcome::Completed { .. }) {
            return Ok(outcome);
        }

        info!(
            "Next refresh of {} in {}s (Ctrl+C to stop)",
            subject,
            interval.as_secs()
        );
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                info!("Refresh loop stopped");
                return Ok(outcome);
            }
        }
        mode = RunMode::Fresh;
    }
}
