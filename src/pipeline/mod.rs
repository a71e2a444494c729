//! Resumable Research Pipeline
//!
//! Six fixed steps take one ticker from raw SEC filings to a valuation
//! report. Progress lives in `AgentState`, persisted by the `Checkpointer`
//! after every step so an interrupted or failed run resumes where it stopped.
//!
//! ## Steps
//!
//! 1. **fetch_raw_data**: ticker → CIK, submissions and company facts
//! 2. **build_normalized_dataset**: per-year statement values and ratios
//! 3. **gather_comparables**: target quote, peer P/E, sector benchmark
//! 4. **gather_macro_context**: risk-free rate (optional source)
//! 5. **run_valuation**: DCF, relative P/E and the blended estimate
//! 6. **render_report**: Markdown report

pub mod artifacts;
pub mod checkpoint;
pub mod orchestrator;
pub mod state;
pub mod step;
pub mod steps;

#[cfg(test)]
pub(crate) mod test_support;

pub use artifacts::ArtifactStore;
pub use checkpoint::Checkpointer;
pub use orchestrator::{Orchestrator, RunMode, RunOutcome};
pub use state::{AgentState, StepId};
pub use step::{PipelineStep, ProgressReporter, StepContext, StepOutput};
pub use steps::default_steps;
