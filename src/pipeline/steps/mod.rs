//! The six pipeline steps, in execution order.

mod comparables;
mod fetch_raw;
mod macro_context;
mod normalize;
mod report;
mod valuation;

pub use comparables::GatherComparables;
pub use fetch_raw::FetchRawData;
pub use macro_context::GatherMacroContext;
pub use normalize::BuildNormalizedDataset;
pub use report::{RenderReport, render_markdown};
pub use valuation::RunValuation;

use super::step::PipelineStep;

/// The fixed step list the orchestrator expects
pub fn default_steps() -> Vec<Box<dyn PipelineStep>> {
    vec![
        Box::new(FetchRawData),
        Box::new(BuildNormalizedDataset),
        Box::new(GatherComparables),
        Box::new(GatherMacroContext),
        Box::new(RunValuation),
        Box::new(RenderReport),
    ]
}
