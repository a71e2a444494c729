use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::financials::RatiosTable;
use crate::pipeline::artifacts::{RATIOS_TABLE, RAW_FILINGS, RawFilings};
use crate::pipeline::state::{AgentState, StepId};
use crate::pipeline::step::{PipelineStep, StepContext, StepOutput};
use crate::types::Result;

/// Turn company facts into the per-year ratios table
pub struct BuildNormalizedDataset;

#[async_trait]
impl PipelineStep for BuildNormalizedDataset {
    fn id(&self) -> StepId {
        StepId::BuildNormalizedDataset
    }

    fn requires(&self) -> &'static [&'static str] {
        &[RAW_FILINGS]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[RATIOS_TABLE]
    }

    async fn execute(&self, ctx: &StepContext, state: &AgentState) -> Result<StepOutput> {
        let raw: RawFilings = ctx.artifacts.read_json(state, RAW_FILINGS)?;
        let table = RatiosTable::from_company_facts(&raw.company_facts)?;
        let years = table.fiscal_years();
        info!(subject = %ctx.subject, years = years.len(), "normalized financial statements");

        let path = ctx.artifacts.write_json(RATIOS_TABLE, &table)?;
        Ok(StepOutput::new()
            .artifact(RATIOS_TABLE, path)
            .note("fiscal_years", json!(years)))
    }
}
