use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::financials::RatiosTable;
use crate::pipeline::artifacts::{
    COMPARABLES, Comparables, MACRO_CONTEXT, MacroContext, RATIOS_TABLE, VALUATION_RESULT,
};
use crate::pipeline::state::{AgentState, StepId};
use crate::pipeline::step::{PipelineStep, StepContext, StepOutput};
use crate::types::Result;
use crate::valuation::ValuationInput;

/// Run the configured valuation engine over the gathered inputs
pub struct RunValuation;

#[async_trait]
impl PipelineStep for RunValuation {
    fn id(&self) -> StepId {
        StepId::RunValuation
    }

    fn requires(&self) -> &'static [&'static str] {
        &[RATIOS_TABLE, COMPARABLES, MACRO_CONTEXT]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[VALUATION_RESULT]
    }

    async fn execute(&self, ctx: &StepContext, state: &AgentState) -> Result<StepOutput> {
        let table: RatiosTable = ctx.artifacts.read_json(state, RATIOS_TABLE)?;
        let comparables: Comparables = ctx.artifacts.read_json(state, COMPARABLES)?;
        let macro_context: MacroContext = ctx.artifacts.read_json(state, MACRO_CONTEXT)?;

        let input = ValuationInput {
            table,
            market_cap: comparables.market_cap,
            peer_pe: comparables.peer_median_pe,
            risk_free_rate: macro_context.risk_free_rate,
            market_risk_premium: macro_context.market_risk_premium,
        };
        let result = ctx.engine.value(&input)?;

        for fallback in &result.fallbacks {
            warn!(subject = %ctx.subject, input = %fallback.input, value = fallback.value, reason = %fallback.reason, "valuation input defaulted");
        }
        info!(
            subject = %ctx.subject,
            engine = ctx.engine.name(),
            fair_value = result.blended_value,
            "valuation complete"
        );

        let path = ctx.artifacts.write_json(VALUATION_RESULT, &result)?;
        let mut output = StepOutput::new().artifact(VALUATION_RESULT, path).note(
            "valuation",
            json!({
                "engine": ctx.engine.name(),
                "dcf_value": result.dcf_value,
                "relative_value": result.relative_value,
                "blended_value": result.blended_value,
                "wacc": result.details.wacc,
                "growth": result.details.growth_assumption,
            }),
        );
        if !result.fallbacks.is_empty() {
            output = output.note("valuation.fallbacks", json!(result.fallbacks));
        }
        Ok(output)
    }
}
