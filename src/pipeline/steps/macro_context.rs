use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::pipeline::artifacts::{MACRO_CONTEXT, MacroContext, MacroFallback};
use crate::pipeline::state::{AgentState, StepId};
use crate::pipeline::step::{PipelineStep, StepContext, StepOutput};
use crate::sources::macro_data;
use crate::types::Result;

const DEFAULT_SOURCE: &str = "default";

/// Risk-free rate and market risk premium; the rate source is optional
pub struct GatherMacroContext;

#[async_trait]
impl PipelineStep for GatherMacroContext {
    fn id(&self) -> StepId {
        StepId::GatherMacroContext
    }

    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[MACRO_CONTEXT]
    }

    async fn execute(&self, ctx: &StepContext, _state: &AgentState) -> Result<StepOutput> {
        let macro_config = &ctx.config.macro_data;
        let fallback = ctx.config.valuation.risk_free_fallback;

        let has_key = macro_config
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty());

        let observed: std::result::Result<f64, String> = if !has_key {
            Err("FRED_API_KEY not configured".to_string())
        } else {
            match ctx.fetcher.fetch(&macro_data::risk_free_request(macro_config)).await {
                Ok(payload) => macro_data::parse_latest_rate(&payload).map_err(|gap| gap.to_string()),
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) if e.is_fetch_failure() => Err(e.to_string()),
                Err(e) => return Err(e),
            }
        };

        let mut fallbacks = Vec::new();
        let (risk_free_rate, risk_free_source) = match observed {
            Ok(rate) => {
                info!(subject = %ctx.subject, rate, series = %macro_config.series_id, "risk-free rate observed");
                (rate, macro_config.series_id.clone())
            }
            Err(reason) => {
                warn!(subject = %ctx.subject, %reason, fallback, "risk-free rate unavailable, using default");
                fallbacks.push(MacroFallback {
                    input: "risk_free_rate".to_string(),
                    value: fallback,
                    reason,
                });
                (fallback, DEFAULT_SOURCE.to_string())
            }
        };

        let context = MacroContext {
            risk_free_rate,
            market_risk_premium: ctx.config.valuation.market_risk_premium,
            risk_free_source,
            fallbacks,
        };
        let path = ctx.artifacts.write_json(MACRO_CONTEXT, &context)?;

        let mut output = StepOutput::new().artifact(MACRO_CONTEXT, path);
        if !context.fallbacks.is_empty() {
            output = output.note("macro.fallbacks", json!(context.fallbacks));
        }
        Ok(output)
    }
}
