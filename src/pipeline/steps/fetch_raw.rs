use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::pipeline::artifacts::{RAW_FILINGS, RawFilings};
use crate::pipeline::state::{AgentState, StepId};
use crate::pipeline::step::{PipelineStep, StepContext, StepOutput};
use crate::sources::sec;
use crate::types::{AgentError, Result};

/// Resolve the CIK and download submissions plus company facts
pub struct FetchRawData;

#[async_trait]
impl PipelineStep for FetchRawData {
    fn id(&self) -> StepId {
        StepId::FetchRawData
    }

    fn requires(&self) -> &'static [&'static str] {
        &[]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[RAW_FILINGS]
    }

    async fn execute(&self, ctx: &StepContext, _state: &AgentState) -> Result<StepOutput> {
        let sec_config = &ctx.config.sec;

        let index = ctx.fetcher.fetch(&sec::ticker_index_request(sec_config)).await?;
        let company = sec::resolve_cik(&index, &ctx.subject).ok_or_else(|| {
            AgentError::MissingArtifact {
                subject: ctx.subject.to_string(),
                message: "ticker not found in the SEC ticker index".to_string(),
            }
        })?;
        info!(subject = %ctx.subject, cik = %company.cik, "resolved CIK");

        let submissions = ctx
            .fetcher
            .fetch(&sec::submissions_request(sec_config, company.cik))
            .await?;
        let company_facts = ctx
            .fetcher
            .fetch(&sec::company_facts_request(sec_config, company.cik))
            .await?;

        if !company_facts.is_object() {
            return Err(AgentError::malformed(RAW_FILINGS, "company facts is not a JSON object"));
        }

        let company_name = sec::company_name(&submissions, &company_facts).or(company.title);
        let raw = RawFilings {
            ticker: ctx.subject.clone(),
            cik: company.cik.padded(),
            company_name: company_name.clone(),
            submissions,
            company_facts,
        };
        let path = ctx.artifacts.write_json(RAW_FILINGS, &raw)?;

        Ok(StepOutput::new()
            .artifact(RAW_FILINGS, path)
            .note("cik", json!(raw.cik))
            .note("company_name", json!(company_name)))
    }
}
