//! Markdown report rendering.
//!
//! Output depends only on the artifacts and the recorded company name, never
//! on the clock, so re-rendering the same inputs yields identical bytes.

use async_trait::async_trait;
use std::fmt::Write;
use tracing::info;

use crate::constants;
use crate::financials::RatiosTable;
use crate::pipeline::artifacts::{
    COMPARABLES, Comparables, MACRO_CONTEXT, MacroContext, RATIOS_TABLE, REPORT, VALUATION_RESULT,
};
use crate::pipeline::state::{AgentState, StepId};
use crate::pipeline::step::{PipelineStep, StepContext, StepOutput};
use crate::types::{Result, Ticker};
use crate::valuation::ValuationResult;

/// Write the valuation report
pub struct RenderReport;

#[async_trait]
impl PipelineStep for RenderReport {
    fn id(&self) -> StepId {
        StepId::RenderReport
    }

    fn requires(&self) -> &'static [&'static str] {
        &[RATIOS_TABLE, COMPARABLES, MACRO_CONTEXT, VALUATION_RESULT]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[REPORT]
    }

    async fn execute(&self, ctx: &StepContext, state: &AgentState) -> Result<StepOutput> {
        let table: RatiosTable = ctx.artifacts.read_json(state, RATIOS_TABLE)?;
        let comparables: Comparables = ctx.artifacts.read_json(state, COMPARABLES)?;
        let macro_context: MacroContext = ctx.artifacts.read_json(state, MACRO_CONTEXT)?;
        let valuation: ValuationResult = ctx.artifacts.read_json(state, VALUATION_RESULT)?;

        let company_name = state.note("company_name").and_then(|v| v.as_str());
        let markdown = render_markdown(
            &ctx.subject,
            company_name,
            &table,
            &comparables,
            &macro_context,
            &valuation,
        );

        let path = ctx
            .artifacts
            .write_text(constants::paths::REPORT_FILE, &markdown)?;
        info!(subject = %ctx.subject, path = %path.display(), "report written");

        Ok(StepOutput::new().artifact(REPORT, path))
    }
}

pub fn render_markdown(
    subject: &Ticker,
    company_name: Option<&str>,
    table: &RatiosTable,
    comparables: &Comparables,
    macro_context: &MacroContext,
    valuation: &ValuationResult,
) -> String {
    let mut out = String::new();

    match company_name {
        Some(name) => {
            let _ = writeln!(out, "# Valuation Report: {} ({})", subject, name);
        }
        None => {
            let _ = writeln!(out, "# Valuation Report: {}", subject);
        }
    }
    out.push('\n');

    render_ratios(&mut out, table);
    render_comparables(&mut out, comparables);

    out.push_str("## Macro Context\n\n");
    let _ = writeln!(
        out,
        "- Risk-free rate: {} (source: {})",
        percent(macro_context.risk_free_rate),
        macro_context.risk_free_source
    );
    let _ = writeln!(
        out,
        "- Market risk premium: {}",
        percent(macro_context.market_risk_premium)
    );
    out.push('\n');

    let details = &valuation.details;
    out.push_str("## Valuation\n\n");
    let _ = writeln!(out, "- Latest fiscal year: {}", details.latest_year);
    let _ = writeln!(out, "- Growth assumption: {}", percent(details.growth_assumption));
    let _ = writeln!(out, "- WACC: {} (discount rate {})", percent(details.wacc), percent(details.discount_rate));
    let _ = writeln!(out, "- DCF value: {}", money(valuation.dcf_value));
    let _ = writeln!(
        out,
        "- Relative value: {} at {:.2}x P/E",
        money(valuation.relative_value),
        details.peer_pe
    );
    out.push('\n');
    let _ = writeln!(out, "**Fair value estimate: {}**", money(valuation.blended_value));
    out.push('\n');

    render_disclosures(&mut out, comparables, macro_context, valuation);
    out
}

fn render_ratios(out: &mut String, table: &RatiosTable) {
    out.push_str("## Key Ratios\n\n");
    out.push_str("| Fiscal Year | Revenues | Net Income | Gross Margin | Operating Margin | Net Margin | Leverage | ROA | Debt/Assets |\n");
    out.push_str("|---|---:|---:|---:|---:|---:|---:|---:|---:|\n");

    for row in table.recent(constants::report::RATIO_YEARS) {
        let value = |tag: &str| row.value(tag).map(money).unwrap_or_else(na);
        let ratio = |name: &str| row.ratio(name).map(percent).unwrap_or_else(na);
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} |",
            row.fiscal_year,
            value("Revenues"),
            value("NetIncomeLoss"),
            ratio("GrossMargin"),
            ratio("OperatingMargin"),
            ratio("NetMargin"),
            row.ratio("Leverage")
                .map(|x| format!("{:.2}x", x))
                .unwrap_or_else(na),
            ratio("ROA"),
            ratio("DebtToAssets"),
        );
    }
    out.push('\n');
}

fn render_comparables(out: &mut String, comparables: &Comparables) {
    let benchmark = &comparables.sector_benchmark;
    out.push_str("## Comparables\n\n");
    let _ = writeln!(
        out,
        "- Market cap: {}",
        comparables.market_cap.map(money).unwrap_or_else(na)
    );
    let _ = writeln!(
        out,
        "- Sector: {} (benchmark {}, 1-year return {})",
        benchmark.sector,
        benchmark.benchmark_etf,
        percent(benchmark.sector_return_1y)
    );
    let _ = writeln!(
        out,
        "- Industry: {}",
        comparables.industry.as_deref().unwrap_or("n/a")
    );
    let _ = writeln!(out, "- Peers: {}", comparables.peers.join(", "));
    let _ = writeln!(
        out,
        "- Peer median P/E: {}",
        comparables
            .peer_median_pe
            .map(|pe| format!("{:.2}", pe))
            .unwrap_or_else(na)
    );
    out.push('\n');
}

fn render_disclosures(
    out: &mut String,
    comparables: &Comparables,
    macro_context: &MacroContext,
    valuation: &ValuationResult,
) {
    out.push_str("## Data Gaps and Fallbacks\n\n");

    let mut lines = Vec::new();
    for failure in &comparables.peer_failures {
        lines.push(format!("- Peer {} skipped: {}", failure.symbol, failure.error));
    }
    for fallback in &macro_context.fallbacks {
        lines.push(format!(
            "- {} defaulted to {}: {}",
            fallback.input,
            percent(fallback.value),
            fallback.reason
        ));
    }
    for fallback in &valuation.fallbacks {
        lines.push(format!(
            "- {} defaulted to {}: {}",
            fallback.input, fallback.value, fallback.reason
        ));
    }

    if lines.is_empty() {
        out.push_str("None.\n");
    } else {
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
    }
}

fn na() -> String {
    "n/a".to_string()
}

fn percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

/// Whole dollars with thousands separators
fn money(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}
