use crate::domain::model::{
    ComplianceReport, CustomerRiskReport, Diagnostic, RegulatoryContext, RiskLevel, SummarySource,
};
use chrono::Utc;

/// Combines the run's outputs into the final report.
///
/// Customer reports are put back into source-row order, since evaluation may
/// finish in any order. The summary is inserted verbatim.
pub fn assemble(
    mut customer_reports: Vec<CustomerRiskReport>,
    context: RegulatoryContext,
    summary: String,
    summary_source: SummarySource,
    diagnostics: Vec<Diagnostic>,
) -> ComplianceReport {
    customer_reports.sort_by(|a, b| {
        a.source_row
            .cmp(&b.source_row)
            .then_with(|| a.customer_id.cmp(&b.customer_id))
    });

    ComplianceReport {
        executive_summary: summary,
        summary_source,
        customer_reports,
        regulatory_context: context,
        diagnostics,
        generated_at: Utc::now(),
    }
}

/// Deterministic summary used when the narrative generator is unavailable.
pub fn fallback_summary(customer_reports: &[CustomerRiskReport]) -> String {
    let count_at = |level: RiskLevel| {
        customer_reports
            .iter()
            .filter(|r| r.highest_level() == Some(level))
            .count()
    };
    let high = count_at(RiskLevel::High);
    let medium = count_at(RiskLevel::Medium);
    let low = count_at(RiskLevel::Low);

    let mut summary = format!(
        "Evaluated {} customer(s): {} with at least one High risk finding, {} with Medium as the highest level, {} with only Low risk findings.",
        customer_reports.len(),
        high,
        medium,
        low
    );

    let mut flagged: Vec<&CustomerRiskReport> =
        customer_reports.iter().filter(|r| r.high_count > 0).collect();
    if !flagged.is_empty() {
        flagged.sort_by(|a, b| {
            b.high_count
                .cmp(&a.high_count)
                .then_with(|| a.source_row.cmp(&b.source_row))
        });
        let names: Vec<String> = flagged
            .iter()
            .map(|r| format!("{} ({} High)", r.customer_id, r.high_count))
            .collect();
        summary.push_str(&format!(" Prioritize review of: {}.", names.join(", ")));
    }

    summary
}
