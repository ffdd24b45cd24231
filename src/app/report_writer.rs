use crate::domain::model::{ComplianceReport, SummarySource};
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::io::Write;
use zip::{write::FileOptions, ZipWriter};

const RULE_WIDTH: usize = 80;

/// Which artifacts to write and under what base name.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub report_name: String,
    pub formats: Vec<String>,
    pub bundle: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            report_name: "compliance_report".to_string(),
            formats: vec!["txt".to_string()],
            bundle: false,
        }
    }
}

/// Human-readable rendition of the report.
pub fn render_text(report: &ComplianceReport) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut lines = vec![
        heavy.clone(),
        "340B PROGRAM COMPLIANCE RISK DETECTION REPORT".to_string(),
        heavy.clone(),
        String::new(),
        "EXECUTIVE SUMMARY".to_string(),
        light.clone(),
        report.executive_summary.clone(),
    ];
    if report.summary_source == SummarySource::Fallback {
        lines.push("(template summary; narrative generator unavailable)".to_string());
    }
    lines.push(String::new());
    lines.push("CUSTOMER RISK ANALYSIS".to_string());
    lines.push(light);

    for customer in &report.customer_reports {
        lines.push(format!("\nCustomer: {}", customer.customer_id));
        lines.push(format!("  High Risk Issues: {}", customer.high_count));
        lines.push(format!("  Medium Risk Issues: {}", customer.medium_count));
        lines.push(format!("  Low Risk Issues: {}", customer.low_count));

        for finding in &customer.findings {
            lines.push(format!("\n  • {}", finding.category));
            lines.push(format!("    Value: {}", finding.value));
            lines.push(format!("    Risk Level: {}", finding.level));
            lines.push(format!("    Threshold: {}", finding.band));
            lines.push(format!("    Description: {}", finding.explanation));
        }
    }

    lines.push(String::new());
    lines.push(heavy.clone());
    lines.push("REGULATORY CONTEXT".to_string());
    lines.push(heavy.clone());
    lines.push(report.regulatory_context.to_text().trim_end().to_string());

    if !report.diagnostics.is_empty() {
        lines.push(String::new());
        lines.push(heavy.clone());
        lines.push("DIAGNOSTICS".to_string());
        lines.push(heavy.clone());
        for diagnostic in &report.diagnostics {
            let subject = diagnostic
                .subject
                .as_deref()
                .map(|s| format!(" {}", s))
                .unwrap_or_default();
            lines.push(format!(
                "  - [{}] {:?}{}: {}",
                diagnostic.stage, diagnostic.kind, subject, diagnostic.message
            ));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Report Generated: {}",
        report.generated_at.format("%a %b %e %H:%M:%S UTC %Y")
    ));
    lines.push(heavy);

    lines.join("\n")
}

pub fn render_json(report: &ComplianceReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Writes the requested artifacts through `storage` and returns their paths.
pub async fn write_report<S: Storage>(
    storage: &S,
    report: &ComplianceReport,
    options: &WriteOptions,
) -> Result<Vec<String>> {
    let mut artifacts: Vec<(String, String)> = Vec::new();
    for format in &options.formats {
        match format.as_str() {
            "txt" => artifacts.push((format!("{}.txt", options.report_name), render_text(report))),
            "json" => artifacts.push((format!("{}.json", options.report_name), render_json(report)?)),
            other => tracing::warn!("🔶 Unsupported output format: {}", other),
        }
    }

    let mut written = Vec::new();
    for (name, content) in &artifacts {
        tracing::debug!("Writing {} ({} bytes)", name, content.len());
        storage.write_file(name, content.as_bytes()).await?;
        written.push(name.clone());
    }

    if options.bundle {
        let zip_name = format!("{}.zip", options.report_name);
        let zip_data = bundle(&artifacts, report)?;
        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        storage.write_file(&zip_name, &zip_data).await?;
        written.push(zip_name);
    }

    tracing::info!("💾 Wrote {} report artifact(s)", written.len());
    Ok(written)
}

fn bundle(artifacts: &[(String, String)], report: &ComplianceReport) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

    for (name, content) in artifacts {
        zip.start_file::<_, ()>(name.as_str(), FileOptions::default())?;
        zip.write_all(content.as_bytes())?;
    }

    zip.start_file::<_, ()>("diagnostics.json", FileOptions::default())?;
    let diagnostics = serde_json::to_string_pretty(&report.diagnostics)?;
    zip.write_all(diagnostics.as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use crate::core::catalog::RiskCatalog;
    use crate::core::context::{aggregate, ContextInputs};
    use crate::core::evaluator::evaluate;
    use crate::core::report::assemble;
    use crate::domain::model::{CustomerMetric, Diagnostic, DiagnosticKind, SearchHit, Stage};
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_report() -> ComplianceReport {
        let catalog = RiskCatalog::standard().unwrap();
        let reports = vec![
            evaluate(&CustomerMetric::new("CE001", 1, 2, 95.0, 80.0).unwrap(), &catalog).report,
            evaluate(&CustomerMetric::new("CE002", 2, 20, 60.0, 30.0).unwrap(), &catalog).report,
        ];
        let context = aggregate(
            ContextInputs {
                regulatory_query: "340B program compliance".to_string(),
                regulatory_hits: vec![SearchHit {
                    snippet: "Stronger diversion controls".to_string(),
                    source: "hrsa.gov".to_string(),
                }],
                guidance_query: "HRSA guidance".to_string(),
                guidance_hits: vec![],
            },
            Utc::now(),
        );
        assemble(
            reports,
            context,
            "CE002 needs review.".to_string(),
            SummarySource::Generated,
            vec![Diagnostic::new(
                Stage::RetrieveMetrics,
                DiagnosticKind::MalformedMetricRecord,
                Some("row 3".to_string()),
                "non-numeric match rate",
            )],
        )
    }

    #[test]
    fn test_render_text_layout() {
        let text = render_text(&sample_report());

        assert!(text.starts_with(&"=".repeat(80)));
        assert!(text.contains("EXECUTIVE SUMMARY"));
        assert!(text.contains("CE002 needs review."));
        assert!(text.contains("Customer: CE002\n  High Risk Issues: 3"));
        assert!(text.contains("  • Negative Accumulation Risk\n    Value: 2\n    Risk Level: Low\n    Threshold: [0, 5]"));
        assert!(text.contains("  - Stronger diversion controls [hrsa.gov]"));
        assert!(text.contains("[retrieve_metrics] MalformedMetricRecord row 3: non-numeric match rate"));
        assert!(text.contains("Report Generated: "));
        assert!(!text.contains("template summary"));
    }

    #[test]
    fn test_render_json_is_parseable() {
        let json = render_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["customer_reports"][1]["customer_id"], "CE002");
        assert_eq!(value["summary_source"], "generated");
        assert_eq!(value["diagnostics"][0]["kind"], "malformed_metric_record");
    }

    #[tokio::test]
    async fn test_write_report_with_bundle() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap().to_string());
        let options = WriteOptions {
            report_name: "weekly".to_string(),
            formats: vec!["txt".to_string(), "json".to_string()],
            bundle: true,
        };

        let written = write_report(&storage, &sample_report(), &options).await.unwrap();

        assert_eq!(written, vec!["weekly.txt", "weekly.json", "weekly.zip"]);
        assert!(dir.path().join("weekly.txt").exists());

        let zip_file = std::fs::File::open(dir.path().join("weekly.zip")).unwrap();
        let mut archive = zip::ZipArchive::new(zip_file).unwrap();
        assert_eq!(archive.len(), 3);
        assert!(archive.by_name("diagnostics.json").is_ok());
    }
}
