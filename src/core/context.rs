use crate::domain::model::{ContextSection, RegulatoryContext, SearchHit};
use chrono::{DateTime, Utc};

pub const GENERAL_UPDATES_LABEL: &str = "General regulatory updates";
pub const HRSA_GUIDANCE_LABEL: &str = "HRSA guidance";

/// Search queries and results for one run.
#[derive(Debug, Clone, Default)]
pub struct ContextInputs {
    pub regulatory_query: String,
    pub regulatory_hits: Vec<SearchHit>,
    pub guidance_query: String,
    pub guidance_hits: Vec<SearchHit>,
}

/// Labels both result sets and stamps the capture time. Empty result sets
/// produce empty sections; they never fail the run.
pub fn aggregate(inputs: ContextInputs, captured_at: DateTime<Utc>) -> RegulatoryContext {
    if inputs.regulatory_hits.is_empty() {
        tracing::warn!("⚠️ No regulatory update results for '{}'", inputs.regulatory_query);
    }
    if inputs.guidance_hits.is_empty() {
        tracing::warn!("⚠️ No HRSA guidance results for '{}'", inputs.guidance_query);
    }

    RegulatoryContext {
        general_updates: ContextSection {
            label: GENERAL_UPDATES_LABEL.to_string(),
            query: inputs.regulatory_query,
            entries: inputs.regulatory_hits,
        },
        hrsa_guidance: ContextSection {
            label: HRSA_GUIDANCE_LABEL.to_string(),
            query: inputs.guidance_query,
            entries: inputs.guidance_hits,
        },
        captured_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(snippet: &str, source: &str) -> SearchHit {
        SearchHit {
            snippet: snippet.to_string(),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_aggregate_preserves_attribution() {
        let now = Utc::now();
        let context = aggregate(
            ContextInputs {
                regulatory_query: "340B program compliance".to_string(),
                regulatory_hits: vec![hit("Audit cycle expanded", "hrsa.gov")],
                guidance_query: "HRSA 340B guidance".to_string(),
                guidance_hits: vec![hit("Maintain auditable records", "340b.hrsa.gov")],
            },
            now,
        );

        assert_eq!(context.general_updates.label, GENERAL_UPDATES_LABEL);
        assert_eq!(context.general_updates.entries[0].source, "hrsa.gov");
        assert_eq!(context.hrsa_guidance.query, "HRSA 340B guidance");
        assert_eq!(context.captured_at, now);

        let text = context.to_text();
        assert!(text.contains("- Audit cycle expanded [hrsa.gov]"));
        assert!(text.contains("HRSA guidance (query: HRSA 340B guidance)"));
    }

    #[test]
    fn test_empty_results_produce_empty_sections() {
        let context = aggregate(
            ContextInputs {
                regulatory_query: "q1".to_string(),
                guidance_query: "q2".to_string(),
                ..Default::default()
            },
            Utc::now(),
        );

        assert!(context.general_updates.is_empty());
        assert!(context.hrsa_guidance.is_empty());
        assert_eq!(context.to_text().matches("(no results)").count(), 2);
    }
}
