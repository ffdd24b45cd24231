use crate::core::catalog::RiskCatalog;
use crate::core::context::{aggregate, ContextInputs};
use crate::core::evaluator::evaluate_all;
use crate::core::ingest::ingest;
use crate::core::report::{assemble, fallback_summary};
use crate::domain::model::{
    ComplianceReport, CustomerMetric, CustomerRiskReport, Diagnostic, DiagnosticKind,
    RegulatoryContext, SearchHit, Stage, SummarySource,
};
use crate::domain::ports::{KnowledgeSource, MetricsSource, NarrativeGenerator, SearchClient};
use crate::utils::error::{ComplianceError, Result};
use crate::utils::monitor::SystemMonitor;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_REGULATORY_QUERY: &str = "340B program compliance risks regulatory updates";
pub const DEFAULT_GUIDANCE_QUERY: &str = "HRSA 340B program guidance negative accumulation match rate referral capture";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Start,
    MetricsRetrieved,
    CatalogLoaded,
    RisksEvaluated,
    RegulationsSearched,
    GuidanceSearched,
    ReportGenerated,
    Done,
    Failed { stage: Stage, cause: String },
}

/// `(from, stage invoked, to)`. Every non-terminal state has exactly one entry.
const TRANSITIONS: [(RunState, Stage, RunState); 7] = [
    (RunState::Start, Stage::RetrieveMetrics, RunState::MetricsRetrieved),
    (RunState::MetricsRetrieved, Stage::LoadCatalog, RunState::CatalogLoaded),
    (RunState::CatalogLoaded, Stage::EvaluateRisks, RunState::RisksEvaluated),
    (RunState::RisksEvaluated, Stage::SearchRegulations, RunState::RegulationsSearched),
    (RunState::RegulationsSearched, Stage::SearchGuidance, RunState::GuidanceSearched),
    (RunState::GuidanceSearched, Stage::GenerateNarrative, RunState::ReportGenerated),
    (RunState::ReportGenerated, Stage::AssembleReport, RunState::Done),
];

impl RunState {
    /// The stage to run next and the state it leads to, or `None` when terminal.
    pub fn next(&self) -> Option<(Stage, RunState)> {
        TRANSITIONS
            .iter()
            .find(|(from, _, _)| from == self)
            .map(|(_, stage, to)| (*stage, to.clone()))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}

/// External services the controller calls, one per boundary.
#[derive(Clone)]
pub struct Collaborators {
    pub metrics_source: Arc<dyn MetricsSource>,
    pub knowledge_source: Arc<dyn KnowledgeSource>,
    pub regulatory_search: Arc<dyn SearchClient>,
    pub guidance_search: Arc<dyn SearchClient>,
    pub narrative: Arc<dyn NarrativeGenerator>,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub regulatory_query: String,
    pub guidance_query: String,
    pub evaluation_workers: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            regulatory_query: DEFAULT_REGULATORY_QUERY.to_string(),
            guidance_query: DEFAULT_GUIDANCE_QUERY.to_string(),
            evaluation_workers: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: Stage,
    pub duration: Duration,
    pub succeeded: bool,
}

/// Working state shared across stages of one run.
#[derive(Default)]
struct RunContext {
    metrics: Vec<CustomerMetric>,
    catalog: Option<Arc<RiskCatalog>>,
    customer_reports: Vec<CustomerRiskReport>,
    regulatory_hits: Vec<SearchHit>,
    context: Option<RegulatoryContext>,
    summary: Option<(String, SummarySource)>,
    report: Option<ComplianceReport>,
    diagnostics: Vec<Diagnostic>,
}

impl RunContext {
    fn record(&mut self, stage: Stage, error: &ComplianceError) {
        let Some(kind) = error.diagnostic_kind() else {
            return;
        };
        let subject = match error {
            ComplianceError::MalformedMetricRecord { row, .. } => Some(format!("row {}", row)),
            ComplianceError::UnknownRiskCategory { name }
            | ComplianceError::InvalidRiskDefinition { name, .. } => Some(name.clone()),
            ComplianceError::IncompleteMetricSet { customer_id, .. } => Some(customer_id.clone()),
            _ => None,
        };
        self.diagnostics
            .push(Diagnostic::new(stage, kind, subject, error.to_string()));
    }

    fn missing(&self, what: &str) -> ComplianceError {
        ComplianceError::ValidationError {
            message: format!("{} not available in run state", what),
        }
    }
}

/// Result of one run: the terminal state, the report when it reached `Done`,
/// and the diagnostics gathered either way.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub state: RunState,
    pub report: Option<ComplianceReport>,
    pub diagnostics: Vec<Diagnostic>,
    pub stages: Vec<StageRecord>,
    pub customers_evaluated: usize,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done
    }

    pub fn failure(&self) -> Option<(Stage, &str)> {
        match &self.state {
            RunState::Failed { stage, cause } => Some((*stage, cause.as_str())),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<ComplianceReport> {
        match (self.state, self.report) {
            (RunState::Done, Some(report)) => Ok(report),
            (RunState::Failed { stage, cause }, _) => Err(ComplianceError::StageFailed { stage, cause }),
            (state, _) => Err(ComplianceError::ValidationError {
                message: format!("run ended in non-terminal state {:?}", state),
            }),
        }
    }

    pub fn execution_summary(&self) -> serde_json::Value {
        let total: Duration = self.stages.iter().map(|s| s.duration).sum();
        let state = match &self.state {
            RunState::Failed { stage, .. } => format!("failed at {}", stage),
            other => format!("{:?}", other),
        };
        let stages: Vec<&str> = self.stages.iter().map(|s| s.stage.name()).collect();
        serde_json::json!({
            "run_id": self.run_id,
            "state": state,
            "stages_executed": stages,
            "customers_evaluated": self.customers_evaluated,
            "diagnostics": self.diagnostics.len(),
            "total_duration_ms": total.as_millis() as u64,
        })
    }
}

/// Runs the stages in their fixed order, one collaborator or component per
/// transition. A stage error moves the run to `Failed` and stops it.
pub struct PipelineController {
    collaborators: Collaborators,
    settings: ControllerSettings,
    monitor: Option<SystemMonitor>,
}

impl PipelineController {
    pub fn new(collaborators: Collaborators, settings: ControllerSettings) -> Self {
        Self {
            collaborators,
            settings,
            monitor: None,
        }
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub async fn run(&self) -> RunOutcome {
        let run_id = format!("run-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        tracing::info!("🚀 Starting compliance run {}", run_id);

        let mut run = RunContext::default();
        let mut state = RunState::Start;
        let mut stages = Vec::new();

        while let Some((stage, next_state)) = state.next() {
            tracing::info!("=== Stage: {} ===", stage);
            let started = Instant::now();
            let result = self.execute(stage, &mut run).await;
            let duration = started.elapsed();
            stages.push(StageRecord {
                stage,
                duration,
                succeeded: result.is_ok(),
            });

            if let Some(monitor) = &self.monitor {
                monitor.log_stats(stage.name());
            }

            match result {
                Ok(()) => {
                    tracing::debug!("{:?} → {:?} ({:?})", state, next_state, duration);
                    state = next_state;
                }
                Err(e) => {
                    tracing::error!("❌ Stage {} failed: {}", stage, e);
                    state = RunState::Failed {
                        stage,
                        cause: e.to_string(),
                    };
                }
            }
        }

        if state == RunState::Done {
            tracing::info!(
                "✅ Run {} completed with {} diagnostic(s)",
                run_id,
                run.diagnostics.len()
            );
        }

        RunOutcome {
            run_id,
            state,
            report: run.report,
            diagnostics: run.diagnostics,
            stages,
            customers_evaluated: run.customer_reports.len(),
        }
    }

    async fn execute(&self, stage: Stage, run: &mut RunContext) -> Result<()> {
        match stage {
            Stage::RetrieveMetrics => self.retrieve_metrics(run).await,
            Stage::LoadCatalog => self.load_catalog(run).await,
            Stage::EvaluateRisks => self.evaluate_risks(run).await,
            Stage::SearchRegulations => self.search_regulations(run).await,
            Stage::SearchGuidance => self.search_guidance(run).await,
            Stage::GenerateNarrative => self.generate_narrative(run).await,
            Stage::AssembleReport => self.assemble_report(run),
        }
    }

    async fn retrieve_metrics(&self, run: &mut RunContext) -> Result<()> {
        let raw = self
            .collaborators
            .metrics_source
            .fetch_raw_metrics()
            .await
            .map_err(|e| e.attributed_to("metrics source"))?;

        let outcome = ingest(&raw);
        for error in &outcome.rejected {
            tracing::warn!("⚠️ {}", error);
            run.record(Stage::RetrieveMetrics, error);
        }
        if outcome.metrics.is_empty() {
            return Err(ComplianceError::NoUsableRecords {
                rejected: outcome.rejected.len(),
            });
        }

        tracing::info!(
            "📥 Retrieved metrics for {} customers ({} rows rejected)",
            outcome.metrics.len(),
            outcome.rejected.len()
        );
        run.metrics = outcome.metrics;
        Ok(())
    }

    async fn load_catalog(&self, run: &mut RunContext) -> Result<()> {
        let load = RiskCatalog::reload(self.collaborators.knowledge_source.as_ref()).await?;
        for error in &load.rejected {
            run.record(Stage::LoadCatalog, error);
        }
        for metric in &load.missing {
            tracing::warn!("⚠️ Risk category unavailable: {}", metric.category_name());
            run.diagnostics.push(Diagnostic::new(
                Stage::LoadCatalog,
                DiagnosticKind::MissingRiskCategory,
                Some(metric.category_name().to_string()),
                format!(
                    "No definition for {}; {} will not be evaluated",
                    metric.category_name(),
                    metric.key()
                ),
            ));
        }

        tracing::info!("📚 Loaded {} risk definitions", load.catalog.len());
        run.catalog = Some(Arc::new(load.catalog));
        Ok(())
    }

    async fn evaluate_risks(&self, run: &mut RunContext) -> Result<()> {
        let catalog = run.catalog.clone().ok_or_else(|| run.missing("risk catalog"))?;
        let metrics = std::mem::take(&mut run.metrics);

        let evaluations =
            evaluate_all(metrics, catalog, self.settings.evaluation_workers).await?;

        let mut reports = Vec::with_capacity(evaluations.len());
        for evaluation in evaluations {
            if let Some(error) = &evaluation.incomplete {
                run.record(Stage::EvaluateRisks, error);
            }
            reports.push(evaluation.report);
        }
        reports.sort_by_key(|r| r.source_row);

        let high = reports.iter().filter(|r| r.high_count > 0).count();
        tracing::info!(
            "🔎 Evaluated {} customers, {} with High risk findings",
            reports.len(),
            high
        );
        run.customer_reports = reports;
        Ok(())
    }

    async fn search_regulations(&self, run: &mut RunContext) -> Result<()> {
        let query = &self.settings.regulatory_query;
        let hits = self
            .collaborators
            .regulatory_search
            .search(query)
            .await
            .map_err(|e| e.attributed_to("regulatory search"))?;

        tracing::info!("🌐 Regulatory search returned {} results", hits.len());
        run.regulatory_hits = hits;
        Ok(())
    }

    async fn search_guidance(&self, run: &mut RunContext) -> Result<()> {
        let query = &self.settings.guidance_query;
        let hits = self
            .collaborators
            .guidance_search
            .search(query)
            .await
            .map_err(|e| e.attributed_to("guidance search"))?;

        tracing::info!("🌐 Guidance search returned {} results", hits.len());
        run.context = Some(aggregate(
            ContextInputs {
                regulatory_query: self.settings.regulatory_query.clone(),
                regulatory_hits: std::mem::take(&mut run.regulatory_hits),
                guidance_query: query.clone(),
                guidance_hits: hits,
            },
            Utc::now(),
        ));
        Ok(())
    }

    /// Never fails: an unavailable generator degrades to the template summary.
    async fn generate_narrative(&self, run: &mut RunContext) -> Result<()> {
        let context = run.context.as_ref().ok_or_else(|| run.missing("regulatory context"))?;

        let generated = self
            .collaborators
            .narrative
            .summarize(&run.customer_reports, context)
            .await;

        let summary = match generated {
            Ok(text) if !text.trim().is_empty() => (text.trim().to_string(), SummarySource::Generated),
            Ok(_) => {
                self.fall_back(run, "narrative generator returned an empty summary".to_string())
            }
            Err(e) => self.fall_back(run, format!("narrative generator failed: {}", e)),
        };

        run.summary = Some(summary);
        Ok(())
    }

    fn fall_back(&self, run: &mut RunContext, reason: String) -> (String, SummarySource) {
        tracing::warn!("⚠️ {}; using template summary", reason);
        run.diagnostics.push(Diagnostic::new(
            Stage::GenerateNarrative,
            DiagnosticKind::NarrativeFallback,
            None,
            reason,
        ));
        (fallback_summary(&run.customer_reports), SummarySource::Fallback)
    }

    fn assemble_report(&self, run: &mut RunContext) -> Result<()> {
        let context = run.context.take().ok_or_else(|| run.missing("regulatory context"))?;
        let (summary, source) = run.summary.take().ok_or_else(|| run.missing("summary"))?;

        let report = assemble(
            run.customer_reports.clone(),
            context,
            summary,
            source,
            run.diagnostics.clone(),
        );
        tracing::info!(
            "📝 Report generated with {} customer analyses",
            report.customer_reports.len()
        );
        run.report = Some(report);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table_is_linear() {
        let mut state = RunState::Start;
        let mut visited = Vec::new();
        while let Some((stage, next)) = state.next() {
            visited.push(stage);
            state = next;
        }

        assert_eq!(state, RunState::Done);
        assert_eq!(
            visited,
            vec![
                Stage::RetrieveMetrics,
                Stage::LoadCatalog,
                Stage::EvaluateRisks,
                Stage::SearchRegulations,
                Stage::SearchGuidance,
                Stage::GenerateNarrative,
                Stage::AssembleReport,
            ]
        );
    }

    #[test]
    fn test_terminal_states_have_no_next_stage() {
        assert!(RunState::Done.next().is_none());
        let failed = RunState::Failed {
            stage: Stage::LoadCatalog,
            cause: "empty".to_string(),
        };
        assert!(failed.next().is_none());
        assert!(failed.is_terminal());
        assert!(!RunState::CatalogLoaded.is_terminal());
    }

    #[test]
    fn test_collaborator_errors_are_not_rewrapped() {
        let original = ComplianceError::collaborator("web search", "timed out");
        match original.attributed_to("regulatory search") {
            ComplianceError::CollaboratorUnavailable { collaborator, details } => {
                assert_eq!(collaborator, "web search");
                assert_eq!(details, "timed out");
            }
            other => panic!("unexpected {:?}", other),
        }

        let wrapped = ComplianceError::ConfigError {
            message: "bad".to_string(),
        }
        .attributed_to("metrics source");
        assert!(wrapped.to_string().starts_with("Collaborator unavailable (metrics source)"));
    }
}
