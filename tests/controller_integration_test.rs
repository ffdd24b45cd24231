use async_trait::async_trait;
use compliance_etl::core::controller::DEFAULT_REGULATORY_QUERY;
use compliance_etl::domain::ports::RiskDefinitionRecord;
use compliance_etl::{
    Collaborators, ComplianceError, ControllerSettings, CustomerRiskReport, DiagnosticKind,
    KnowledgeSource, MetricKind, MetricsSource, NarrativeGenerator, PipelineController,
    RegulatoryContext, RiskCatalog, RiskLevel, RunState, SearchClient, SearchHit, Stage,
    SummarySource,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const METRICS: &str = "customer_id,negative_accum_count,match_rate_percent,referral_capture_rate_percent
CE001,2,95,80
CE002,20,60,30
CE003,10,80,50
CE004,0,100,100
";

struct StaticMetrics(Result<String, String>);

#[async_trait]
impl MetricsSource for StaticMetrics {
    async fn fetch_raw_metrics(&self) -> compliance_etl::Result<String> {
        self.0
            .clone()
            .map_err(|e| ComplianceError::collaborator("metrics source", e))
    }
}

struct StaticKnowledge(Vec<RiskDefinitionRecord>);

#[async_trait]
impl KnowledgeSource for StaticKnowledge {
    async fn fetch_risk_definitions(&self) -> compliance_etl::Result<Vec<RiskDefinitionRecord>> {
        Ok(self.0.clone())
    }
}

/// Records every query and answers with a fixed result set.
struct RecordingSearch {
    hits: Vec<SearchHit>,
    fail: bool,
    queries: Mutex<Vec<String>>,
}

impl RecordingSearch {
    fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            fail: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            hits: vec![],
            fail: true,
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SearchClient for RecordingSearch {
    async fn search(&self, query: &str) -> compliance_etl::Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(ComplianceError::collaborator("web search", "connection refused"));
        }
        Ok(self.hits.clone())
    }
}

enum NarrativeBehavior {
    Text(&'static str),
    Fail,
}

struct ScriptedNarrative {
    behavior: NarrativeBehavior,
    calls: AtomicUsize,
}

impl ScriptedNarrative {
    fn new(behavior: NarrativeBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NarrativeGenerator for ScriptedNarrative {
    async fn summarize(
        &self,
        _customer_reports: &[CustomerRiskReport],
        _context: &RegulatoryContext,
    ) -> compliance_etl::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            NarrativeBehavior::Text(text) => Ok(text.to_string()),
            NarrativeBehavior::Fail => Err(ComplianceError::collaborator("llm", "HTTP 503")),
        }
    }
}

fn hit(snippet: &str) -> SearchHit {
    SearchHit {
        snippet: snippet.to_string(),
        source: "hrsa.gov".to_string(),
    }
}

struct Harness {
    metrics: Result<String, String>,
    definitions: Vec<RiskDefinitionRecord>,
    regulatory: Arc<RecordingSearch>,
    guidance: Arc<RecordingSearch>,
    narrative: Arc<ScriptedNarrative>,
    workers: usize,
}

impl Harness {
    fn new() -> Self {
        Self {
            metrics: Ok(METRICS.to_string()),
            definitions: RiskCatalog::standard_records(),
            regulatory: Arc::new(RecordingSearch::returning(vec![hit("Audit cycle expanded")])),
            guidance: Arc::new(RecordingSearch::returning(vec![hit("Keep auditable records")])),
            narrative: Arc::new(ScriptedNarrative::new(NarrativeBehavior::Text(
                "CE002 shows High risk on all three metrics.",
            ))),
            workers: 4,
        }
    }

    fn controller(&self) -> PipelineController {
        let collaborators = Collaborators {
            metrics_source: Arc::new(StaticMetrics(self.metrics.clone())),
            knowledge_source: Arc::new(StaticKnowledge(self.definitions.clone())),
            regulatory_search: self.regulatory.clone(),
            guidance_search: self.guidance.clone(),
            narrative: self.narrative.clone(),
        };
        PipelineController::new(
            collaborators,
            ControllerSettings {
                evaluation_workers: self.workers,
                ..ControllerSettings::default()
            },
        )
    }
}

#[tokio::test]
async fn test_full_run_reaches_done() {
    let harness = Harness::new();
    let outcome = harness.controller().run().await;

    assert_eq!(outcome.state, RunState::Done);
    assert_eq!(outcome.stages.len(), 7);
    assert!(outcome.stages.iter().all(|s| s.succeeded));
    assert!(outcome.diagnostics.is_empty());

    let report = outcome.report.expect("report for a completed run");
    let ids: Vec<&str> = report
        .customer_reports
        .iter()
        .map(|r| r.customer_id.as_str())
        .collect();
    assert_eq!(ids, vec!["CE001", "CE002", "CE003", "CE004"]);
    assert_eq!(report.executive_summary, "CE002 shows High risk on all three metrics.");
    assert_eq!(report.summary_source, SummarySource::Generated);
    assert_eq!(report.high_risk_customers(), vec!["CE002"]);

    let ce003 = &report.customer_reports[2];
    assert_eq!(ce003.finding(MetricKind::NegativeAccumulation).unwrap().level, RiskLevel::Medium);
    assert_eq!(ce003.finding(MetricKind::MatchRate).unwrap().level, RiskLevel::Medium);
    assert_eq!(ce003.finding(MetricKind::ReferralCapture).unwrap().level, RiskLevel::Medium);

    assert_eq!(report.regulatory_context.general_updates.entries[0].snippet, "Audit cycle expanded");
    assert_eq!(
        harness.regulatory.queries.lock().unwrap().as_slice(),
        &[DEFAULT_REGULATORY_QUERY.to_string()]
    );
    assert_eq!(harness.narrative.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_row_is_reported_and_others_evaluated() {
    let mut harness = Harness::new();
    harness.metrics = Ok("CE001,2,95,80\nCE002,20,n/a,30\nCE003,10,80,50\n".to_string());

    let outcome = harness.controller().run().await;
    assert!(outcome.is_success());

    let report = outcome.report.unwrap();
    let ids: Vec<&str> = report
        .customer_reports
        .iter()
        .map(|r| r.customer_id.as_str())
        .collect();
    assert_eq!(ids, vec!["CE001", "CE003"]);

    let unevaluable = report.unevaluable_subjects();
    assert_eq!(unevaluable.len(), 1);
    assert_eq!(unevaluable[0].kind, DiagnosticKind::MalformedMetricRecord);
    assert_eq!(unevaluable[0].stage, Stage::RetrieveMetrics);
    assert_eq!(unevaluable[0].subject.as_deref(), Some("row 2"));
}

#[tokio::test]
async fn test_empty_search_results_still_complete() {
    let mut harness = Harness::new();
    harness.regulatory = Arc::new(RecordingSearch::returning(vec![]));
    harness.guidance = Arc::new(RecordingSearch::returning(vec![]));

    let outcome = harness.controller().run().await;
    assert_eq!(outcome.state, RunState::Done);

    let context = outcome.report.unwrap().regulatory_context;
    assert!(context.general_updates.is_empty());
    assert!(context.hrsa_guidance.is_empty());
}

#[tokio::test]
async fn test_partial_catalog_marks_customers_incomplete() {
    let mut harness = Harness::new();
    harness.definitions.retain(|d| d.name != "Referral Capture Risk");

    let outcome = harness.controller().run().await;
    assert!(outcome.is_success());

    let missing: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::MissingRiskCategory)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].subject.as_deref(), Some("Referral Capture Risk"));

    let incomplete: Vec<_> = outcome
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::IncompleteMetricSet)
        .collect();
    assert_eq!(incomplete.len(), 4);

    let report = outcome.report.unwrap();
    assert!(report
        .customer_reports
        .iter()
        .all(|r| r.findings.len() == 2 && r.finding(MetricKind::ReferralCapture).is_none()));
}

#[tokio::test]
async fn test_unknown_category_is_skipped() {
    let mut harness = Harness::new();
    harness.definitions.push(RiskDefinitionRecord {
        name: "Inventory Shrinkage Risk".to_string(),
        thresholds: vec![0.0, 1.0, 2.0],
        description: String::new(),
    });

    let outcome = harness.controller().run().await;
    assert!(outcome.is_success());
    assert!(outcome
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::UnknownRiskCategory
            && d.subject.as_deref() == Some("Inventory Shrinkage Risk")));
    assert_eq!(outcome.report.unwrap().customer_reports[0].findings.len(), 3);
}

#[tokio::test]
async fn test_repeated_runs_produce_identical_customer_reports() {
    let harness = Harness::new();
    let first = harness.controller().run().await.into_result().unwrap();
    let second = harness.controller().run().await.into_result().unwrap();

    assert_eq!(first.customer_reports, second.customer_reports);
}

#[tokio::test]
async fn test_worker_count_does_not_change_results() {
    let mut sequential = Harness::new();
    sequential.workers = 1;
    let mut parallel = Harness::new();
    parallel.workers = 8;

    let a = sequential.controller().run().await.into_result().unwrap();
    let b = parallel.controller().run().await.into_result().unwrap();
    assert_eq!(a.customer_reports, b.customer_reports);
}

#[tokio::test]
async fn test_narrative_failure_falls_back_to_template() {
    let mut harness = Harness::new();
    harness.narrative = Arc::new(ScriptedNarrative::new(NarrativeBehavior::Fail));

    let outcome = harness.controller().run().await;
    assert_eq!(outcome.state, RunState::Done);

    let report = outcome.report.unwrap();
    assert_eq!(report.summary_source, SummarySource::Fallback);
    assert!(report.executive_summary.starts_with("Evaluated 4 customer(s)"));
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::NarrativeFallback && d.stage == Stage::GenerateNarrative));
}

#[tokio::test]
async fn test_blank_narrative_falls_back_to_template() {
    let mut harness = Harness::new();
    harness.narrative = Arc::new(ScriptedNarrative::new(NarrativeBehavior::Text("   ")));

    let report = harness.controller().run().await.into_result().unwrap();
    assert_eq!(report.summary_source, SummarySource::Fallback);
}

#[tokio::test]
async fn test_metrics_source_failure_stops_run() {
    let mut harness = Harness::new();
    harness.metrics = Err("knowledge base timed out".to_string());

    let outcome = harness.controller().run().await;
    let (stage, cause) = outcome.failure().expect("failed run");
    assert_eq!(stage, Stage::RetrieveMetrics);
    assert!(cause.contains("knowledge base timed out"));
    assert!(outcome.report.is_none());
    assert_eq!(outcome.stages.len(), 1);
    assert_eq!(harness.narrative.calls.load(Ordering::SeqCst), 0);

    match outcome.into_result() {
        Err(ComplianceError::StageFailed { stage, .. }) => assert_eq!(stage, Stage::RetrieveMetrics),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_no_usable_rows_fails_retrieval() {
    let mut harness = Harness::new();
    harness.metrics = Ok("customer_id,negative_accum_count,match_rate_percent,referral_capture_rate_percent\n".to_string());

    let outcome = harness.controller().run().await;
    assert_eq!(outcome.failure().map(|(s, _)| s), Some(Stage::RetrieveMetrics));
}

#[tokio::test]
async fn test_empty_catalog_fails_at_load() {
    let mut harness = Harness::new();
    harness.definitions.clear();

    let outcome = harness.controller().run().await;
    assert_eq!(outcome.failure().map(|(s, _)| s), Some(Stage::LoadCatalog));
    assert!(outcome.report.is_none());
}

#[tokio::test]
async fn test_search_failure_stops_run() {
    let mut harness = Harness::new();
    harness.guidance = Arc::new(RecordingSearch::failing());

    let outcome = harness.controller().run().await;
    assert_eq!(outcome.failure().map(|(s, _)| s), Some(Stage::SearchGuidance));
    assert_eq!(harness.narrative.calls.load(Ordering::SeqCst), 0);

    let summary = outcome.execution_summary();
    assert_eq!(summary["state"], "failed at search_guidance");
    assert_eq!(summary["stages_executed"].as_array().unwrap().len(), 5);
}
