use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three canonical operational metrics tracked per covered entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[serde(rename = "negative_accum_count")]
    NegativeAccumulation,
    #[serde(rename = "match_rate_percent")]
    MatchRate,
    #[serde(rename = "referral_capture_rate_percent")]
    ReferralCapture,
}

/// Which end of the scale carries the risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskDirection {
    HigherIsRiskier,
    LowerIsRiskier,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::NegativeAccumulation,
        MetricKind::MatchRate,
        MetricKind::ReferralCapture,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            MetricKind::NegativeAccumulation => "negative_accum_count",
            MetricKind::MatchRate => "match_rate_percent",
            MetricKind::ReferralCapture => "referral_capture_rate_percent",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKind::NegativeAccumulation => "Negative Accumulation Count",
            MetricKind::MatchRate => "Match Rate %",
            MetricKind::ReferralCapture => "Referral Capture Rate %",
        }
    }

    pub fn category_name(&self) -> &'static str {
        match self {
            MetricKind::NegativeAccumulation => "Negative Accumulation Risk",
            MetricKind::MatchRate => "Match Rate Risk",
            MetricKind::ReferralCapture => "Referral Capture Risk",
        }
    }

    pub fn direction(&self) -> RiskDirection {
        match self {
            MetricKind::NegativeAccumulation => RiskDirection::HigherIsRiskier,
            MetricKind::MatchRate | MetricKind::ReferralCapture => RiskDirection::LowerIsRiskier,
        }
    }

    /// Percentages are capped at 100; counts are unbounded.
    pub fn ceiling(&self) -> Option<f64> {
        match self {
            MetricKind::NegativeAccumulation => None,
            MetricKind::MatchRate | MetricKind::ReferralCapture => Some(100.0),
        }
    }

    /// Resolves a category name or metric key, ignoring case and punctuation.
    pub fn from_name(name: &str) -> Option<MetricKind> {
        let wanted = normalize_name(name);
        MetricKind::ALL.into_iter().find(|kind| {
            wanted == normalize_name(kind.category_name())
                || wanted == normalize_name(kind.key())
                || wanted == normalize_name(kind.display_name())
        })
    }
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One customer's operational snapshot for a reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMetric {
    pub customer_id: String,
    /// 1-based data row in the metrics source; fixes report ordering.
    pub source_row: usize,
    pub negative_accum_count: u32,
    pub match_rate_percent: f64,
    pub referral_capture_rate_percent: f64,
}

impl CustomerMetric {
    pub fn new(
        customer_id: impl Into<String>,
        source_row: usize,
        negative_accum_count: u32,
        match_rate_percent: f64,
        referral_capture_rate_percent: f64,
    ) -> std::result::Result<Self, String> {
        let customer_id = customer_id.into();
        if customer_id.trim().is_empty() {
            return Err("customer identifier is empty".to_string());
        }
        check_percentage(MetricKind::MatchRate, match_rate_percent)?;
        check_percentage(MetricKind::ReferralCapture, referral_capture_rate_percent)?;

        Ok(Self {
            customer_id,
            source_row,
            negative_accum_count,
            match_rate_percent,
            referral_capture_rate_percent,
        })
    }

    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::NegativeAccumulation => f64::from(self.negative_accum_count),
            MetricKind::MatchRate => self.match_rate_percent,
            MetricKind::ReferralCapture => self.referral_capture_rate_percent,
        }
    }
}

fn check_percentage(kind: MetricKind, value: f64) -> std::result::Result<(), String> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(format!("{} must be between 0 and 100, got {}", kind.key(), value));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => f.write_str("Low"),
            RiskLevel::Medium => f.write_str("Medium"),
            RiskLevel::High => f.write_str("High"),
        }
    }
}

/// `[floor, lower_edge, upper_edge]`, ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub floor: f64,
    pub lower_edge: f64,
    pub upper_edge: f64,
}

impl Thresholds {
    pub fn from_slice(values: &[f64]) -> std::result::Result<Self, String> {
        let [floor, lower_edge, upper_edge] = values else {
            return Err(format!("expected 3 threshold boundaries, got {}", values.len()));
        };
        if values.iter().any(|v| !v.is_finite()) {
            return Err("threshold boundaries must be finite".to_string());
        }
        if !(floor <= lower_edge && lower_edge <= upper_edge) {
            return Err(format!(
                "threshold boundaries must be ascending, got [{}, {}, {}]",
                floor, lower_edge, upper_edge
            ));
        }
        Ok(Self {
            floor: *floor,
            lower_edge: *lower_edge,
            upper_edge: *upper_edge,
        })
    }
}

/// A numeric interval; `upper = None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub lower: f64,
    pub lower_inclusive: bool,
    pub upper: Option<f64>,
    pub upper_inclusive: bool,
}

impl Band {
    pub fn contains(&self, value: f64) -> bool {
        let above = if self.lower_inclusive {
            value >= self.lower
        } else {
            value > self.lower
        };
        let below = match self.upper {
            None => true,
            Some(upper) if self.upper_inclusive => value <= upper,
            Some(upper) => value < upper,
        };
        above && below
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.lower_inclusive { '[' } else { '(' };
        match self.upper {
            None => write!(f, "{}{}, ∞)", open, self.lower),
            Some(upper) => {
                let close = if self.upper_inclusive { ']' } else { ')' };
                write!(f, "{}{}, {}{}", open, self.lower, upper, close)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDefinition {
    pub name: String,
    pub metric: MetricKind,
    pub thresholds: Thresholds,
    pub description: String,
}

impl RiskDefinition {
    pub fn new(
        metric: MetricKind,
        name: impl Into<String>,
        thresholds: Thresholds,
        description: impl Into<String>,
    ) -> std::result::Result<Self, String> {
        if let Some(ceiling) = metric.ceiling() {
            if thresholds.upper_edge > ceiling {
                return Err(format!(
                    "upper edge {} exceeds the {} ceiling of {}",
                    thresholds.upper_edge,
                    metric.key(),
                    ceiling
                ));
            }
        }
        Ok(Self {
            name: name.into(),
            metric,
            thresholds,
            description: description.into(),
        })
    }

    pub fn band(&self, level: RiskLevel) -> Band {
        let t = &self.thresholds;
        match (self.metric.direction(), level) {
            (RiskDirection::HigherIsRiskier, RiskLevel::Low) => Band {
                lower: t.floor,
                lower_inclusive: true,
                upper: Some(t.lower_edge),
                upper_inclusive: true,
            },
            (RiskDirection::HigherIsRiskier, RiskLevel::Medium) => Band {
                lower: t.lower_edge,
                lower_inclusive: false,
                upper: Some(t.upper_edge),
                upper_inclusive: true,
            },
            (RiskDirection::HigherIsRiskier, RiskLevel::High) => Band {
                lower: t.upper_edge,
                lower_inclusive: false,
                upper: None,
                upper_inclusive: false,
            },
            (RiskDirection::LowerIsRiskier, RiskLevel::High) => Band {
                lower: t.floor,
                lower_inclusive: true,
                upper: Some(t.lower_edge),
                upper_inclusive: false,
            },
            (RiskDirection::LowerIsRiskier, RiskLevel::Medium) => Band {
                lower: t.lower_edge,
                lower_inclusive: true,
                upper: Some(t.upper_edge),
                upper_inclusive: true,
            },
            (RiskDirection::LowerIsRiskier, RiskLevel::Low) => Band {
                lower: t.upper_edge,
                lower_inclusive: false,
                upper: self.metric.ceiling(),
                upper_inclusive: true,
            },
        }
    }

    /// Assigns a risk level. Depends only on `value` and the thresholds.
    ///
    /// Values below the floor fall in the lowest band, whose lower bound is
    /// extended down to the value so the reported band always contains it.
    pub fn classify(&self, value: f64) -> (RiskLevel, Band) {
        let t = &self.thresholds;
        let level = match self.metric.direction() {
            RiskDirection::HigherIsRiskier => {
                if value <= t.lower_edge {
                    RiskLevel::Low
                } else if value <= t.upper_edge {
                    RiskLevel::Medium
                } else {
                    RiskLevel::High
                }
            }
            RiskDirection::LowerIsRiskier => {
                if value < t.lower_edge {
                    RiskLevel::High
                } else if value <= t.upper_edge {
                    RiskLevel::Medium
                } else {
                    RiskLevel::Low
                }
            }
        };
        let mut band = self.band(level);
        if value < band.lower {
            band.lower = value;
            band.lower_inclusive = true;
        }
        (level, band)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub metric: MetricKind,
    pub category: String,
    pub value: f64,
    pub level: RiskLevel,
    pub band: Band,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRiskReport {
    pub customer_id: String,
    pub source_row: usize,
    pub findings: Vec<RiskFinding>,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
}

impl CustomerRiskReport {
    pub fn from_findings(customer_id: String, source_row: usize, findings: Vec<RiskFinding>) -> Self {
        let tally = |level: RiskLevel| findings.iter().filter(|f| f.level == level).count();
        let (high_count, medium_count, low_count) =
            (tally(RiskLevel::High), tally(RiskLevel::Medium), tally(RiskLevel::Low));
        Self {
            customer_id,
            source_row,
            findings,
            high_count,
            medium_count,
            low_count,
        }
    }

    pub fn highest_level(&self) -> Option<RiskLevel> {
        self.findings.iter().map(|f| f.level).max()
    }

    pub fn finding(&self, metric: MetricKind) -> Option<&RiskFinding> {
        self.findings.iter().find(|f| f.metric == metric)
    }
}

/// A single text snippet returned by a search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub snippet: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSection {
    pub label: String,
    pub query: String,
    pub entries: Vec<SearchHit>,
}

impl ContextSection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryContext {
    pub general_updates: ContextSection,
    pub hrsa_guidance: ContextSection,
    pub captured_at: DateTime<Utc>,
}

impl RegulatoryContext {
    pub fn sections(&self) -> [&ContextSection; 2] {
        [&self.general_updates, &self.hrsa_guidance]
    }

    /// Labelled plain-text rendition, used for prompts and text reports.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for section in self.sections() {
            out.push_str(&format!("{} (query: {})\n", section.label, section.query));
            if section.is_empty() {
                out.push_str("  (no results)\n");
            }
            for hit in &section.entries {
                out.push_str(&format!("  - {} [{}]\n", hit.snippet, hit.source));
            }
        }
        out
    }
}

/// Controller stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RetrieveMetrics,
    LoadCatalog,
    EvaluateRisks,
    SearchRegulations,
    SearchGuidance,
    GenerateNarrative,
    AssembleReport,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::RetrieveMetrics => "retrieve_metrics",
            Stage::LoadCatalog => "load_catalog",
            Stage::EvaluateRisks => "evaluate_risks",
            Stage::SearchRegulations => "search_regulations",
            Stage::SearchGuidance => "search_guidance",
            Stage::GenerateNarrative => "generate_narrative",
            Stage::AssembleReport => "assemble_report",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Stage::RetrieveMetrics => "retrieving customer metrics",
            Stage::LoadCatalog => "loading risk definitions",
            Stage::EvaluateRisks => "evaluating customer risks",
            Stage::SearchRegulations => "searching regulatory updates",
            Stage::SearchGuidance => "searching HRSA guidance",
            Stage::GenerateNarrative => "generating the executive summary",
            Stage::AssembleReport => "assembling the report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedMetricRecord,
    UnknownRiskCategory,
    InvalidRiskDefinition,
    MissingRiskCategory,
    IncompleteMetricSet,
    NarrativeFallback,
}

/// A recoverable problem recorded during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    /// Row label, customer id or category name the diagnostic refers to.
    pub subject: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, kind: DiagnosticKind, subject: Option<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            subject,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Generated,
    Fallback,
}

/// Final output of a successful run. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub executive_summary: String,
    pub summary_source: SummarySource,
    pub customer_reports: Vec<CustomerRiskReport>,
    pub regulatory_context: RegulatoryContext,
    pub diagnostics: Vec<Diagnostic>,
    pub generated_at: DateTime<Utc>,
}

impl ComplianceReport {
    pub fn high_risk_customers(&self) -> Vec<&str> {
        self.customer_reports
            .iter()
            .filter(|r| r.high_count > 0)
            .map(|r| r.customer_id.as_str())
            .collect()
    }

    /// Rows and customers that could not be (fully) evaluated.
    pub fn unevaluable_subjects(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| {
                matches!(
                    d.kind,
                    DiagnosticKind::MalformedMetricRecord | DiagnosticKind::IncompleteMetricSet
                )
            })
            .collect()
    }
}
