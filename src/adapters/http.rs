use crate::adapters::file::parse_json_definitions;
use crate::domain::model::{CustomerRiskReport, RegulatoryContext, RiskFinding, RiskLevel, SearchHit};
use crate::domain::ports::{
    KnowledgeSource, MetricsSource, NarrativeGenerator, RiskDefinitionRecord, SearchClient,
};
use crate::utils::error::{ComplianceError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 500;

/// Endpoint plus the request settings every HTTP collaborator shares.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(Duration::from_secs(self.timeout_seconds));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

/// GETs the metrics table as plain text.
pub struct HttpMetricsSource {
    client: Client,
    endpoint: HttpEndpoint,
}

impl HttpMetricsSource {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn fetch_raw_metrics(&self) -> Result<String> {
        tracing::debug!("Making metrics request to: {}", self.endpoint.url);
        let response = self
            .endpoint
            .decorate(self.client.get(&self.endpoint.url))
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!("Metrics response status: {}", response.status());
        Ok(response.text().await?)
    }
}

/// GETs risk definitions as JSON (bare list or `{"definitions": [...]}`).
pub struct HttpKnowledgeSource {
    client: Client,
    endpoint: HttpEndpoint,
}

impl HttpKnowledgeSource {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl KnowledgeSource for HttpKnowledgeSource {
    async fn fetch_risk_definitions(&self) -> Result<Vec<RiskDefinitionRecord>> {
        tracing::debug!("Making knowledge request to: {}", self.endpoint.url);
        let response = self
            .endpoint
            .decorate(self.client.get(&self.endpoint.url))
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        parse_json_definitions(&body)
    }
}

#[derive(Debug, Deserialize)]
struct WireHit {
    #[serde(default, alias = "body", alias = "content", alias = "text")]
    snippet: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "url", alias = "href", alias = "link")]
    source: Option<String>,
}

impl WireHit {
    /// Falls back to the title when the hit carries no body text; `None` when both are blank.
    fn into_hit(self) -> Option<SearchHit> {
        let snippet = [self.snippet, self.title]
            .into_iter()
            .flatten()
            .map(|text| text.trim().to_string())
            .find(|text| !text.is_empty())?;
        Some(SearchHit {
            snippet,
            source: self.source.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchPayload {
    List(Vec<WireHit>),
    Wrapped { results: Vec<WireHit> },
}

/// Web search over a JSON API: `GET {url}?q={query}`.
pub struct HttpSearchClient {
    client: Client,
    endpoint: HttpEndpoint,
    max_results: usize,
}

impl HttpSearchClient {
    pub fn new(endpoint: HttpEndpoint) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            max_results: 5,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        tracing::debug!("Searching '{}' via {}", query, self.endpoint.url);
        let request = self
            .client
            .get(&self.endpoint.url)
            .query(&[("q", query)]);
        let response = self
            .endpoint
            .decorate(request)
            .send()
            .await?
            .error_for_status()?;

        let hits = match response.json::<SearchPayload>().await? {
            SearchPayload::List(hits) => hits,
            SearchPayload::Wrapped { results } => results,
        };

        Ok(hits
            .into_iter()
            .filter_map(WireHit::into_hit)
            .take(self.max_results)
            .collect())
    }
}

/// Chat-completions client for the executive summary.
pub struct HttpNarrativeGenerator {
    client: Client,
    endpoint: HttpEndpoint,
    model: String,
    temperature: f64,
    max_context_chars: usize,
}

impl HttpNarrativeGenerator {
    pub fn new(endpoint: HttpEndpoint, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            model: model.into(),
            temperature: 0.0,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[async_trait]
impl NarrativeGenerator for HttpNarrativeGenerator {
    async fn summarize(
        &self,
        customer_reports: &[CustomerRiskReport],
        context: &RegulatoryContext,
    ) -> Result<String> {
        let prompt = build_prompt(customer_reports, context, self.max_context_chars)?;
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        tracing::debug!(
            "Requesting summary from {} (model {})",
            self.endpoint.url,
            self.model
        );
        let response = self
            .endpoint
            .decorate(self.client.post(&self.endpoint.url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let completion: ChatCompletion = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ComplianceError::collaborator("narrative generator", "response contained no choices")
            })
    }
}

/// Prompt for the executive summary: the risk definitions behind the
/// findings, high-risk count, the customer reports as JSON, and the
/// regulatory context cut to `max_context_chars`.
pub fn build_prompt(
    customer_reports: &[CustomerRiskReport],
    context: &RegulatoryContext,
    max_context_chars: usize,
) -> Result<String> {
    let high_risk = customer_reports.iter().filter(|r| r.high_count > 0).count();
    let details = serde_json::to_string_pretty(customer_reports)?;
    let context_text = truncate_chars(&context.to_text(), max_context_chars);

    Ok(format!(
        "Based on the following compliance analysis, generate a brief executive summary:\n\n\
         Knowledge Base:\n{}\n\n\
         High-Risk Customers: {}\n\n\
         Details:\n{}\n\n\
         Recent Regulatory Context:\n{}\n\n\
         Provide a 2-3 sentence summary highlighting the most critical risks detected.",
        knowledge_excerpt(customer_reports),
        high_risk,
        details,
        context_text
    ))
}

/// One entry per risk category seen in the findings: its description and
/// the threshold band of every level it produced.
fn knowledge_excerpt(customer_reports: &[CustomerRiskReport]) -> String {
    let mut categories: Vec<(&RiskFinding, BTreeMap<RiskLevel, String>)> = Vec::new();
    for finding in customer_reports.iter().flat_map(|r| &r.findings) {
        let position = match categories.iter().position(|(f, _)| f.category == finding.category) {
            Some(position) => position,
            None => {
                categories.push((finding, BTreeMap::new()));
                categories.len() - 1
            }
        };
        categories[position]
            .1
            .entry(finding.level)
            .or_insert_with(|| finding.band.to_string());
    }

    if categories.is_empty() {
        return "No risk definitions were applied.".to_string();
    }

    categories
        .into_iter()
        .map(|(finding, bands)| {
            let bands = bands
                .iter()
                .map(|(level, band)| format!("{} {}", level, band))
                .collect::<Vec<_>>()
                .join(", ");
            if finding.explanation.is_empty() {
                format!("- {} ({})", finding.category, bands)
            } else {
                format!("- {}: {} ({})", finding.category, finding.explanation, bands)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
