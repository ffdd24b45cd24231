use crate::domain::model::{CustomerRiskReport, RegulatoryContext, SearchHit};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// A risk definition as delivered by a knowledge source, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDefinitionRecord {
    pub name: String,
    pub thresholds: Vec<f64>,
    #[serde(default)]
    pub description: String,
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Tabular text, one customer per row.
    async fn fetch_raw_metrics(&self) -> Result<String>;
}

#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn fetch_risk_definitions(&self) -> Result<Vec<RiskDefinitionRecord>>;
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn summarize(
        &self,
        customer_reports: &[CustomerRiskReport],
        context: &RegulatoryContext,
    ) -> Result<String>;
}
