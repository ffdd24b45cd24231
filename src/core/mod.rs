pub mod catalog;
pub mod context;
pub mod controller;
pub mod evaluator;
pub mod ingest;
pub mod report;

pub use crate::domain::model::{ComplianceReport, CustomerMetric, CustomerRiskReport};
pub use crate::domain::ports::{KnowledgeSource, MetricsSource, NarrativeGenerator, SearchClient, Storage};
pub use crate::utils::error::Result;
