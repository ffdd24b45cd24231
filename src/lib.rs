pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::cli::LocalStorage;
#[cfg(feature = "s3")]
pub use config::s3::S3Storage;
pub use config::toml_config::TomlConfig;
pub use core::catalog::RiskCatalog;
pub use core::controller::{
    Collaborators, ControllerSettings, PipelineController, RunOutcome, RunState,
};
pub use domain::model::{
    ComplianceReport, CustomerMetric, CustomerRiskReport, Diagnostic, DiagnosticKind, MetricKind,
    RegulatoryContext, RiskFinding, RiskLevel, SearchHit, Stage, SummarySource,
};
pub use domain::ports::{KnowledgeSource, MetricsSource, NarrativeGenerator, SearchClient, Storage};
pub use utils::error::{ComplianceError, Result};
