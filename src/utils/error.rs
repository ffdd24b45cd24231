use crate::domain::model::{DiagnosticKind, Stage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("Malformed metric record at row {row}: {reason}")]
    MalformedMetricRecord { row: usize, reason: String },

    #[error("Unknown risk category: {name}")]
    UnknownRiskCategory { name: String },

    #[error("Invalid risk definition '{name}': {reason}")]
    InvalidRiskDefinition { name: String, reason: String },

    #[error("Incomplete metric set for customer {customer_id}: no definition for {}", missing.join(", "))]
    IncompleteMetricSet {
        customer_id: String,
        missing: Vec<String>,
    },

    #[error("Collaborator unavailable ({collaborator}): {details}")]
    CollaboratorUnavailable {
        collaborator: String,
        details: String,
    },

    #[error("Risk definition catalog is empty")]
    EmptyCatalog,

    #[error("No usable metric records ({rejected} rows rejected)")]
    NoUsableRecords { rejected: usize },

    #[error("Evaluation task failed: {details}")]
    EvaluationTaskFailed { details: String },

    #[error("Pipeline failed at stage '{stage}': {cause}")]
    StageFailed { stage: Stage, cause: String },

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, ComplianceError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Data,
    Catalog,
    Collaborator,
    Pipeline,
    Io,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ComplianceError {
    pub fn collaborator(collaborator: &str, details: impl std::fmt::Display) -> Self {
        ComplianceError::CollaboratorUnavailable {
            collaborator: collaborator.to_string(),
            details: details.to_string(),
        }
    }

    /// Attributes a failure to `collaborator` unless it already names one.
    pub fn attributed_to(self, collaborator: &str) -> Self {
        match self {
            already @ ComplianceError::CollaboratorUnavailable { .. } => already,
            other => ComplianceError::collaborator(collaborator, other),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ComplianceError::MalformedMetricRecord { .. }
            | ComplianceError::IncompleteMetricSet { .. }
            | ComplianceError::NoUsableRecords { .. }
            | ComplianceError::ValidationError { .. } => ErrorCategory::Data,
            ComplianceError::UnknownRiskCategory { .. }
            | ComplianceError::InvalidRiskDefinition { .. }
            | ComplianceError::EmptyCatalog => ErrorCategory::Catalog,
            ComplianceError::CollaboratorUnavailable { .. } | ComplianceError::ApiError(_) => {
                ErrorCategory::Collaborator
            }
            ComplianceError::EvaluationTaskFailed { .. } | ComplianceError::StageFailed { .. } => {
                ErrorCategory::Pipeline
            }
            ComplianceError::ZipError(_)
            | ComplianceError::IoError(_)
            | ComplianceError::SerializationError(_) => ErrorCategory::Io,
            ComplianceError::ConfigError { .. }
            | ComplianceError::ConfigValidationError { .. }
            | ComplianceError::InvalidConfigValueError { .. }
            | ComplianceError::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ComplianceError::MalformedMetricRecord { .. }
            | ComplianceError::UnknownRiskCategory { .. }
            | ComplianceError::InvalidRiskDefinition { .. }
            | ComplianceError::IncompleteMetricSet { .. } => ErrorSeverity::Low,
            ComplianceError::CollaboratorUnavailable { .. } | ComplianceError::ApiError(_) => {
                ErrorSeverity::Medium
            }
            ComplianceError::StageFailed { stage, .. } => match stage {
                Stage::SearchRegulations | Stage::SearchGuidance => ErrorSeverity::Medium,
                _ => ErrorSeverity::High,
            },
            ComplianceError::EmptyCatalog
            | ComplianceError::NoUsableRecords { .. }
            | ComplianceError::ValidationError { .. }
            | ComplianceError::ConfigError { .. }
            | ComplianceError::ConfigValidationError { .. }
            | ComplianceError::InvalidConfigValueError { .. }
            | ComplianceError::MissingConfigError { .. } => ErrorSeverity::High,
            ComplianceError::EvaluationTaskFailed { .. }
            | ComplianceError::ZipError(_)
            | ComplianceError::IoError(_)
            | ComplianceError::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    /// Row- and customer-level errors are collected as diagnostics instead of
    /// aborting the run.
    pub fn is_recoverable(&self) -> bool {
        self.diagnostic_kind().is_some()
    }

    pub fn diagnostic_kind(&self) -> Option<DiagnosticKind> {
        match self {
            ComplianceError::MalformedMetricRecord { .. } => {
                Some(DiagnosticKind::MalformedMetricRecord)
            }
            ComplianceError::UnknownRiskCategory { .. } => Some(DiagnosticKind::UnknownRiskCategory),
            ComplianceError::InvalidRiskDefinition { .. } => {
                Some(DiagnosticKind::InvalidRiskDefinition)
            }
            ComplianceError::IncompleteMetricSet { .. } => Some(DiagnosticKind::IncompleteMetricSet),
            _ => None,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ComplianceError::MalformedMetricRecord { .. } => {
                "Fix the offending row in the metrics source; other rows were still evaluated"
                    .to_string()
            }
            ComplianceError::UnknownRiskCategory { name } => format!(
                "Rename '{}' to one of the canonical risk categories or remove it from the knowledge source",
                name
            ),
            ComplianceError::InvalidRiskDefinition { .. } => {
                "Provide thresholds as [floor, lower_edge, upper_edge] in ascending order".to_string()
            }
            ComplianceError::IncompleteMetricSet { .. } => {
                "Add the missing risk categories to the knowledge source".to_string()
            }
            ComplianceError::CollaboratorUnavailable { collaborator, .. } => format!(
                "Check that the {} is reachable and retry the run",
                collaborator
            ),
            ComplianceError::EmptyCatalog => {
                "The knowledge source returned no usable risk definitions; check its contents"
                    .to_string()
            }
            ComplianceError::NoUsableRecords { .. } => {
                "The metrics source returned no parsable rows; check its format".to_string()
            }
            ComplianceError::StageFailed { stage, .. } => {
                format!("Inspect the logs for the '{}' stage and retry", stage)
            }
            ComplianceError::EvaluationTaskFailed { .. } => {
                "An evaluation worker crashed; re-run with --verbose and report the issue".to_string()
            }
            ComplianceError::ApiError(_) => {
                "Check network connectivity and the configured endpoints".to_string()
            }
            ComplianceError::ZipError(_) | ComplianceError::IoError(_) => {
                "Check file permissions and available disk space".to_string()
            }
            ComplianceError::SerializationError(_) => {
                "Check that the input JSON matches the expected structure".to_string()
            }
            ComplianceError::ConfigError { .. }
            | ComplianceError::ConfigValidationError { .. }
            | ComplianceError::InvalidConfigValueError { .. } => {
                "Review the configuration file and fix the reported field".to_string()
            }
            ComplianceError::MissingConfigError { field } => {
                format!("Add '{}' to the configuration file", field)
            }
            ComplianceError::ValidationError { .. } => "Correct the input values".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ComplianceError::StageFailed { stage, cause } => {
                format!("Compliance run failed while {}: {}", stage.description(), cause)
            }
            ComplianceError::CollaboratorUnavailable { collaborator, .. } => {
                format!("The {} could not be reached", collaborator)
            }
            ComplianceError::EmptyCatalog => {
                "No risk definitions are available, so nothing can be evaluated".to_string()
            }
            ComplianceError::NoUsableRecords { rejected } => format!(
                "None of the customer metric rows could be used ({} rejected)",
                rejected
            ),
            other => other.to_string(),
        }
    }
}
