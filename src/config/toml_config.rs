use crate::core::controller::{ControllerSettings, DEFAULT_GUIDANCE_QUERY, DEFAULT_REGULATORY_QUERY};
use crate::utils::error::{ComplianceError, Result};
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, validate_required_field, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_REPORT_NAME: &str = "compliance_report";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const SUPPORTED_FORMATS: [&str; 2] = ["txt", "json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub metrics: SourceConfig,
    #[serde(default = "SourceConfig::builtin")]
    pub knowledge: SourceConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub narrative: NarrativeConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Builtin,
    File,
    Http,
    S3,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Builtin => "builtin",
            SourceKind::File => "file",
            SourceKind::Http => "http",
            SourceKind::S3 => "s3",
        };
        f.write_str(name)
    }
}

/// Where a metrics table or a risk-definition document comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source: SourceKind,
    /// Local path (`file`) or object key (`s3`).
    pub path: Option<String>,
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl SourceConfig {
    pub fn builtin() -> Self {
        Self {
            source: SourceKind::Builtin,
            path: None,
            endpoint: None,
            bucket: None,
            region: None,
            api_key: None,
            timeout_seconds: None,
        }
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    /// Human-readable location, for logs and the dry-run plan.
    pub fn describe(&self) -> String {
        match self.source {
            SourceKind::Builtin => "built-in reference catalog".to_string(),
            SourceKind::File => format!("file {}", self.path.as_deref().unwrap_or("?")),
            SourceKind::Http => format!("GET {}", self.endpoint.as_deref().unwrap_or("?")),
            SourceKind::S3 => format!(
                "s3://{}/{}",
                self.bucket.as_deref().unwrap_or("?"),
                self.path.as_deref().unwrap_or("?")
            ),
        }
    }

    fn validate_as(&self, section: &str, extensions: &[&str]) -> Result<()> {
        match self.source {
            SourceKind::Builtin => Ok(()),
            SourceKind::File => {
                let field = format!("{}.path", section);
                let path = validate_required_field(&field, &self.path)?;
                validate_path(&field, path)?;
                validate_file_extension(&field, path, extensions)
            }
            SourceKind::Http => {
                let field = format!("{}.endpoint", section);
                let endpoint = validate_required_field(&field, &self.endpoint)?;
                validate_url(&field, endpoint)?;
                if let Some(timeout) = self.timeout_seconds {
                    validate_positive_number(&format!("{}.timeout_seconds", section), timeout as usize, 1)?;
                }
                Ok(())
            }
            SourceKind::S3 => self.validate_s3(section),
        }
    }

    #[cfg(feature = "s3")]
    fn validate_s3(&self, section: &str) -> Result<()> {
        let bucket_field = format!("{}.bucket", section);
        let bucket = validate_required_field(&bucket_field, &self.bucket)?;
        crate::config::s3::validate_s3_bucket_name(&bucket_field, bucket)?;
        crate::config::s3::validate_aws_region(&format!("{}.region", section), self.region())?;
        let key_field = format!("{}.path", section);
        let key = validate_required_field(&key_field, &self.path)?;
        validate_non_empty_string(&key_field, key)
    }

    #[cfg(not(feature = "s3"))]
    fn validate_s3(&self, section: &str) -> Result<()> {
        Err(ComplianceError::InvalidConfigValueError {
            field: format!("{}.source", section),
            value: self.source.to_string(),
            reason: "S3 sources require building with the `s3` feature".to_string(),
        })
    }
}

/// Web search settings. Without an endpoint the offline guidance is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub regulatory_query: Option<String>,
    pub guidance_query: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_results: Option<usize>,
}

/// Summary generation. Without an endpoint the template summary is used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NarrativeConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub timeout_seconds: Option<u64>,
    pub max_context_chars: Option<usize>,
}

impl NarrativeConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_path: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    pub bundle: Option<bool>,
    pub report_name: Option<String>,
    /// Write artifacts to S3 instead of the local `output_path`.
    pub bucket: Option<String>,
    pub region: Option<String>,
}

fn default_formats() -> Vec<String> {
    vec!["txt".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub json_logs: Option<bool>,
}

impl TomlConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ComplianceError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ComplianceError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as-is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ComplianceError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("pipeline.name", &self.pipeline.name)?;

        if self.metrics.source == SourceKind::Builtin {
            return Err(ComplianceError::InvalidConfigValueError {
                field: "metrics.source".to_string(),
                value: self.metrics.source.to_string(),
                reason: "Metrics must come from file, http or s3".to_string(),
            });
        }
        self.metrics.validate_as("metrics", &["csv", "txt"])?;
        self.knowledge.validate_as("knowledge", &["toml", "json"])?;

        if let Some(endpoint) = &self.search.endpoint {
            validate_url("search.endpoint", endpoint)?;
        }
        if let Some(max_results) = self.search.max_results {
            validate_positive_number("search.max_results", max_results, 1)?;
        }
        if let Some(timeout) = self.search.timeout_seconds {
            validate_positive_number("search.timeout_seconds", timeout as usize, 1)?;
        }

        if let Some(endpoint) = &self.narrative.endpoint {
            validate_url("narrative.endpoint", endpoint)?;
            validate_non_empty_string("narrative.model", self.narrative.model())?;
        }
        if let Some(temperature) = self.narrative.temperature {
            validate_range("narrative.temperature", temperature, 0.0, 2.0)?;
        }
        if let Some(chars) = self.narrative.max_context_chars {
            validate_positive_number("narrative.max_context_chars", chars, 1)?;
        }
        if let Some(timeout) = self.narrative.timeout_seconds {
            validate_positive_number("narrative.timeout_seconds", timeout as usize, 1)?;
        }

        validate_positive_number("evaluation.workers", self.workers(), 1)?;
        validate_range("evaluation.workers", self.workers(), 1, 256)?;

        validate_path("output.output_path", &self.output.output_path)?;
        if self.output.formats.is_empty() {
            return Err(ComplianceError::MissingConfigError {
                field: "output.formats".to_string(),
            });
        }
        for format in &self.output.formats {
            if !SUPPORTED_FORMATS.contains(&format.as_str()) {
                return Err(ComplianceError::InvalidConfigValueError {
                    field: "output.formats".to_string(),
                    value: format.clone(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        SUPPORTED_FORMATS.join(", ")
                    ),
                });
            }
        }
        validate_non_empty_string("output.report_name", self.report_name())?;
        if let Some(bucket) = &self.output.bucket {
            validate_output_bucket(bucket, self.output.region.as_deref().unwrap_or(DEFAULT_REGION))?;
        }

        Ok(())
    }

    pub fn output_path(&self) -> &str {
        &self.output.output_path
    }

    pub fn workers(&self) -> usize {
        self.evaluation.workers.unwrap_or(DEFAULT_WORKERS)
    }

    pub fn report_name(&self) -> &str {
        self.output.report_name.as_deref().unwrap_or(DEFAULT_REPORT_NAME)
    }

    pub fn bundle_enabled(&self) -> bool {
        self.output.bundle.unwrap_or(false)
    }

    pub fn wants_format(&self, format: &str) -> bool {
        self.output.formats.iter().any(|f| f == format)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.json_logs)
            .unwrap_or(false)
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            regulatory_query: self
                .search
                .regulatory_query
                .clone()
                .unwrap_or_else(|| DEFAULT_REGULATORY_QUERY.to_string()),
            guidance_query: self
                .search
                .guidance_query
                .clone()
                .unwrap_or_else(|| DEFAULT_GUIDANCE_QUERY.to_string()),
            evaluation_workers: self.workers(),
        }
    }
}

#[cfg(feature = "s3")]
fn validate_output_bucket(bucket: &str, region: &str) -> Result<()> {
    crate::config::s3::validate_s3_bucket_name("output.bucket", bucket)?;
    crate::config::s3::validate_aws_region("output.region", region)
}

#[cfg(not(feature = "s3"))]
fn validate_output_bucket(bucket: &str, _region: &str) -> Result<()> {
    Err(ComplianceError::InvalidConfigValueError {
        field: "output.bucket".to_string(),
        value: bucket.to_string(),
        reason: "S3 output requires building with the `s3` feature".to_string(),
    })
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
