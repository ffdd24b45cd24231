use crate::domain::ports::{KnowledgeSource, MetricsSource, RiskDefinitionRecord, Storage};
use crate::utils::error::{ComplianceError, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// Reads the metrics CSV through a `Storage` backend (local disk or S3).
pub struct StorageMetricsSource<S: Storage> {
    storage: S,
    path: String,
}

impl<S: Storage> StorageMetricsSource<S> {
    pub fn new(storage: S, path: impl Into<String>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }
}

#[async_trait]
impl<S: Storage> MetricsSource for StorageMetricsSource<S> {
    async fn fetch_raw_metrics(&self) -> Result<String> {
        tracing::debug!("Reading metrics from: {}", self.path);
        let bytes = self.storage.read_file(&self.path).await?;
        String::from_utf8(bytes).map_err(|e| ComplianceError::ValidationError {
            message: format!("metrics file '{}' is not valid UTF-8: {}", self.path, e),
        })
    }
}

/// Reads risk definitions from a TOML or JSON document.
pub struct StorageKnowledgeSource<S: Storage> {
    storage: S,
    path: String,
}

impl<S: Storage> StorageKnowledgeSource<S> {
    pub fn new(storage: S, path: impl Into<String>) -> Self {
        Self {
            storage,
            path: path.into(),
        }
    }
}

#[async_trait]
impl<S: Storage> KnowledgeSource for StorageKnowledgeSource<S> {
    async fn fetch_risk_definitions(&self) -> Result<Vec<RiskDefinitionRecord>> {
        tracing::debug!("Reading risk definitions from: {}", self.path);
        let bytes = self.storage.read_file(&self.path).await?;
        if self.path.ends_with(".json") {
            parse_json_definitions(&bytes)
        } else {
            let text = String::from_utf8(bytes).map_err(|e| ComplianceError::ValidationError {
                message: format!("definitions file '{}' is not valid UTF-8: {}", self.path, e),
            })?;
            parse_toml_definitions(&text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct DefinitionsDocument {
    definitions: Vec<RiskDefinitionRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefinitionsPayload {
    List(Vec<RiskDefinitionRecord>),
    Document(DefinitionsDocument),
}

impl From<DefinitionsPayload> for Vec<RiskDefinitionRecord> {
    fn from(payload: DefinitionsPayload) -> Self {
        match payload {
            DefinitionsPayload::List(records) => records,
            DefinitionsPayload::Document(doc) => doc.definitions,
        }
    }
}

/// Accepts either a bare array or `{"definitions": [...]}`.
pub fn parse_json_definitions(bytes: &[u8]) -> Result<Vec<RiskDefinitionRecord>> {
    let payload: DefinitionsPayload = serde_json::from_slice(bytes)?;
    Ok(payload.into())
}

/// Expects `[[definitions]]` tables.
pub fn parse_toml_definitions(text: &str) -> Result<Vec<RiskDefinitionRecord>> {
    let doc: DefinitionsDocument = toml::from_str(text).map_err(|e| ComplianceError::ValidationError {
        message: format!("risk definitions are not valid TOML: {}", e),
    })?;
    Ok(doc.definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::cli::LocalStorage;
    use tempfile::TempDir;

    #[test]
    fn test_parse_toml_definitions() {
        let text = r#"
[[definitions]]
name = "Negative Accumulation Risk"
thresholds = [0, 5, 15]
description = "Ordering while negative"

[[definitions]]
name = "Match Rate Risk"
thresholds = [0.0, 70.0, 85.0]
"#;
        let records = parse_toml_definitions(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].thresholds, vec![0.0, 5.0, 15.0]);
        assert_eq!(records[1].description, "");
    }

    #[test]
    fn test_parse_json_definitions_both_shapes() {
        let bare = br#"[{"name": "Match Rate Risk", "thresholds": [0, 70, 85], "description": "x"}]"#;
        let wrapped = br#"{"definitions": [{"name": "Match Rate Risk", "thresholds": [0, 70, 85]}]}"#;

        assert_eq!(parse_json_definitions(bare).unwrap()[0].name, "Match Rate Risk");
        assert_eq!(parse_json_definitions(wrapped).unwrap()[0].thresholds[2], 85.0);
        assert!(parse_json_definitions(b"{}").is_err());
    }

    #[tokio::test]
    async fn test_storage_sources_read_local_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("metrics.csv"), "CE001,1,90,80\n").unwrap();
        std::fs::write(
            dir.path().join("risks.json"),
            r#"[{"name": "Referral Capture Risk", "thresholds": [0, 40, 60]}]"#,
        )
        .unwrap();

        let storage = LocalStorage::new(dir.path().to_str().unwrap().to_string());
        let metrics = StorageMetricsSource::new(storage.clone(), "metrics.csv");
        let knowledge = StorageKnowledgeSource::new(storage, "risks.json");

        assert_eq!(metrics.fetch_raw_metrics().await.unwrap(), "CE001,1,90,80\n");
        assert_eq!(knowledge.fetch_risk_definitions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().to_str().unwrap().to_string());
        let metrics = StorageMetricsSource::new(storage, "absent.csv");

        assert!(matches!(
            metrics.fetch_raw_metrics().await,
            Err(ComplianceError::IoError(_))
        ));
    }
}
