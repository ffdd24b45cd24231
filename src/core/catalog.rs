use crate::domain::model::{MetricKind, RiskDefinition, Thresholds};
use crate::domain::ports::{KnowledgeSource, RiskDefinitionRecord};
use crate::utils::error::{ComplianceError, Result};
use std::collections::BTreeMap;

/// Read-only lookup of risk definitions, built once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskCatalog {
    definitions: BTreeMap<MetricKind, RiskDefinition>,
}

/// A loaded catalog together with what was skipped while building it.
#[derive(Debug)]
pub struct CatalogLoad {
    pub catalog: RiskCatalog,
    pub rejected: Vec<ComplianceError>,
    pub missing: Vec<MetricKind>,
}

impl RiskCatalog {
    /// Validates knowledge-source records. Unknown or invalid records are
    /// skipped and reported; a catalog with no usable definition is an error.
    pub fn from_records(records: Vec<RiskDefinitionRecord>) -> Result<CatalogLoad> {
        let mut definitions = BTreeMap::new();
        let mut rejected = Vec::new();

        for record in records {
            let Some(metric) = MetricKind::from_name(&record.name) else {
                tracing::warn!("⚠️ Skipping unknown risk category: {}", record.name);
                rejected.push(ComplianceError::UnknownRiskCategory { name: record.name });
                continue;
            };

            if definitions.contains_key(&metric) {
                rejected.push(ComplianceError::InvalidRiskDefinition {
                    name: record.name,
                    reason: format!("duplicate definition for {}", metric.key()),
                });
                continue;
            }

            let definition = Thresholds::from_slice(&record.thresholds).and_then(|thresholds| {
                RiskDefinition::new(metric, record.name.clone(), thresholds, record.description)
            });
            match definition {
                Ok(definition) => {
                    definitions.insert(metric, definition);
                }
                Err(reason) => {
                    tracing::warn!("⚠️ Skipping invalid risk definition '{}': {}", record.name, reason);
                    rejected.push(ComplianceError::InvalidRiskDefinition {
                        name: record.name,
                        reason,
                    });
                }
            }
        }

        if definitions.is_empty() {
            return Err(ComplianceError::EmptyCatalog);
        }

        let catalog = RiskCatalog { definitions };
        let missing = catalog.missing_metrics();
        Ok(CatalogLoad {
            catalog,
            rejected,
            missing,
        })
    }

    /// Fetches a fresh catalog. Existing catalogs are never modified in place.
    pub async fn reload(source: &dyn KnowledgeSource) -> Result<CatalogLoad> {
        let records = source
            .fetch_risk_definitions()
            .await
            .map_err(|e| e.attributed_to("knowledge source"))?;
        Self::from_records(records)
    }

    /// Reference thresholds for the three canonical categories.
    pub fn standard_records() -> Vec<RiskDefinitionRecord> {
        vec![
            RiskDefinitionRecord {
                name: MetricKind::NegativeAccumulation.category_name().to_string(),
                thresholds: vec![0.0, 5.0, 15.0],
                description: "Ordering drugs while accumulations are negative may indicate inventory control weaknesses.".to_string(),
            },
            RiskDefinitionRecord {
                name: MetricKind::MatchRate.category_name().to_string(),
                thresholds: vec![0.0, 70.0, 85.0],
                description: "Low match rates may indicate incomplete documentation or eligibility classification issues.".to_string(),
            },
            RiskDefinitionRecord {
                name: MetricKind::ReferralCapture.category_name().to_string(),
                thresholds: vec![0.0, 40.0, 60.0],
                description: "Low referral capture may indicate operational inefficiencies or missed program opportunities.".to_string(),
            },
        ]
    }

    pub fn standard() -> Result<RiskCatalog> {
        Ok(Self::from_records(Self::standard_records())?.catalog)
    }

    /// Definitions in canonical metric order.
    pub fn list_definitions(&self) -> Vec<&RiskDefinition> {
        self.definitions.values().collect()
    }

    /// Looks up by metric key or category name.
    pub fn get_definition(&self, metric_name: &str) -> Result<&RiskDefinition> {
        MetricKind::from_name(metric_name)
            .and_then(|kind| self.definitions.get(&kind))
            .ok_or_else(|| ComplianceError::UnknownRiskCategory {
                name: metric_name.to_string(),
            })
    }

    pub fn definition(&self, metric: MetricKind) -> Option<&RiskDefinition> {
        self.definitions.get(&metric)
    }

    pub fn missing_metrics(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|kind| !self.definitions.contains_key(kind))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
