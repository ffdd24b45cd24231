use crate::core::catalog::RiskCatalog;
use crate::domain::model::{CustomerMetric, CustomerRiskReport, MetricKind, RiskFinding};
use crate::utils::error::{ComplianceError, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Findings for one customer, plus the metrics the catalog could not cover.
#[derive(Debug)]
pub struct CustomerEvaluation {
    pub report: CustomerRiskReport,
    pub incomplete: Option<ComplianceError>,
}

/// Classifies every canonical metric that has a definition in `catalog`.
///
/// Pure: the same metric and catalog always produce the same findings, in
/// canonical metric order. Metrics without a definition are listed in an
/// `IncompleteMetricSet` error while the remaining metrics are still evaluated.
pub fn evaluate(metric: &CustomerMetric, catalog: &RiskCatalog) -> CustomerEvaluation {
    let mut findings = Vec::with_capacity(MetricKind::ALL.len());
    let mut missing = Vec::new();

    for kind in MetricKind::ALL {
        let Some(definition) = catalog.definition(kind) else {
            missing.push(kind.key().to_string());
            continue;
        };

        let value = metric.value(kind);
        let (level, band) = definition.classify(value);
        tracing::debug!(
            "  {} - {}: {} → {} {}",
            metric.customer_id,
            kind.key(),
            value,
            level,
            band
        );

        findings.push(RiskFinding {
            metric: kind,
            category: definition.name.clone(),
            value,
            level,
            band,
            explanation: definition.description.clone(),
        });
    }

    let incomplete = (!missing.is_empty()).then(|| ComplianceError::IncompleteMetricSet {
        customer_id: metric.customer_id.clone(),
        missing,
    });

    CustomerEvaluation {
        report: CustomerRiskReport::from_findings(
            metric.customer_id.clone(),
            metric.source_row,
            findings,
        ),
        incomplete,
    }
}

/// Evaluates customers on at most `workers` concurrent tasks.
///
/// Results come back in completion order. If a task fails, the remaining
/// tasks are still drained before the error is returned.
pub async fn evaluate_all(
    metrics: Vec<CustomerMetric>,
    catalog: Arc<RiskCatalog>,
    workers: usize,
) -> Result<Vec<CustomerEvaluation>> {
    if workers <= 1 {
        return Ok(metrics.iter().map(|m| evaluate(m, &catalog)).collect());
    }

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    let mut failure = None;
    let total = metrics.len();

    for metric in metrics {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                failure = Some(ComplianceError::EvaluationTaskFailed {
                    details: e.to_string(),
                });
                break;
            }
        };
        let catalog = Arc::clone(&catalog);
        tasks.spawn(async move {
            let _permit = permit;
            evaluate(&metric, &catalog)
        });
    }

    let mut evaluations = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(evaluation) => evaluations.push(evaluation),
            Err(e) => {
                tracing::error!("❌ Evaluation task failed: {}", e);
                failure.get_or_insert(ComplianceError::EvaluationTaskFailed {
                    details: e.to_string(),
                });
            }
        }
    }

    match failure {
        Some(e) => {
            tracing::warn!(
                "Drained {} of {} evaluations before failing",
                evaluations.len(),
                total
            );
            Err(e)
        }
        None => Ok(evaluations),
    }
}
