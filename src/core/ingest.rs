use crate::domain::model::{CustomerMetric, MetricKind};
use crate::utils::error::ComplianceError;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;

const FIELD_COUNT: usize = 4;

/// Well-formed metrics plus one `MalformedMetricRecord` per rejected row.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub metrics: Vec<CustomerMetric>,
    pub rejected: Vec<ComplianceError>,
}

impl IngestOutcome {
    pub fn rows_seen(&self) -> usize {
        self.metrics.len() + self.rejected.len()
    }
}

/// Parses `customer_id,negative_accum_count,match_rate_percent,referral_capture_rate_percent`
/// rows. A bad row is reported and skipped; it never prevents other rows from being ingested.
pub fn ingest(raw: &str) -> IngestOutcome {
    let body = strip_code_fence(raw);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(body.as_bytes());

    let mut outcome = IngestOutcome::default();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut row = 0;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                row += 1;
                outcome.rejected.push(malformed(row, format!("unreadable row: {}", e)));
                continue;
            }
        };

        if record.iter().all(str::is_empty) || is_header(&record) {
            continue;
        }
        row += 1;

        match parse_row(&record, row) {
            Ok(metric) => {
                if let Some(first_row) = first_seen.get(&metric.customer_id) {
                    outcome.rejected.push(malformed(
                        row,
                        format!(
                            "duplicate customer identifier '{}' (first seen at row {})",
                            metric.customer_id, first_row
                        ),
                    ));
                    continue;
                }
                first_seen.insert(metric.customer_id.clone(), row);
                tracing::debug!("Ingested row {}: {}", row, metric.customer_id);
                outcome.metrics.push(metric);
            }
            Err(reason) => {
                tracing::debug!("Rejected row {}: {}", row, reason);
                outcome.rejected.push(malformed(row, reason));
            }
        }
    }

    outcome
}

fn malformed(row: usize, reason: String) -> ComplianceError {
    ComplianceError::MalformedMetricRecord { row, reason }
}

/// Knowledge-base style sources often wrap the CSV in a Markdown fence.
fn strip_code_fence(raw: &str) -> &str {
    let Some(start) = raw.find("```") else {
        return raw;
    };
    let after_fence = &raw[start + 3..];
    let body = match after_fence.find('\n') {
        Some(newline) => &after_fence[newline + 1..],
        None => after_fence,
    };
    match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    }
}

fn is_header(record: &StringRecord) -> bool {
    record
        .get(0)
        .map(|field| field.eq_ignore_ascii_case("customer_id"))
        .unwrap_or(false)
}

fn parse_row(record: &StringRecord, row: usize) -> Result<CustomerMetric, String> {
    if record.len() < FIELD_COUNT {
        return Err(format!(
            "missing field: expected {} fields, found {}",
            FIELD_COUNT,
            record.len()
        ));
    }
    if record.len() > FIELD_COUNT {
        return Err(format!(
            "unexpected extra fields: expected {}, found {}",
            FIELD_COUNT,
            record.len()
        ));
    }

    let count_field = &record[1];
    let negative_accum_count = required(MetricKind::NegativeAccumulation, count_field)?
        .parse::<u32>()
        .map_err(|_| {
            format!(
                "{} is not a non-negative integer: '{}'",
                MetricKind::NegativeAccumulation.key(),
                count_field
            )
        })?;
    let match_rate = parse_percentage(MetricKind::MatchRate, &record[2])?;
    let referral_rate = parse_percentage(MetricKind::ReferralCapture, &record[3])?;

    CustomerMetric::new(&record[0], row, negative_accum_count, match_rate, referral_rate)
}

fn required(kind: MetricKind, field: &str) -> Result<&str, String> {
    if field.is_empty() {
        return Err(format!("missing value for {}", kind.key()));
    }
    Ok(field)
}

fn parse_percentage(kind: MetricKind, field: &str) -> Result<f64, String> {
    let cleaned = required(kind, field)?.trim_end_matches('%').trim_end();
    cleaned
        .parse::<f64>()
        .map_err(|_| format!("{} is not numeric: '{}'", kind.key(), field))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected_rows(outcome: &IngestOutcome) -> Vec<usize> {
        outcome
            .rejected
            .iter()
            .filter_map(|e| match e {
                ComplianceError::MalformedMetricRecord { row, .. } => Some(*row),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_ingest_with_header() {
        let raw = "customer_id,negative_accum_count,match_rate_percent,referral_capture_rate_percent\n\
                   CE001,3,92,75\n\
                   CE002,12,78.5,45\n";
        let outcome = ingest(raw);

        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.metrics.len(), 2);
        assert_eq!(outcome.metrics[0].customer_id, "CE001");
        assert_eq!(outcome.metrics[0].source_row, 1);
        assert_eq!(outcome.metrics[1].negative_accum_count, 12);
        assert_eq!(outcome.metrics[1].match_rate_percent, 78.5);
    }

    #[test]
    fn test_non_numeric_row_is_isolated() {
        let raw = "CE001,3,92,75\nCE002,4,abc,50\nCE003,20,60,30\n";
        let outcome = ingest(raw);

        let ids: Vec<&str> = outcome.metrics.iter().map(|m| m.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["CE001", "CE003"]);
        assert_eq!(rejected_rows(&outcome), vec![2]);
        assert!(outcome.rejected[0].to_string().contains("match_rate_percent"));
        assert_eq!(outcome.rows_seen(), 3);
    }

    #[test]
    fn test_missing_and_extra_fields_are_rejected() {
        let raw = "CE001,3,92\nCE002,3,92,75,1\nCE003,,92,75\nCE004,1,90,80\n";
        let outcome = ingest(raw);

        assert_eq!(outcome.metrics.len(), 1);
        assert_eq!(rejected_rows(&outcome), vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_customer_rejects_later_row() {
        let raw = "CE001,3,92,75\nCE001,9,80,50\n";
        let outcome = ingest(raw);

        assert_eq!(outcome.metrics.len(), 1);
        assert_eq!(outcome.metrics[0].negative_accum_count, 3);
        assert_eq!(rejected_rows(&outcome), vec![2]);
        assert!(outcome.rejected[0].to_string().contains("duplicate"));
    }

    #[test]
    fn test_negative_count_and_out_of_range_rate_are_rejected() {
        let raw = "CE001,-2,92,75\nCE002,2,120,75\n";
        let outcome = ingest(raw);

        assert!(outcome.metrics.is_empty());
        assert_eq!(rejected_rows(&outcome), vec![1, 2]);
    }

    #[test]
    fn test_markdown_fence_and_percent_signs() {
        let raw = "Here are the metrics:\n```csv\ncustomer_id,negative_accum_count,match_rate_percent,referral_capture_rate_percent\nCE001, 3, 92%, 75 %\n\nCE002,16,69,39\n```\nLet me know if you need more.";
        let outcome = ingest(raw);

        assert!(outcome.rejected.is_empty(), "{:?}", outcome.rejected);
        assert_eq!(outcome.metrics.len(), 2);
        assert_eq!(outcome.metrics[0].match_rate_percent, 92.0);
        assert_eq!(outcome.metrics[0].referral_capture_rate_percent, 75.0);
        assert_eq!(outcome.metrics[1].source_row, 2);
    }

    #[test]
    fn test_empty_input() {
        let outcome = ingest("");
        assert!(outcome.metrics.is_empty());
        assert!(outcome.rejected.is_empty());
    }
}
