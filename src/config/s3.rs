use crate::domain::ports::Storage;
use crate::utils::error::{ComplianceError, Result};
use crate::utils::validation::validate_non_empty_string;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client as S3Client;

/// Object storage backend; keys are joined under an optional prefix.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: S3Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self {
            client,
            bucket,
            prefix: String::new(),
        }
    }

    /// Builds a client from the default credential chain for `region`.
    pub async fn connect(bucket: &str, region: &str) -> Result<Self> {
        validate_s3_bucket_name("s3.bucket", bucket)?;
        validate_aws_region("s3.region", region)?;

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        tracing::debug!("S3 client ready for bucket {} in {}", bucket, region);
        Ok(Self::new(S3Client::new(&shared), bucket.to_string()))
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    fn key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

impl Storage for S3Storage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let key = self.key(path);
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                ComplianceError::collaborator(
                    "s3 storage",
                    format!("failed to read s3://{}/{}: {}", self.bucket, key, e),
                )
            })?;

        let data = resp.body.collect().await.map_err(|e| {
            ComplianceError::collaborator(
                "s3 storage",
                format!("failed to collect s3://{}/{}: {}", self.bucket, key, e),
            )
        })?;

        Ok(data.into_bytes().to_vec())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = self.key(path);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(data.to_vec().into())
            .send()
            .await
            .map_err(|e| {
                ComplianceError::collaborator(
                    "s3 storage",
                    format!("failed to write s3://{}/{}: {}", self.bucket, key, e),
                )
            })?;

        tracing::debug!("Wrote {} bytes to s3://{}/{}", data.len(), self.bucket, key);
        Ok(())
    }
}

pub fn validate_s3_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.is_empty() {
        return Err(ComplianceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name cannot be empty".to_string(),
        });
    }

    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(ComplianceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name must be between 3 and 63 characters".to_string(),
        });
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(ComplianceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name can only contain lowercase letters, numbers, hyphens, and dots"
                .to_string(),
        });
    }

    if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        return Err(ComplianceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: bucket_name.to_string(),
            reason: "S3 bucket name cannot start or end with a hyphen".to_string(),
        });
    }

    Ok(())
}

pub fn validate_aws_region(field_name: &str, region: &str) -> Result<()> {
    validate_non_empty_string(field_name, region)?;

    if !region
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(ComplianceError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: region.to_string(),
            reason: "AWS region can only contain lowercase letters, numbers, and hyphens"
                .to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_name_rules() {
        assert!(validate_s3_bucket_name("bucket", "compliance-reports").is_ok());
        assert!(validate_s3_bucket_name("bucket", "ab").is_err());
        assert!(validate_s3_bucket_name("bucket", "Upper-Case").is_err());
        assert!(validate_s3_bucket_name("bucket", "-leading").is_err());
    }

    #[test]
    fn test_region_rules() {
        assert!(validate_aws_region("region", "us-east-1").is_ok());
        assert!(validate_aws_region("region", "").is_err());
        assert!(validate_aws_region("region", "US_EAST").is_err());
    }
}
