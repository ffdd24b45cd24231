use crate::adapters::{
    BuiltinKnowledgeSource, HttpEndpoint, HttpKnowledgeSource, HttpMetricsSource,
    HttpNarrativeGenerator, HttpSearchClient, OfflineSearchClient, StorageKnowledgeSource,
    StorageMetricsSource, TemplateNarrative,
};
use crate::config::cli::LocalStorage;
use crate::config::toml_config::{SourceConfig, SourceKind, TomlConfig};
use crate::core::controller::{Collaborators, PipelineController};
use crate::domain::ports::{KnowledgeSource, MetricsSource, NarrativeGenerator, SearchClient};
use crate::utils::error::{ComplianceError, Result};
use std::sync::Arc;

/// Wires the configured collaborators into a controller.
pub async fn build_controller(config: &TomlConfig) -> Result<PipelineController> {
    let collaborators = build_collaborators(config).await?;
    Ok(PipelineController::new(collaborators, config.controller_settings()))
}

pub async fn build_collaborators(config: &TomlConfig) -> Result<Collaborators> {
    let metrics_source = metrics_source(&config.metrics).await?;
    let knowledge_source = knowledge_source(&config.knowledge).await?;
    let search = search_client(config);

    tracing::info!("📋 Metrics source: {}", config.metrics.describe());
    tracing::info!("📋 Knowledge source: {}", config.knowledge.describe());

    Ok(Collaborators {
        metrics_source,
        knowledge_source,
        regulatory_search: search.clone(),
        guidance_search: search,
        narrative: narrative_generator(config),
    })
}

fn http_endpoint(section: &str, source: &SourceConfig) -> Result<HttpEndpoint> {
    let url = source
        .endpoint
        .clone()
        .ok_or_else(|| ComplianceError::MissingConfigError {
            field: format!("{}.endpoint", section),
        })?;
    let mut endpoint = HttpEndpoint::new(url).with_api_key(source.api_key.clone());
    if let Some(timeout) = source.timeout_seconds {
        endpoint = endpoint.with_timeout(timeout);
    }
    Ok(endpoint)
}

fn required_path(section: &str, source: &SourceConfig) -> Result<String> {
    source
        .path
        .clone()
        .ok_or_else(|| ComplianceError::MissingConfigError {
            field: format!("{}.path", section),
        })
}

async fn metrics_source(source: &SourceConfig) -> Result<Arc<dyn MetricsSource>> {
    match source.source {
        SourceKind::File => {
            let path = required_path("metrics", source)?;
            Ok(Arc::new(StorageMetricsSource::new(LocalStorage::new(String::new()), path)))
        }
        SourceKind::Http => Ok(Arc::new(HttpMetricsSource::new(http_endpoint("metrics", source)?))),
        SourceKind::S3 => {
            let path = required_path("metrics", source)?;
            let storage = s3_storage("metrics", source).await?;
            Ok(Arc::new(StorageMetricsSource::new(storage, path)))
        }
        SourceKind::Builtin => Err(ComplianceError::InvalidConfigValueError {
            field: "metrics.source".to_string(),
            value: source.source.to_string(),
            reason: "There is no built-in metrics table".to_string(),
        }),
    }
}

async fn knowledge_source(source: &SourceConfig) -> Result<Arc<dyn KnowledgeSource>> {
    match source.source {
        SourceKind::Builtin => Ok(Arc::new(BuiltinKnowledgeSource)),
        SourceKind::File => {
            let path = required_path("knowledge", source)?;
            Ok(Arc::new(StorageKnowledgeSource::new(LocalStorage::new(String::new()), path)))
        }
        SourceKind::Http => Ok(Arc::new(HttpKnowledgeSource::new(http_endpoint("knowledge", source)?))),
        SourceKind::S3 => {
            let path = required_path("knowledge", source)?;
            let storage = s3_storage("knowledge", source).await?;
            Ok(Arc::new(StorageKnowledgeSource::new(storage, path)))
        }
    }
}

#[cfg(feature = "s3")]
async fn s3_storage(section: &str, source: &SourceConfig) -> Result<crate::config::s3::S3Storage> {
    let bucket = source
        .bucket
        .as_deref()
        .ok_or_else(|| ComplianceError::MissingConfigError {
            field: format!("{}.bucket", section),
        })?;
    crate::config::s3::S3Storage::connect(bucket, source.region()).await
}

#[cfg(not(feature = "s3"))]
async fn s3_storage(section: &str, _source: &SourceConfig) -> Result<LocalStorage> {
    Err(ComplianceError::ConfigError {
        message: format!("{}.source = \"s3\" requires building with the `s3` feature", section),
    })
}

fn search_client(config: &TomlConfig) -> Arc<dyn SearchClient> {
    match &config.search.endpoint {
        Some(url) => {
            let mut endpoint = HttpEndpoint::new(url.clone()).with_api_key(config.search.api_key.clone());
            if let Some(timeout) = config.search.timeout_seconds {
                endpoint = endpoint.with_timeout(timeout);
            }
            let mut client = HttpSearchClient::new(endpoint);
            if let Some(max_results) = config.search.max_results {
                client = client.with_max_results(max_results);
            }
            tracing::info!("📋 Search: {}", url);
            Arc::new(client)
        }
        None => {
            tracing::info!("📋 Search: offline guidance (no endpoint configured)");
            Arc::new(OfflineSearchClient)
        }
    }
}

fn narrative_generator(config: &TomlConfig) -> Arc<dyn NarrativeGenerator> {
    let narrative = &config.narrative;
    match &narrative.endpoint {
        Some(url) => {
            let mut endpoint = HttpEndpoint::new(url.clone()).with_api_key(narrative.api_key.clone());
            if let Some(timeout) = narrative.timeout_seconds {
                endpoint = endpoint.with_timeout(timeout);
            }
            let mut generator = HttpNarrativeGenerator::new(endpoint, narrative.model());
            if let Some(temperature) = narrative.temperature {
                generator = generator.with_temperature(temperature);
            }
            if let Some(chars) = narrative.max_context_chars {
                generator = generator.with_max_context_chars(chars);
            }
            tracing::info!("📋 Narrative: {} ({})", url, narrative.model());
            Arc::new(generator)
        }
        None => {
            tracing::info!("📋 Narrative: template summary (no endpoint configured)");
            Arc::new(TemplateNarrative)
        }
    }
}
