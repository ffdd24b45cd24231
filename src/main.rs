use clap::Parser;
use compliance_etl::app::{build_controller, write_report, WriteOptions};
use compliance_etl::utils::error::{ComplianceError, ErrorSeverity};
use compliance_etl::utils::{logger, validation::Validate};
use compliance_etl::{CliArgs, ComplianceReport, LocalStorage, TomlConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    if args.json_logs || config.json_logs() {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting compliance risk run");
    tracing::info!("📁 Configuration: {}", args.config);

    if let Some(output_path) = &args.output_path {
        config.output.output_path = output_path.clone();
        tracing::info!("🔧 Output path overridden to: {}", output_path);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    display_config_summary(&config);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No collaborators will be called");
        return Ok(());
    }

    let monitor_enabled = args.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let controller = match build_controller(&config).await {
        Ok(controller) => controller.with_monitoring(monitor_enabled),
        Err(e) => exit_with(e),
    };

    let outcome = controller.run().await;
    tracing::info!("📊 Execution summary: {}", outcome.execution_summary());

    for diagnostic in &outcome.diagnostics {
        tracing::warn!(
            "⚠️ [{}] {:?}: {}",
            diagnostic.stage,
            diagnostic.kind,
            diagnostic.message
        );
    }

    let report = match outcome.into_result() {
        Ok(report) => report,
        Err(e) => exit_with(e),
    };

    match persist(&config, &report).await {
        Ok(paths) => {
            println!("✅ Compliance run completed successfully!");
            for path in paths {
                println!("📁 {}/{}", config.output_path(), path);
            }
            let flagged = report.high_risk_customers();
            if !flagged.is_empty() {
                println!("🚩 High risk customers: {}", flagged.join(", "));
            }
            if !report.diagnostics.is_empty() {
                println!("⚠️ {} diagnostic(s) recorded; see the report", report.diagnostics.len());
            }
        }
        Err(e) => exit_with(e),
    }

    Ok(())
}

async fn persist(config: &TomlConfig, report: &ComplianceReport) -> compliance_etl::Result<Vec<String>> {
    let options = WriteOptions {
        report_name: config.report_name().to_string(),
        formats: config.output.formats.clone(),
        bundle: config.bundle_enabled(),
    };

    if let Some(bucket) = &config.output.bucket {
        return persist_to_s3(config, bucket, report, &options).await;
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    write_report(&storage, report, &options).await
}

#[cfg(feature = "s3")]
async fn persist_to_s3(
    config: &TomlConfig,
    bucket: &str,
    report: &ComplianceReport,
    options: &WriteOptions,
) -> compliance_etl::Result<Vec<String>> {
    let region = config
        .output
        .region
        .as_deref()
        .unwrap_or(compliance_etl::config::toml_config::DEFAULT_REGION);
    let storage = compliance_etl::S3Storage::connect(bucket, region)
        .await?
        .with_prefix(config.output_path());
    write_report(&storage, report, options).await
}

#[cfg(not(feature = "s3"))]
async fn persist_to_s3(
    _config: &TomlConfig,
    bucket: &str,
    _report: &ComplianceReport,
    _options: &WriteOptions,
) -> compliance_etl::Result<Vec<String>> {
    Err(ComplianceError::ConfigError {
        message: format!("output.bucket = \"{}\" requires building with the `s3` feature", bucket),
    })
}

fn display_config_summary(config: &TomlConfig) {
    tracing::info!("📋 Configuration Summary:");
    tracing::info!("   Pipeline: {} v{}", config.pipeline.name, config.pipeline.version);
    if !config.pipeline.description.is_empty() {
        tracing::info!("   Description: {}", config.pipeline.description);
    }
    tracing::info!("   Metrics: {}", config.metrics.describe());
    tracing::info!("   Knowledge: {}", config.knowledge.describe());
    tracing::info!(
        "   Search: {}",
        config.search.endpoint.as_deref().unwrap_or("offline guidance")
    );
    tracing::info!(
        "   Narrative: {}",
        config.narrative.endpoint.as_deref().unwrap_or("template summary")
    );
    tracing::info!("   Workers: {}", config.workers());
    tracing::info!(
        "   Output: {} ({}{})",
        config.output_path(),
        config.output.formats.join(", "),
        if config.bundle_enabled() { ", zip" } else { "" }
    );
}

fn exit_with(e: ComplianceError) -> ! {
    tracing::error!(
        "❌ Compliance run failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
