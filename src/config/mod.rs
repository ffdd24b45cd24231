pub mod cli;
#[cfg(feature = "s3")]
pub mod s3;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "compliance-etl")]
#[command(about = "340B compliance risk detection: evaluate customer metrics and write a risk report")]
pub struct CliArgs {
    #[arg(short, long, default_value = "compliance.toml")]
    pub config: String,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log process resource usage after each stage")]
    pub monitor: bool,

    #[arg(long, help = "Override [output].output_path")]
    pub output_path: Option<String>,

    #[arg(long, help = "Validate configuration and print the run plan without executing")]
    pub dry_run: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}
