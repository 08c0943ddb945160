//! grievance_classify CLI
//!
//! Classifies the comment column of a delimited dataset and appends the results to the
//! configured output. Re-running with the same config resumes where the last run stopped.

use anyhow::Result;
use clap::Parser;
use grievance_classifier::{AppConfig, GrievanceClassifier};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "grievance_classify")]
#[command(version, about = "Batch classification of grievance comments", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level, overriding `logging.level` in the config (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging = config.logging.with_level(level);
    }
    config.logging.load_logger()?;

    tracing::info!("Loaded configuration from {}", cli.config.display());
    let summary = GrievanceClassifier::run(config).await?;
    println!("{summary}");
    Ok(())
}
