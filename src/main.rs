//! Operational CLI, grounded on the teacher's `clap`-derived `main.rs`:
//! exposes the §6 inbound interfaces directly for use without the
//! (out-of-scope) HTTP surface.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use logamizer::config::PipelineConfig;
use logamizer::dal::SqlxStore;
use logamizer::pipeline::PipelineDriver;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logamizer", version, about = "HTTP log ingest and analytics pipeline")]
struct Cli {
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, global = true, default_value = "info", env = "LOGAMIZER_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one already-uploaded log file.
    Ingest {
        #[arg(long)]
        log_file_id: String,
    },
    /// Recompute aggregates and anomaly findings over a time window.
    Reanalyze {
        #[arg(long)]
        site_id: String,
        #[arg(long)]
        from: DateTime<Utc>,
        #[arg(long)]
        to: DateTime<Utc>,
    },
    /// Run only the error grouper for one log file.
    AnalyzeErrors {
        #[arg(long)]
        log_file_id: String,
    },
    /// Parse and validate a configuration file without running anything.
    ValidateConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> logamizer::Result<()> {
    match cli.command {
        Commands::ValidateConfig { config } => {
            let path = config.unwrap_or(cli.config);
            let parsed = PipelineConfig::load(&path)?;
            parsed.validate()?;
            info!(path = %path.display(), "configuration is valid");
            Ok(())
        }
        Commands::Ingest { log_file_id } => {
            let config = PipelineConfig::load(&cli.config)?;
            let store = Arc::new(SqlxStore::connect(&config.database.url).await?);
            let driver = PipelineDriver::new(store);
            let outcome = driver.run_ingest(&log_file_id).await?;
            info!(
                findings = outcome.findings.len(),
                success_rate = outcome.quality.success_rate(),
                hours_touched = outcome.hours_touched,
                "ingest finished"
            );
            Ok(())
        }
        Commands::Reanalyze { site_id, from, to } => {
            let config = PipelineConfig::load(&cli.config)?;
            let store = Arc::new(SqlxStore::connect(&config.database.url).await?);
            let driver = PipelineDriver::new(store);
            let findings = driver.reanalyze(&site_id, from, to).await?;
            info!(findings = findings.len(), "reanalysis finished");
            Ok(())
        }
        Commands::AnalyzeErrors { log_file_id } => {
            let config = PipelineConfig::load(&cli.config)?;
            let store = Arc::new(SqlxStore::connect(&config.database.url).await?);
            let driver = PipelineDriver::new(store);
            let occurrences = driver.analyze_errors(&log_file_id).await?;
            info!(occurrences, "error analysis finished");
            Ok(())
        }
    }
}
