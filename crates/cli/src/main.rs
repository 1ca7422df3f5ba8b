//! # Soil Monitor CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading, overrides and validation
//! - Pipeline lifecycle with graceful shutdown
//! - Periodic mini-reports, retention cleanup and the final JSON report

mod cli;
mod commands;
mod error;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_monitor, run_report, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: log_level(&cli).to_string(),
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "Soil Monitor starting");

    let result = match &cli.command {
        Commands::Run(args) => run_monitor(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::Report(args) => run_report(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

fn log_level(cli: &Cli) -> &'static str {
    if cli.quiet {
        return "warn";
    }
    match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
