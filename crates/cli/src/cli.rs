//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Soil Monitor - telemetry ingestion for the soil monitoring device
#[derive(Parser, Debug)]
#[command(
    name = "soil-monitor",
    author,
    version,
    about = "Soil telemetry ingestion pipeline",
    long_about = "Reads telemetry from a soil monitoring device (serial, TCP bridge, \n\
                  simulator or captured log), derives irrigation sessions and alerts, \n\
                  and persists everything to SQLite."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "SOIL_MONITOR_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "SOIL_MONITOR_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitoring pipeline until interrupted
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Print a report from an existing database
    Report(ReportArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); defaults apply when absent
    #[arg(short, long, env = "SOIL_MONITOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serial device path or tcp://host:port of a serial bridge (selects live mode)
    #[arg(long, env = "SOIL_MONITOR_DEVICE")]
    pub device: Option<String>,

    /// Serial baud rate
    #[arg(long, env = "SOIL_MONITOR_BAUD")]
    pub baud: Option<u32>,

    /// SQLite database path
    #[arg(long, env = "SOIL_MONITOR_DB")]
    pub db: Option<PathBuf>,

    /// Use the built-in device simulator
    #[arg(long, conflicts_with_all = ["device", "replay"])]
    pub simulate: bool,

    /// Replay a captured serial log instead of reading a device
    #[arg(long, conflicts_with = "device")]
    pub replay: Option<PathBuf>,

    /// Directory for the final report
    #[arg(long, env = "SOIL_MONITOR_REPORT_DIR")]
    pub report_dir: Option<PathBuf>,

    /// Stop after this many seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "SOIL_MONITOR_DURATION")]
    pub duration: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "SOIL_MONITOR_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "soil_monitor.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file; defaults are shown when absent
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show alert thresholds
    #[arg(long)]
    pub alerts: bool,
}

/// Arguments for the `report` command
#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// SQLite database path
    #[arg(long, default_value = "soil_monitoring.db", env = "SOIL_MONITOR_DB")]
    pub db: PathBuf,

    /// Report period in hours
    #[arg(long, default_value = "24")]
    pub hours: u64,

    /// Write the report into this directory instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
