//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DeviceMode, MonitorBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    mode: &'static str,
    device: String,
    database: String,
    queue_capacity: usize,
    retention_days: u32,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            error: Some(format!("File not found: {config_path}")),
            config_path,
            warnings: Vec::new(),
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: collect_warnings(&blueprint),
            summary: Some(ConfigSummary {
                version: format!("{:?}", blueprint.version),
                mode: blueprint.device.mode.as_str(),
                device: device_description(&blueprint),
                database: blueprint.storage.path.display().to_string(),
                queue_capacity: blueprint.pipeline.queue_capacity,
                retention_days: blueprint.storage.retention_days,
            }),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

fn device_description(blueprint: &MonitorBlueprint) -> String {
    match blueprint.device.mode {
        DeviceMode::Live => format!(
            "{} @ {} baud",
            blueprint.device.address, blueprint.device.baud_rate
        ),
        DeviceMode::Simulated => format!("simulator every {} ms", blueprint.simulator.interval_ms),
        DeviceMode::Replay => blueprint
            .replay
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &MonitorBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.storage.path.as_os_str() == storage::MEMORY_PATH {
        warnings.push("storage.path is ':memory:' - data is lost on exit".to_string());
    }
    if !blueprint.pipeline.report_dir.is_dir() {
        warnings.push(format!(
            "pipeline.report_dir '{}' does not exist yet - it is created on shutdown",
            blueprint.pipeline.report_dir.display()
        ));
    }
    if blueprint.storage.cleanup_interval() > blueprint.storage.retention() {
        warnings.push("storage.cleanup_interval_secs exceeds the retention period".to_string());
    }
    if blueprint.device.mode == DeviceMode::Simulated && blueprint.simulator.seed.is_none() {
        warnings.push("simulator.seed not set - simulated data is not reproducible".to_string());
    }
    if blueprint.device.mode != DeviceMode::Replay && blueprint.replay.path.is_some() {
        warnings.push("replay.path is set but device.mode is not 'replay'".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Mode: {}", summary.mode);
            println!("  Device: {}", summary.device);
            println!("  Database: {}", summary.database);
            println!("  Queue capacity: {}", summary.queue_capacity);
            println!("  Retention: {} days", summary.retention_days);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
