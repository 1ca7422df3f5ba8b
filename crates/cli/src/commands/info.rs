//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{AlertThresholds, DeviceMode, MonitorBlueprint};
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    version: String,
    device: DeviceInfo,
    storage: StorageInfo,
    pipeline: &'a contracts::PipelineConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    alerts: Option<&'a AlertThresholds>,
}

#[derive(Serialize)]
struct DeviceInfo {
    mode: &'static str,
    source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    baud_rate: Option<u32>,
    interval_ms: Option<u64>,
}

#[derive(Serialize)]
struct StorageInfo {
    path: String,
    retention_days: u32,
    cleanup_interval_secs: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = ?args.config, "Loading configuration info");

    let blueprint = load_blueprint(args.config.as_deref()).context("Failed to load config")?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info<'a>(blueprint: &'a MonitorBlueprint, args: &InfoArgs) -> ConfigInfo<'a> {
    let device = &blueprint.device;
    let device = match device.mode {
        DeviceMode::Live => DeviceInfo {
            mode: device.mode.as_str(),
            source: device.address.clone(),
            baud_rate: Some(device.baud_rate),
            interval_ms: None,
        },
        DeviceMode::Simulated => DeviceInfo {
            mode: device.mode.as_str(),
            source: "simulator".to_string(),
            baud_rate: None,
            interval_ms: Some(blueprint.simulator.interval_ms),
        },
        DeviceMode::Replay => DeviceInfo {
            mode: device.mode.as_str(),
            source: blueprint
                .replay
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            baud_rate: None,
            interval_ms: Some(blueprint.replay.interval_ms),
        },
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        device,
        storage: StorageInfo {
            path: blueprint.storage.path.display().to_string(),
            retention_days: blueprint.storage.retention_days,
            cleanup_interval_secs: blueprint.storage.cleanup_interval_secs,
        },
        pipeline: &blueprint.pipeline,
        alerts: args.alerts.then_some(&blueprint.alerts),
    }
}

fn print_config_info(blueprint: &MonitorBlueprint, args: &InfoArgs) {
    let info = build_config_info(blueprint, args);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                Soil Monitor Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📡 Device");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Mode: {}", info.device.mode);
    if let Some(baud) = info.device.baud_rate {
        println!("   ├─ Baud rate: {}", baud);
    }
    if let Some(interval) = info.device.interval_ms {
        println!("   ├─ Interval: {} ms", interval);
    }
    println!("   └─ Source: {}", info.device.source);

    println!("\n💾 Storage");
    println!("   ├─ Database: {}", info.storage.path);
    println!("   ├─ Retention: {} days", info.storage.retention_days);
    println!(
        "   └─ Cleanup every: {}s",
        info.storage.cleanup_interval_secs
    );

    let pipeline = info.pipeline;
    println!("\n⚙️  Pipeline");
    println!("   ├─ Queue capacity: {}", pipeline.queue_capacity);
    println!("   ├─ Poll interval: {} ms", pipeline.poll_interval_ms);
    println!("   ├─ Shutdown timeout: {} ms", pipeline.shutdown_timeout_ms);
    println!("   ├─ Status report every: {}s", pipeline.report_interval_secs);
    println!("   └─ Report dir: {}", pipeline.report_dir.display());

    if let Some(alerts) = info.alerts {
        println!("\n🚨 Alert thresholds");
        println!(
            "   ├─ Temperature: {} .. {} °C",
            alerts.temperature_low, alerts.temperature_high
        );
        println!(
            "   ├─ pH: {} .. {} (critical outside {} .. {})",
            alerts.ph_low, alerts.ph_high, alerts.ph_critical_low, alerts.ph_critical_high
        );
        println!(
            "   └─ Humidity: {} .. {} %",
            alerts.humidity_low, alerts.humidity_high
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_info_json() {
        let blueprint = MonitorBlueprint::default();
        let args = InfoArgs {
            config: None,
            json: true,
            alerts: true,
        };
        let info = build_config_info(&blueprint, &args);
        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(value["device"]["mode"], "live");
        assert_eq!(value["device"]["baud_rate"], 115200);
        assert_eq!(value["pipeline"]["queue_capacity"], 100);
        assert_eq!(value["alerts"]["temperature_high"], 35.0);
    }

    #[test]
    fn test_alerts_hidden_by_default() {
        let blueprint = MonitorBlueprint::simulated();
        let args = InfoArgs {
            config: None,
            json: true,
            alerts: false,
        };
        let value = serde_json::to_value(build_config_info(&blueprint, &args)).unwrap();
        assert!(value.get("alerts").is_none());
        assert_eq!(value["device"]["source"], "simulator");
    }
}
