//! `run` command implementation.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use config_loader::ConfigLoader;
use contracts::{DeviceMode, MonitorBlueprint, StorageStatistics, TelemetryStore};
use pipeline::{Coordinator, PipelineStatistics, ShutdownStatus};
use storage::SqliteStore;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::load_blueprint;
use crate::cli::RunArgs;

/// Period covered by the final report
const FINAL_REPORT_PERIOD: Duration = Duration::from_secs(24 * 3600);

/// Period of the averages in the end-of-run summary
const SUMMARY_PERIOD: Duration = Duration::from_secs(3600);

/// How often the main loop checks that the link reading loop is alive
const LINK_CHECK_PERIOD: Duration = Duration::from_millis(500);

/// Execute the `run` command
pub async fn run_monitor(args: &RunArgs) -> Result<()> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;
    apply_overrides(&mut blueprint, args);
    ConfigLoader::validate(&blueprint).context("Invalid configuration after CLI overrides")?;

    info!(
        mode = blueprint.device.mode.as_str(),
        address = %blueprint.device.address,
        baud_rate = blueprint.device.baud_rate,
        db = %blueprint.storage.path.display(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let store = SqliteStore::open(&blueprint.storage.path, blueprint.alerts)
        .await
        .with_context(|| {
            format!(
                "Failed to open database {}",
                blueprint.storage.path.display()
            )
        })?;
    let store = Arc::new(store);
    let retention = blueprint.storage.retention();
    run_cleanup(store.as_ref(), retention).await;

    let mut coordinator = Coordinator::from_blueprint(&blueprint, Arc::clone(&store));
    coordinator
        .start()
        .await
        .context("Failed to start monitoring pipeline")?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let deadline = (args.duration > 0).then(|| Instant::now() + Duration::from_secs(args.duration));
    let mut report_timer = ticker(blueprint.pipeline.report_interval());
    let mut cleanup_timer = ticker(blueprint.storage.cleanup_interval());
    let mut link_timer = ticker(LINK_CHECK_PERIOD);
    let mut link_lost = false;

    info!("Monitoring started, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping pipeline...");
                break;
            }
            _ = sleep_until(deadline) => {
                info!(duration_secs = args.duration, "Run duration elapsed");
                break;
            }
            _ = tick(&mut report_timer) => {
                log_mini_report(&coordinator, store.as_ref()).await;
            }
            _ = tick(&mut cleanup_timer) => {
                run_cleanup(store.as_ref(), retention).await;
            }
            _ = tick(&mut link_timer) => {
                if coordinator.link_alive() {
                    continue;
                }
                if matches!(blueprint.device.mode, DeviceMode::Replay) {
                    info!("Replay finished, stopping pipeline");
                } else {
                    error!(link = %coordinator.link().description(), "Device link ended, stopping pipeline");
                    link_lost = true;
                }
                break;
            }
        }
    }

    let stats = coordinator.stop().await;
    if let Some(ShutdownStatus::Degraded(reason)) = coordinator.shutdown_status() {
        warn!(reason = %reason, "Shutdown was degraded");
    }

    match coordinator.generate_report(FINAL_REPORT_PERIOD).await {
        Ok(report) => {
            if let Err(e) = report.write_to_dir(&blueprint.pipeline.report_dir) {
                warn!(error = %e, "Failed to write final report");
            }
        }
        Err(e) => warn!(error = %e, "Failed to generate final report"),
    }

    let last_hour = match store.get_statistics(SUMMARY_PERIOD).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(error = %e, "Failed to read last-hour statistics");
            None
        }
    };
    print_summary(&stats, last_hour.as_ref());

    if link_lost {
        anyhow::bail!("Device link ended before the run was stopped");
    }

    info!("Soil Monitor finished");
    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(blueprint: &mut MonitorBlueprint, args: &RunArgs) {
    if let Some(ref device) = args.device {
        info!(device = %device, "Overriding device from CLI");
        blueprint.device.mode = DeviceMode::Live;
        blueprint.device.address = device.clone();
    }
    if let Some(baud) = args.baud {
        info!(baud, "Overriding baud rate from CLI");
        blueprint.device.baud_rate = baud;
    }
    if let Some(ref db) = args.db {
        info!(db = %db.display(), "Overriding database path from CLI");
        blueprint.storage.path = db.clone();
    }
    if let Some(ref replay) = args.replay {
        info!(path = %replay.display(), "Replaying captured log");
        blueprint.device.mode = DeviceMode::Replay;
        blueprint.replay.path = Some(replay.clone());
    }
    if args.simulate {
        info!("Running with the device simulator");
        blueprint.device.mode = DeviceMode::Simulated;
    }
    if let Some(ref dir) = args.report_dir {
        blueprint.pipeline.report_dir = dir.clone();
    }
}

/// Delete data past retention; failures are logged only
async fn run_cleanup<S: TelemetryStore + Sync>(store: &S, retention: Duration) {
    match store.cleanup(retention).await {
        Ok(removed) => info!(removed, "Retention cleanup done"),
        Err(e) => warn!(error = %e, "Retention cleanup failed"),
    }
}

async fn log_mini_report<S: TelemetryStore + Sync + 'static>(
    coordinator: &Coordinator<S>,
    store: &S,
) {
    let stats = coordinator.statistics();
    let latest = store.latest_readings(1).await.ok().and_then(|mut r| r.pop());
    let active_alerts = store.active_alerts().await.map(|a| a.len()).unwrap_or_default();

    match latest {
        Some(reading) => info!(
            received = stats.readings_received,
            stored = stats.readings_stored,
            errors = stats.errors,
            active_alerts,
            temperature = reading.sensors.temperature,
            humidity = reading.sensors.humidity,
            ph = reading.sensors.ph,
            "Status report"
        ),
        None => info!(
            received = stats.readings_received,
            stored = stats.readings_stored,
            errors = stats.errors,
            active_alerts,
            "Status report (no readings yet)"
        ),
    }
}

/// Repeating timer, `None` for a zero period
fn ticker(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &MonitorBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Device:");
    println!("  Mode: {}", blueprint.device.mode.as_str());
    match blueprint.device.mode {
        DeviceMode::Live => {
            println!("  Address: {}", blueprint.device.address);
            println!("  Baud rate: {}", blueprint.device.baud_rate);
        }
        DeviceMode::Simulated => {
            println!("  Interval: {} ms", blueprint.simulator.interval_ms);
        }
        DeviceMode::Replay => {
            if let Some(ref path) = blueprint.replay.path {
                println!("  Capture: {}", path.display());
            }
            println!("  Interval: {} ms", blueprint.replay.interval_ms);
        }
    }
    println!("\nStorage:");
    println!("  Database: {}", blueprint.storage.path.display());
    println!("  Retention: {} days", blueprint.storage.retention_days);
    println!("\nPipeline:");
    println!("  Queue capacity: {}", blueprint.pipeline.queue_capacity);
    println!("  Report dir: {}", blueprint.pipeline.report_dir.display());
    println!();
}

/// Print the end-of-run statistics
fn print_summary(stats: &PipelineStatistics, last_hour: Option<&StorageStatistics>) {
    let runtime = stats.runtime(Utc::now());

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Soil Monitor Statistics                     ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📊 Overview");
    println!("   ├─ Runtime: {:.1}s", runtime.as_secs_f64());
    println!("   ├─ Readings received: {}", stats.readings_received);
    println!("   ├─ Readings stored: {}", stats.readings_stored);
    println!(
        "   ├─ Failures: {} ({} readings lost, {} partial writes)",
        stats.failures(),
        stats.errors,
        stats.partial_writes
    );
    println!("   ├─ Ignored lines: {}", stats.lines_ignored);
    println!("   ├─ Irrigation events: {}", stats.events_stored);
    println!("   └─ Success rate: {:.1}%", stats.success_rate());

    println!("\n🌱 This run");
    println!("   ├─ Temperature (°C): {}", stats.sensors.temperature);
    println!("   ├─ Humidity (%): {}", stats.sensors.humidity);
    println!("   └─ pH: {}", stats.sensors.ph);

    if let Some(last_hour) = last_hour {
        let fmt = |v: Option<f64>| v.map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}"));
        println!("\n🕐 Last hour ({} readings)", last_hour.total_readings);
        println!("   ├─ Avg temperature: {}°C", fmt(last_hour.avg_temperature));
        println!("   ├─ Avg humidity: {}%", fmt(last_hour.avg_humidity));
        println!("   ├─ Avg pH: {}", fmt(last_hour.avg_ph));
        println!(
            "   └─ Irrigation: {} sessions, {}s",
            last_hour.irrigation_count, last_hour.total_irrigation_seconds
        );
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["run"];
        argv.extend_from_slice(extra);
        RunArgs::parse_from(argv)
    }

    #[test]
    fn test_device_override_selects_live() {
        let mut blueprint = MonitorBlueprint::simulated();
        apply_overrides(&mut blueprint, &run_args(&["--device", "tcp://10.0.0.5:4000"]));
        assert_eq!(blueprint.device.mode, DeviceMode::Live);
        assert_eq!(blueprint.device.address, "tcp://10.0.0.5:4000");
        assert!(ConfigLoader::validate(&blueprint).is_ok());
    }

    #[test]
    fn test_simulate_and_db_overrides() {
        let mut blueprint = MonitorBlueprint::default();
        apply_overrides(
            &mut blueprint,
            &run_args(&["--simulate", "--db", "bench.db", "--baud", "9600"]),
        );
        assert_eq!(blueprint.device.mode, DeviceMode::Simulated);
        assert_eq!(blueprint.storage.path, std::path::PathBuf::from("bench.db"));
        assert_eq!(blueprint.device.baud_rate, 9600);
    }

    #[test]
    fn test_replay_override() {
        let mut blueprint = MonitorBlueprint::default();
        apply_overrides(&mut blueprint, &run_args(&["--replay", "capture.log"]));
        assert_eq!(blueprint.device.mode, DeviceMode::Replay);
        assert!(blueprint.replay.path.is_some());
    }

    #[test]
    fn test_zero_period_disables_ticker() {
        assert!(ticker(Duration::ZERO).is_none());
    }

    #[tokio::test]
    async fn test_simulated_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("monitor.db");
        let args = run_args(&[
            "--simulate",
            "--db",
            db.to_str().unwrap(),
            "--report-dir",
            dir.path().to_str().unwrap(),
            "--duration",
            "1",
        ]);

        run_monitor(&args).await.unwrap();

        let reports: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("report_"))
            .collect();
        assert_eq!(reports.len(), 1);
        assert!(db.exists());
    }
}
