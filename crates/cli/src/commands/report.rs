//! `report` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::AlertThresholds;
use pipeline::build_report;
use storage::SqliteStore;
use tracing::info;

use crate::cli::ReportArgs;
use crate::error::CliError;

/// Execute the `report` command
///
/// Read-only: never starts the pipeline and never deletes data.
pub async fn run_report(args: &ReportArgs) -> Result<()> {
    if !args.db.exists() {
        return Err(CliError::database_not_found(args.db.display().to_string()).into());
    }

    let store = SqliteStore::open(&args.db, AlertThresholds::default())
        .await
        .map_err(CliError::from)?;
    let period = Duration::from_secs(args.hours.saturating_mul(3600));
    let report = build_report(&store, period, None)
        .await
        .map_err(CliError::from)?;

    match &args.output {
        Some(dir) => {
            let path = report.write_to_dir(dir).map_err(CliError::from)?;
            info!(path = %path.display(), hours = args.hours, "Report written");
        }
        None => {
            let json = report.to_json_pretty().context("Failed to render report")?;
            println!("{}", json);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::{
        IrrigationStatus, SensorReadings, SystemStatus, TelemetryRecord, TelemetryStore,
    };

    #[tokio::test]
    async fn test_report_from_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("soil.db");
        {
            let store = SqliteStore::open(&db, AlertThresholds::default()).await.unwrap();
            store
                .insert_sensor_reading(&TelemetryRecord {
                    sensors: SensorReadings {
                        temperature: 21.0,
                        humidity: 45.0,
                        ph: 6.9,
                        phosphorus_present: true,
                        potassium_present: true,
                        device_timestamp: None,
                    },
                    irrigation: IrrigationStatus::default(),
                    system: SystemStatus::default(),
                    received_at: Utc::now(),
                    inferred_fields: Vec::new(),
                })
                .await
                .unwrap();
        }

        let out = dir.path().join("out");
        let args = ReportArgs {
            db: db.clone(),
            hours: 24,
            output: Some(out.clone()),
        };
        run_report(&args).await.unwrap();
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_missing_database() {
        let args = ReportArgs {
            db: "/nonexistent/soil.db".into(),
            hours: 1,
            output: None,
        };
        assert!(run_report(&args).await.is_err());
    }
}
