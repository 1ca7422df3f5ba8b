//! Read-only monitoring report

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{StorageStatistics, StoredAlert, TelemetryStore};
use serde::Serialize;
use tracing::info;

use crate::error::{CoordinatorError, Result};
use crate::stats::PipelineStatistics;

/// Alerts detailed in a report
pub const REPORT_TOP_ALERTS: usize = 5;

/// Report over a trailing period
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub generated_at: DateTime<Utc>,
    pub period_hours: f64,
    /// Storage aggregates over the period
    pub statistics: StorageStatistics,
    /// Unresolved alerts, all periods
    pub active_alerts: usize,
    /// Most severe, most recent unresolved alerts
    pub top_alerts: Vec<StoredAlert>,
    /// Irrigation events in the period
    pub irrigation_events: usize,
    /// In-memory statistics of the running pipeline, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineStatistics>,
    /// Pipeline `errors` plus `partial_writes`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_failures: Option<u64>,
}

/// Build a report from the store; never writes
pub async fn build_report<S>(
    store: &S,
    period: Duration,
    pipeline: Option<PipelineStatistics>,
) -> Result<PipelineReport>
where
    S: TelemetryStore + Sync,
{
    let statistics = store.get_statistics(period).await?;
    let mut alerts = store.active_alerts().await?;
    let active_alerts = alerts.len();
    alerts.truncate(REPORT_TOP_ALERTS);
    let irrigation_events = store.irrigation_history(period).await?.len();

    Ok(PipelineReport {
        generated_at: Utc::now(),
        period_hours: period.as_secs_f64() / 3600.0,
        statistics,
        active_alerts,
        top_alerts: alerts,
        irrigation_events,
        pipeline_failures: pipeline.as_ref().map(PipelineStatistics::failures),
        pipeline,
    })
}

impl PipelineReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoordinatorError::Report(e.to_string()))
    }

    /// File name `report_<YYYYmmdd_HHMMSS>.json` from the generation time
    pub fn file_name(&self) -> String {
        format!("report_{}.json", self.generated_at.format("%Y%m%d_%H%M%S"))
    }

    /// Write the report as pretty JSON into `dir`, returning the file path
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            CoordinatorError::Report(format!("cannot create {}: {e}", dir.display()))
        })?;

        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_json_pretty()?).map_err(|e| {
            CoordinatorError::Report(format!("cannot write {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), "report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        IrrigationEvent, IrrigationStatus, SensorReadings, SystemStatus, TelemetryRecord, Trigger,
    };
    use storage::MemoryStore;

    fn hot_acidic_record() -> TelemetryRecord {
        TelemetryRecord {
            sensors: SensorReadings {
                temperature: 38.0,
                humidity: 20.0,
                ph: 4.0,
                phosphorus_present: true,
                potassium_present: true,
                device_timestamp: None,
            },
            irrigation: IrrigationStatus::default(),
            system: SystemStatus::default(),
            received_at: Utc::now(),
            inferred_fields: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_report_caps_alert_details() {
        let store = MemoryStore::new("mem");
        // three alerts per reading
        for _ in 0..3 {
            store.insert_sensor_reading(&hot_acidic_record()).await.unwrap();
        }
        store
            .insert_irrigation_event(&IrrigationEvent::start(Utc::now(), Trigger::Auto, Some(20.0)))
            .await
            .unwrap();

        let report = build_report(&store, Duration::from_secs(24 * 3600), None)
            .await
            .unwrap();
        assert_eq!(report.statistics.total_readings, 3);
        assert_eq!(report.active_alerts, 9);
        assert_eq!(report.top_alerts.len(), REPORT_TOP_ALERTS);
        assert_eq!(report.irrigation_events, 1);
        assert_eq!(report.period_hours, 24.0);

        let json = report.to_json_pretty().unwrap();
        assert!(!json.contains("\"pipeline\""));
        assert!(!json.contains("pipeline_failures"));
        assert!(json.contains("\"active_alerts\": 9"));
    }

    #[tokio::test]
    async fn test_write_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new("mem");
        let pipeline = PipelineStatistics {
            readings_received: 3,
            readings_stored: 2,
            errors: 1,
            partial_writes: 2,
            ..Default::default()
        };
        let report = build_report(&store, Duration::from_secs(3600), Some(pipeline))
            .await
            .unwrap();

        let path = report.write_to_dir(dir.path().join("reports")).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("report_") && name.ends_with(".json"));
        assert_eq!(name.len(), "report_20240101_120000.json".len());

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["statistics"]["total_readings"], 0);
        assert!(value["pipeline"].is_object());
        assert_eq!(value["pipeline"]["errors"], 1);
        assert_eq!(value["pipeline"]["partial_writes"], 2);
        assert_eq!(value["pipeline_failures"], 3);
    }
}
