//! TelemetryStore trait - storage collaborator interface
//!
//! The pipeline only persists through this interface and stays agnostic to
//! the engine behind it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{IrrigationEvent, SensorReadings, StorageError, StoredAlert, TelemetryRecord};

/// Append-only telemetry persistence
///
/// Every call is potentially blocking I/O; callers await each write before
/// issuing the next one.
#[trait_variant::make(TelemetryStore: Send)]
pub trait LocalTelemetryStore {
    /// Store name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Persist the sensor block of a record and any alerts it raises
    ///
    /// # Errors
    /// Returns a storage error with context; nothing is persisted on failure.
    async fn insert_sensor_reading(&self, record: &TelemetryRecord) -> Result<i64, StorageError>;

    /// Persist a derived irrigation event
    async fn insert_irrigation_event(&self, event: &IrrigationEvent) -> Result<i64, StorageError>;

    /// Persist the system/irrigation health block of a record
    async fn insert_system_stats(&self, record: &TelemetryRecord) -> Result<i64, StorageError>;

    /// Aggregate statistics over the trailing `period`
    async fn get_statistics(&self, period: Duration) -> Result<StorageStatistics, StorageError>;

    /// Unresolved alerts, most severe first then most recent first
    async fn active_alerts(&self) -> Result<Vec<StoredAlert>, StorageError>;

    /// Mark an alert resolved, returns false if no such unresolved alert
    async fn resolve_alert(&self, alert_id: i64) -> Result<bool, StorageError>;

    /// Irrigation events in the trailing `period`, most recent first
    async fn irrigation_history(
        &self,
        period: Duration,
    ) -> Result<Vec<StoredIrrigationEvent>, StorageError>;

    /// Most recent readings, newest first
    async fn latest_readings(&self, limit: usize) -> Result<Vec<StoredReading>, StorageError>;

    /// Delete data older than `retention`, returns the number of removed rows
    async fn cleanup(&self, retention: Duration) -> Result<u64, StorageError>;
}

/// Aggregates over a period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageStatistics {
    pub total_readings: u64,
    pub avg_temperature: Option<f64>,
    pub min_temperature: Option<f64>,
    pub max_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub min_humidity: Option<f64>,
    pub max_humidity: Option<f64>,
    pub avg_ph: Option<f64>,
    pub min_ph: Option<f64>,
    pub max_ph: Option<f64>,
    /// Completed irrigation sessions (`stop` events)
    pub irrigation_count: u64,
    /// Sum of known session durations
    pub total_irrigation_seconds: u64,
}

/// Persisted sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub sensors: SensorReadings,
}

/// Persisted irrigation event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredIrrigationEvent {
    pub id: i64,
    #[serde(flatten)]
    pub event: IrrigationEvent,
}

/// Convert a retention/report period into a cutoff instant
pub fn period_start(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    match chrono::Duration::from_std(period) {
        Ok(d) => now.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC),
        Err(_) => DateTime::<Utc>::MIN_UTC,
    }
}
