//! MemoryStore - in-process telemetry store for tests and dry runs

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use contracts::{
    period_start, AlertThresholds, IrrigationEvent, IrrigationEventType, StorageError,
    StorageStatistics, StoredAlert, StoredIrrigationEvent, StoredReading, TelemetryRecord,
    TelemetryStore,
};
use tracing::debug;

use crate::alerts::derive_alerts;

#[derive(Default)]
struct Tables {
    next_id: i64,
    readings: Vec<StoredReading>,
    system: Vec<(i64, TelemetryRecord)>,
    events: Vec<StoredIrrigationEvent>,
    alerts: Vec<StoredAlert>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory store
///
/// Cloning shares the same tables.
#[derive(Clone)]
pub struct MemoryStore {
    name: String,
    thresholds: AlertThresholds,
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
    write_delay_ms: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_thresholds(name, AlertThresholds::default())
    }

    pub fn with_thresholds(name: impl Into<String>, thresholds: AlertThresholds) -> Self {
        Self {
            name: name.into(),
            thresholds,
            tables: Arc::default(),
            unavailable: Arc::default(),
            write_delay_ms: Arc::default(),
        }
    }

    /// Make every write fail with `StorageError::Unavailable` until re-enabled
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sleep this long in every sensor reading insert
    pub fn set_write_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.write_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn reading_count(&self) -> usize {
        self.lock().readings.len()
    }

    pub fn system_stats_count(&self) -> usize {
        self.lock().system.len()
    }

    /// Irrigation events in insertion order
    pub fn events(&self) -> Vec<IrrigationEvent> {
        self.lock().events.iter().map(|e| e.event.clone()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(&self.name, "writes disabled"));
        }
        Ok(())
    }
}

impl TelemetryStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_sensor_reading(&self, record: &TelemetryRecord) -> Result<i64, StorageError> {
        let delay_ms = self.write_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        self.check_writable()?;
        let alerts = derive_alerts(&record.sensors, &self.thresholds);

        let mut tables = self.lock();
        let id = tables.next_id();
        tables.readings.push(StoredReading {
            id,
            timestamp: record.received_at,
            sensors: record.sensors,
        });
        for alert in alerts {
            let alert_id = tables.next_id();
            tables.alerts.push(StoredAlert {
                id: alert_id,
                timestamp: record.received_at,
                alert,
                resolved: false,
            });
        }
        Ok(id)
    }

    async fn insert_irrigation_event(&self, event: &IrrigationEvent) -> Result<i64, StorageError> {
        self.check_writable()?;
        let mut tables = self.lock();
        let id = tables.next_id();
        tables.events.push(StoredIrrigationEvent {
            id,
            event: event.clone(),
        });
        Ok(id)
    }

    async fn insert_system_stats(&self, record: &TelemetryRecord) -> Result<i64, StorageError> {
        self.check_writable()?;
        let mut tables = self.lock();
        let id = tables.next_id();
        tables.system.push((id, record.clone()));
        Ok(id)
    }

    async fn get_statistics(&self, period: Duration) -> Result<StorageStatistics, StorageError> {
        let since = period_start(Utc::now(), period);
        let tables = self.lock();
        let readings: Vec<_> = tables
            .readings
            .iter()
            .filter(|r| r.timestamp >= since)
            .map(|r| r.sensors)
            .collect();

        let (avg_temperature, min_temperature, max_temperature) =
            aggregate(readings.iter().map(|s| s.temperature));
        let (avg_humidity, min_humidity, max_humidity) =
            aggregate(readings.iter().map(|s| s.humidity));
        let (avg_ph, min_ph, max_ph) = aggregate(readings.iter().map(|s| s.ph));

        let stops = tables.events.iter().filter(|e| {
            e.event.event_type == IrrigationEventType::Stop && e.event.timestamp >= since
        });
        let (irrigation_count, total_irrigation_seconds) = stops
            .fold((0u64, 0u64), |(count, secs), e| {
                (count + 1, secs + e.event.duration_seconds.unwrap_or(0))
            });

        Ok(StorageStatistics {
            total_readings: readings.len() as u64,
            avg_temperature,
            min_temperature,
            max_temperature,
            avg_humidity,
            min_humidity,
            max_humidity,
            avg_ph,
            min_ph,
            max_ph,
            irrigation_count,
            total_irrigation_seconds,
        })
    }

    async fn active_alerts(&self) -> Result<Vec<StoredAlert>, StorageError> {
        let mut alerts: Vec<_> = self
            .lock()
            .alerts
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| {
            b.alert
                .severity
                .cmp(&a.alert.severity)
                .then(b.timestamp.cmp(&a.timestamp))
                .then(b.id.cmp(&a.id))
        });
        Ok(alerts)
    }

    async fn resolve_alert(&self, alert_id: i64) -> Result<bool, StorageError> {
        let mut tables = self.lock();
        match tables
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && !a.resolved)
        {
            Some(alert) => {
                alert.resolved = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn irrigation_history(
        &self,
        period: Duration,
    ) -> Result<Vec<StoredIrrigationEvent>, StorageError> {
        let since = period_start(Utc::now(), period);
        let mut events: Vec<_> = self
            .lock()
            .events
            .iter()
            .filter(|e| e.event.timestamp >= since)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            b.event
                .timestamp
                .cmp(&a.event.timestamp)
                .then(b.id.cmp(&a.id))
        });
        Ok(events)
    }

    async fn latest_readings(&self, limit: usize) -> Result<Vec<StoredReading>, StorageError> {
        let mut readings = self.lock().readings.clone();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        readings.truncate(limit);
        Ok(readings)
    }

    async fn cleanup(&self, retention: Duration) -> Result<u64, StorageError> {
        let before = period_start(Utc::now(), retention);
        let mut tables = self.lock();
        let initial = tables.readings.len() + tables.system.len() + tables.alerts.len();

        tables.readings.retain(|r| r.timestamp >= before);
        tables.system.retain(|(_, r)| r.received_at >= before);
        tables.alerts.retain(|a| !a.resolved || a.timestamp >= before);

        let removed = initial - (tables.readings.len() + tables.system.len() + tables.alerts.len());
        debug!(store = %self.name, removed, "memory cleanup finished");
        Ok(removed as u64)
    }
}

fn aggregate(values: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>, Option<f64>) {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        count += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    if count == 0 {
        return (None, None, None);
    }
    (Some(sum / count as f64), Some(min), Some(max))
}
