//! SQLite telemetry store
//!
//! One connection behind a mutex; every call runs on the blocking pool.
//! Timestamps are stored as fixed-width RFC 3339 UTC text so that string
//! comparison orders them chronologically.

mod migrations;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use contracts::{
    period_start, Alert, AlertThresholds, IrrigationEvent, SensorReadings, StorageError,
    StorageStatistics, StoredAlert, StoredIrrigationEvent, StoredReading, TelemetryRecord,
    TelemetryStore,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument};

use crate::alerts::derive_alerts;

/// In-memory database path
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    name: String,
    path: Arc<PathBuf>,
    conn: Arc<Mutex<Connection>>,
    thresholds: AlertThresholds,
}

impl SqliteStore {
    /// Open (or create) the database and apply migrations
    ///
    /// `:memory:` opens a private in-memory database.
    #[instrument(name = "sqlite_store_open", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(
        path: impl AsRef<Path>,
        thresholds: AlertThresholds,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();

        let conn = tokio::task::spawn_blocking(move || open_connection(&open_path))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        info!("sqlite store ready");
        Ok(Self {
            name: format!("sqlite:{}", path.display()),
            path: Arc::new(path),
            conn: Arc::new(Mutex::new(conn)),
            thresholds,
        })
    }

    /// Private in-memory database
    pub async fn in_memory(thresholds: AlertThresholds) -> Result<Self, StorageError> {
        Self::open(MEMORY_PATH, thresholds).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a closure against the connection on the blocking pool
    async fn execute<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = match conn.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn open_connection(path: &Path) -> Result<Connection, StorageError> {
    let mut conn = if path.as_os_str() == MEMORY_PATH {
        Connection::open_in_memory().map_err(sql("open"))?
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Other(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(sql("open"))?;
        // WAL is unavailable for some filesystems; the default journal still works
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            debug!(error = %e, "WAL journal mode not enabled");
        }
        conn
    };
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(sql("busy_timeout"))?;
    migrations::run_migrations(&mut conn)?;
    Ok(conn)
}

/// Map a rusqlite error into a storage error tagged with the operation
pub(crate) fn sql(operation: &'static str) -> impl Fn(rusqlite::Error) -> StorageError {
    move |e| StorageError::sqlite(operation, e)
}

fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn cutoff(period: Duration) -> String {
    ts(&period_start(Utc::now(), period))
}

fn int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn unsigned(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const ALERT_COLUMNS: &str =
    "id, timestamp, alert_type, severity, message, sensor_value, threshold_value, resolved";

fn row_to_alert(row: &Row<'_>) -> rusqlite::Result<StoredAlert> {
    Ok(StoredAlert {
        id: row.get(0)?,
        timestamp: parse_ts(row, 1)?,
        alert: Alert {
            kind: parse_enum(row, 2)?,
            severity: parse_enum(row, 3)?,
            message: row.get(4)?,
            sensor_value: row.get(5)?,
            threshold_value: row.get(6)?,
        },
        resolved: row.get(7)?,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StoredIrrigationEvent> {
    let duration: Option<i64> = row.get(3)?;
    Ok(StoredIrrigationEvent {
        id: row.get(0)?,
        event: IrrigationEvent {
            timestamp: parse_ts(row, 1)?,
            event_type: parse_enum(row, 2)?,
            duration_seconds: duration.map(unsigned),
            trigger: parse_enum(row, 4)?,
            moisture_at_event: row.get(5)?,
        },
    })
}

fn row_to_reading(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    Ok(StoredReading {
        id: row.get(0)?,
        timestamp: parse_ts(row, 1)?,
        sensors: SensorReadings {
            temperature: row.get(2)?,
            humidity: row.get(3)?,
            ph: row.get(4)?,
            phosphorus_present: row.get(5)?,
            potassium_present: row.get(6)?,
            device_timestamp: row.get(7)?,
        },
    })
}

impl TelemetryStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_sensor_reading(&self, record: &TelemetryRecord) -> Result<i64, StorageError> {
        let timestamp = ts(&record.received_at);
        let sensors = record.sensors;
        let inferred = record.inferred_fields.join(",");
        let alerts = derive_alerts(&sensors, &self.thresholds);

        self.execute(move |conn| {
            let tx = conn.transaction().map_err(sql("begin reading"))?;
            tx.execute(
                "INSERT INTO sensor_readings (
                    timestamp, temperature, humidity, ph,
                    phosphorus, potassium, device_timestamp, inferred_fields
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    timestamp,
                    sensors.temperature,
                    sensors.humidity,
                    sensors.ph,
                    sensors.phosphorus_present,
                    sensors.potassium_present,
                    sensors.device_timestamp,
                    inferred,
                ],
            )
            .map_err(sql("insert sensor reading"))?;
            let id = tx.last_insert_rowid();

            for alert in &alerts {
                tx.execute(
                    "INSERT INTO alerts (
                        timestamp, alert_type, severity, severity_rank,
                        message, sensor_value, threshold_value
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        timestamp,
                        alert.kind.as_str(),
                        alert.severity.as_str(),
                        alert.severity.rank(),
                        alert.message,
                        alert.sensor_value,
                        alert.threshold_value,
                    ],
                )
                .map_err(sql("insert alert"))?;
            }

            tx.commit().map_err(sql("commit reading"))?;
            Ok(id)
        })
        .await
    }

    async fn insert_irrigation_event(&self, event: &IrrigationEvent) -> Result<i64, StorageError> {
        let event = event.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO irrigation_events (
                    timestamp, event_type, duration_seconds, trigger_type, moisture_at_event
                ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    ts(&event.timestamp),
                    event.event_type.as_str(),
                    event.duration_seconds.map(int),
                    event.trigger.as_str(),
                    event.moisture_at_event,
                ],
            )
            .map_err(sql("insert irrigation event"))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn insert_system_stats(&self, record: &TelemetryRecord) -> Result<i64, StorageError> {
        let timestamp = ts(&record.received_at);
        let system = record.system.clone();
        let irrigation = record.irrigation;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO system_stats (
                    timestamp, free_heap, uptime, wifi_status,
                    irrigation_active, irrigation_uptime, daily_activations
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    timestamp,
                    int(system.free_heap_bytes),
                    int(system.uptime_seconds),
                    system.link_status.as_str(),
                    irrigation.active,
                    int(irrigation.uptime_seconds),
                    int(irrigation.daily_activation_count),
                ],
            )
            .map_err(sql("insert system stats"))?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_statistics(&self, period: Duration) -> Result<StorageStatistics, StorageError> {
        let since = cutoff(period);
        self.execute(move |conn| {
            let mut stats = conn
                .query_row(
                    "SELECT COUNT(*),
                        AVG(temperature), MIN(temperature), MAX(temperature),
                        AVG(humidity), MIN(humidity), MAX(humidity),
                        AVG(ph), MIN(ph), MAX(ph)
                     FROM sensor_readings WHERE timestamp >= ?1",
                    params![since],
                    |row| {
                        Ok(StorageStatistics {
                            total_readings: unsigned(row.get(0)?),
                            avg_temperature: row.get(1)?,
                            min_temperature: row.get(2)?,
                            max_temperature: row.get(3)?,
                            avg_humidity: row.get(4)?,
                            min_humidity: row.get(5)?,
                            max_humidity: row.get(6)?,
                            avg_ph: row.get(7)?,
                            min_ph: row.get(8)?,
                            max_ph: row.get(9)?,
                            ..Default::default()
                        })
                    },
                )
                .map_err(sql("reading statistics"))?;

            let (count, seconds): (i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(duration_seconds), 0)
                     FROM irrigation_events
                     WHERE event_type = 'stop' AND timestamp >= ?1",
                    params![since],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(sql("irrigation statistics"))?;
            stats.irrigation_count = unsigned(count);
            stats.total_irrigation_seconds = unsigned(seconds);
            Ok(stats)
        })
        .await
    }

    async fn active_alerts(&self) -> Result<Vec<StoredAlert>, StorageError> {
        self.execute(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {ALERT_COLUMNS} FROM alerts
                     WHERE resolved = 0
                     ORDER BY severity_rank DESC, timestamp DESC, id DESC"
                ))
                .map_err(sql("prepare active alerts"))?;
            let alerts = stmt
                .query_map([], row_to_alert)
                .map_err(sql("query active alerts"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql("read active alerts"))?;
            Ok(alerts)
        })
        .await
    }

    async fn resolve_alert(&self, alert_id: i64) -> Result<bool, StorageError> {
        self.execute(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE alerts SET resolved = 1 WHERE id = ?1 AND resolved = 0",
                    params![alert_id],
                )
                .map_err(sql("resolve alert"))?;
            Ok(changed > 0)
        })
        .await
    }

    async fn irrigation_history(
        &self,
        period: Duration,
    ) -> Result<Vec<StoredIrrigationEvent>, StorageError> {
        let since = cutoff(period);
        self.execute(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, timestamp, event_type, duration_seconds, trigger_type, moisture_at_event
                     FROM irrigation_events
                     WHERE timestamp >= ?1
                     ORDER BY timestamp DESC, id DESC",
                )
                .map_err(sql("prepare irrigation history"))?;
            let events = stmt
                .query_map(params![since], row_to_event)
                .map_err(sql("query irrigation history"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql("read irrigation history"))?;
            Ok(events)
        })
        .await
    }

    async fn latest_readings(&self, limit: usize) -> Result<Vec<StoredReading>, StorageError> {
        let limit = int(limit as u64);
        self.execute(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, timestamp, temperature, humidity, ph,
                        phosphorus, potassium, device_timestamp
                     FROM sensor_readings
                     ORDER BY timestamp DESC, id DESC
                     LIMIT ?1",
                )
                .map_err(sql("prepare latest readings"))?;
            let readings = stmt
                .query_map(params![limit], row_to_reading)
                .map_err(sql("query latest readings"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql("read latest readings"))?;
            Ok(readings)
        })
        .await
    }

    async fn cleanup(&self, retention: Duration) -> Result<u64, StorageError> {
        let before = cutoff(retention);
        let removed = self
            .execute(move |conn| {
                let tx = conn.transaction().map_err(sql("begin cleanup"))?;
                let mut removed = 0usize;
                for statement in [
                    "DELETE FROM sensor_readings WHERE timestamp < ?1",
                    "DELETE FROM system_stats WHERE timestamp < ?1",
                    "DELETE FROM alerts WHERE resolved = 1 AND timestamp < ?1",
                ] {
                    removed += tx
                        .execute(statement, params![before])
                        .map_err(sql("cleanup"))?;
                }
                tx.commit().map_err(sql("commit cleanup"))?;
                Ok(removed as u64)
            })
            .await?;
        info!(store = %self.name, removed, "retention cleanup finished");
        Ok(removed)
    }
}

impl SqliteStore {
    /// Alert by id, resolved or not
    pub async fn alert(&self, alert_id: i64) -> Result<Option<StoredAlert>, StorageError> {
        self.execute(move |conn| {
            conn.query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                params![alert_id],
                row_to_alert,
            )
            .optional()
            .map_err(sql("get alert"))
        })
        .await
    }
}
