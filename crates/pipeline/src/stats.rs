//! Pipeline statistics

use std::time::Duration;

use chrono::{DateTime, Utc};
use observability::SensorSummary;
use serde::Serialize;

/// Counters of one coordinator, written by the worker only
///
/// Every record that reaches the worker ends up either stored or counted
/// as an error, so `readings_stored == readings_received - errors`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStatistics {
    /// First successful start
    pub start_time: Option<DateTime<Utc>>,

    /// Records that entered processing (raw lines with JSON, or simulated)
    pub readings_received: u64,

    /// Sensor readings persisted
    pub readings_stored: u64,

    /// Irrigation events persisted
    pub events_stored: u64,

    /// Readings lost: parse failures plus failed sensor reading writes
    ///
    /// A reading that was stored never counts here, even if a follow-up
    /// write failed; see `partial_writes`.
    pub errors: u64,

    /// Lines without any JSON object
    pub lines_ignored: u64,

    /// Failed follow-up writes of stored readings
    ///
    /// Counts system stats and irrigation event inserts that failed after
    /// the sensor reading itself was persisted.
    pub partial_writes: u64,

    /// Items evicted from a full queue
    pub items_dropped: u64,

    /// Arrival time of the last stored reading
    pub last_reading_at: Option<DateTime<Utc>>,

    /// Sensor values of the stored readings
    pub sensors: SensorSummary,
}

impl PipelineStatistics {
    /// Stored share of received readings, in percent
    pub fn success_rate(&self) -> f64 {
        if self.readings_received == 0 {
            return 0.0;
        }
        self.readings_stored as f64 / self.readings_received as f64 * 100.0
    }

    /// Every failed item or write, lost readings and partial writes alike
    pub fn failures(&self) -> u64 {
        self.errors + self.partial_writes
    }

    /// Time since the first start
    pub fn runtime(&self, now: DateTime<Utc>) -> Duration {
        self.start_time
            .and_then(|start| (now - start).to_std().ok())
            .unwrap_or_default()
    }
}
