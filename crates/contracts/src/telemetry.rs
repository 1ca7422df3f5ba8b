//! TelemetryRecord - Frame parser / simulator output
//!
//! Validated sample from the soil monitoring device.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw line read from the device channel
///
/// Lives only until the parser has looked at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Line text without the trailing newline
    pub text: String,

    /// Host clock at arrival
    pub received_at: DateTime<Utc>,
}

impl RawLine {
    /// Create a line stamped with the current host time
    pub fn new(text: impl Into<String>) -> Self {
        Self::at(text, Utc::now())
    }

    /// Create a line with an explicit arrival time
    pub fn at(text: impl Into<String>, received_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            received_at,
        }
    }
}

/// Unit of work carried by the ingestion queue
///
/// Live and replay links produce raw lines, the simulator skips the
/// parser and produces records directly.
#[derive(Debug, Clone)]
pub enum LinkItem {
    /// Unparsed line from a byte stream
    Raw(RawLine),

    /// Already-typed record
    Record(TelemetryRecord),
}

impl LinkItem {
    /// Host arrival time of the item
    pub fn received_at(&self) -> DateTime<Utc> {
        match self {
            Self::Raw(line) => line.received_at,
            Self::Record(record) => record.received_at,
        }
    }
}

/// Validated telemetry sample
///
/// Never built from partially parsed data. Optional wire fields that were
/// absent are filled with neutral defaults and listed in `inferred_fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Soil sensor block
    pub sensors: SensorReadings,

    /// Irrigation controller block
    pub irrigation: IrrigationStatus,

    /// Device health block
    pub system: SystemStatus,

    /// Host clock at arrival, authoritative for ordering
    pub received_at: DateTime<Utc>,

    /// Wire paths (e.g. `system.freeHeap`) that were defaulted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inferred_fields: Vec<String>,
}

impl TelemetryRecord {
    /// Whether the given wire path was filled with a default
    pub fn is_inferred(&self, field: &str) -> bool {
        self.inferred_fields.iter().any(|f| f == field)
    }
}

/// Soil sensor readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReadings {
    /// Soil temperature (°C)
    pub temperature: f64,

    /// Soil moisture (%, 0-100)
    pub humidity: f64,

    /// Soil pH (0-14)
    pub ph: f64,

    /// Phosphorus detected
    pub phosphorus_present: bool,

    /// Potassium detected
    pub potassium_present: bool,

    /// Device clock (epoch millis), may be skewed or missing
    pub device_timestamp: Option<i64>,
}

/// Irrigation controller state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrrigationStatus {
    /// Pump/valve currently on
    pub active: bool,

    /// Seconds the current activation has been running (device clock)
    pub uptime_seconds: u64,

    /// Activations since the device's daily reset
    pub daily_activation_count: u64,
}

/// Device health
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub free_heap_bytes: u64,
    pub uptime_seconds: u64,
    pub link_status: LinkStatus,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            free_heap_bytes: 0,
            uptime_seconds: 0,
            link_status: LinkStatus::Unknown,
        }
    }
}

/// Network status reported by the device (`system.wifi` on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LinkStatus {
    Connected,
    Disconnected,
    /// Field absent on the wire
    Unknown,
    /// Any other device-specific status text
    Other(String),
}

impl LinkStatus {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Unknown => "Unknown",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for LinkStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Connected" => Self::Connected,
            "Disconnected" => Self::Disconnected,
            "Unknown" => Self::Unknown,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for LinkStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<LinkStatus> for String {
    fn from(value: LinkStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
