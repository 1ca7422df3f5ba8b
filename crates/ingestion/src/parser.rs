//! Frame parser
//!
//! Turns one raw device line into a [`TelemetryRecord`]. The device mixes
//! telemetry with boot banners and debug prints, so the JSON object is taken
//! from the first `{` to the last `}` of the line and everything around it is
//! ignored.
//!
//! Required fields (`sensors.temperature`, `sensors.humidity`, `sensors.ph`)
//! fail the whole frame when absent. Optional fields fall back to neutral
//! defaults and are listed in `TelemetryRecord::inferred_fields`.

use chrono::{DateTime, Utc};
use contracts::{IrrigationStatus, SensorReadings, SystemStatus, TelemetryRecord};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Wire frame as sent by the device
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensors: Option<WireSensors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    irrigation: Option<WireIrrigation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    system: Option<WireSystem>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireSensors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ph: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phosphorus: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    potassium: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireIrrigation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uptime: Option<u64>,
    #[serde(
        rename = "dailyActivations",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    daily_activations: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireSystem {
    #[serde(rename = "freeHeap", default, skip_serializing_if = "Option::is_none")]
    free_heap: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wifi: Option<String>,
}

/// Parse a line, stamping it with the current host time
pub fn parse(line: &str) -> Result<TelemetryRecord, ParseError> {
    parse_at(line, Utc::now())
}

/// Parse a line with an explicit arrival time
pub fn parse_at(line: &str, received_at: DateTime<Utc>) -> Result<TelemetryRecord, ParseError> {
    let json = extract_json(line).ok_or(ParseError::NoJsonFound)?;
    let frame: WireFrame =
        serde_json::from_str(json).map_err(|e| ParseError::MalformedJson(e.to_string()))?;
    build_record(frame, received_at)
}

/// Slice from the first `{` to the last `}`
pub fn extract_json(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    if start >= end {
        return None;
    }
    Some(&line[start..=end])
}

fn build_record(
    frame: WireFrame,
    received_at: DateTime<Utc>,
) -> Result<TelemetryRecord, ParseError> {
    let sensors = frame
        .sensors
        .ok_or_else(|| ParseError::MissingField("sensors".to_string()))?;
    let temperature = required(sensors.temperature, "temperature")?;
    let humidity = required(sensors.humidity, "humidity")?;
    let ph = required(sensors.ph, "ph")?;

    let mut inferred = Inferred::default();

    let sensors = SensorReadings {
        temperature,
        humidity,
        ph,
        phosphorus_present: inferred.or(sensors.phosphorus, "sensors.phosphorus", false),
        potassium_present: inferred.or(sensors.potassium, "sensors.potassium", false),
        device_timestamp: sensors.timestamp,
    };

    let irrigation = frame.irrigation.unwrap_or_default();
    let irrigation = IrrigationStatus {
        active: inferred.or(irrigation.active, "irrigation.active", false),
        uptime_seconds: inferred.or(irrigation.uptime, "irrigation.uptime", 0),
        daily_activation_count: inferred.or(
            irrigation.daily_activations,
            "irrigation.dailyActivations",
            0,
        ),
    };

    let system = frame.system.unwrap_or_default();
    let system = SystemStatus {
        free_heap_bytes: inferred.or(system.free_heap, "system.freeHeap", 0),
        uptime_seconds: inferred.or(system.uptime, "system.uptime", 0),
        link_status: inferred
            .or(system.wifi, "system.wifi", "Unknown".to_string())
            .into(),
    };

    Ok(TelemetryRecord {
        sensors,
        irrigation,
        system,
        received_at,
        inferred_fields: inferred.0,
    })
}

fn required(value: Option<f64>, field: &str) -> Result<f64, ParseError> {
    value.ok_or_else(|| ParseError::MissingField(field.to_string()))
}

/// Collects the wire paths that fell back to defaults
#[derive(Default)]
struct Inferred(Vec<String>);

impl Inferred {
    fn or<T>(&mut self, value: Option<T>, path: &str, default: T) -> T {
        value.unwrap_or_else(|| {
            self.0.push(path.to_string());
            default
        })
    }
}

/// Re-serialization of a record into the device wire shape
pub trait WireFormat {
    /// JSON object in the device wire shape; inferred fields are omitted
    fn to_wire_json(&self) -> String;
}

impl WireFormat for TelemetryRecord {
    fn to_wire_json(&self) -> String {
        let measured = |path: &str| !self.is_inferred(path);
        let sensors = &self.sensors;
        let irrigation = &self.irrigation;
        let system = &self.system;

        let frame = WireFrame {
            sensors: Some(WireSensors {
                temperature: Some(sensors.temperature),
                humidity: Some(sensors.humidity),
                ph: Some(sensors.ph),
                phosphorus: measured("sensors.phosphorus").then_some(sensors.phosphorus_present),
                potassium: measured("sensors.potassium").then_some(sensors.potassium_present),
                timestamp: sensors.device_timestamp,
            }),
            irrigation: Some(WireIrrigation {
                active: measured("irrigation.active").then_some(irrigation.active),
                uptime: measured("irrigation.uptime").then_some(irrigation.uptime_seconds),
                daily_activations: measured("irrigation.dailyActivations")
                    .then_some(irrigation.daily_activation_count),
            }),
            system: Some(WireSystem {
                free_heap: measured("system.freeHeap").then_some(system.free_heap_bytes),
                uptime: measured("system.uptime").then_some(system.uptime_seconds),
                wifi: measured("system.wifi").then(|| system.link_status.to_string()),
            }),
        };

        // Only plain maps/numbers/strings, serialization cannot fail
        serde_json::to_string(&frame).unwrap_or_default()
    }
}
