//! IrrigationEvent - State tracker output

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Irrigation boundary kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationEventType {
    Start,
    Stop,
}

/// What caused the irrigation to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Controller reacted to dry soil
    Auto,
    /// Started while soil was not dry, assumed operator action
    Manual,
    Unknown,
}

/// Irrigation start/stop event
///
/// Only the state tracker creates these; raw telemetry never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrrigationEvent {
    pub event_type: IrrigationEventType,

    /// Host clock of the transition
    pub timestamp: DateTime<Utc>,

    /// Session length, present only on `stop`
    pub duration_seconds: Option<u64>,

    pub trigger: Trigger,

    /// Soil moisture (%) observed on the transition record
    pub moisture_at_event: Option<f64>,
}

impl IrrigationEvent {
    /// Create a `start` event
    pub fn start(timestamp: DateTime<Utc>, trigger: Trigger, moisture: Option<f64>) -> Self {
        Self {
            event_type: IrrigationEventType::Start,
            timestamp,
            duration_seconds: None,
            trigger,
            moisture_at_event: moisture,
        }
    }

    /// Create a `stop` event
    pub fn stop(
        timestamp: DateTime<Utc>,
        duration_seconds: Option<u64>,
        moisture: Option<f64>,
    ) -> Self {
        Self {
            event_type: IrrigationEventType::Stop,
            timestamp,
            duration_seconds,
            trigger: Trigger::Unknown,
            moisture_at_event: moisture,
        }
    }
}

impl IrrigationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for IrrigationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IrrigationEventType {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(ContractError::Other(format!(
                "unknown irrigation event type '{other}'"
            ))),
        }
    }
}

impl FromStr for Trigger {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "unknown" => Ok(Self::Unknown),
            other => Err(ContractError::Other(format!("unknown trigger '{other}'"))),
        }
    }
}
