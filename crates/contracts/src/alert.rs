//! Threshold alerts raised on sensor readings

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighTemperature,
    LowTemperature,
    PhOutOfRange,
    LowHumidity,
    HighHumidity,
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Alert derived from one reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub sensor_value: f64,
    pub threshold_value: f64,
}

/// Alert as persisted by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub alert: Alert,
    pub resolved: bool,
}

/// Alert thresholds
///
/// Defaults match the agronomic limits the device firmware was tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Above this (°C) raises `high_temperature`
    pub temperature_high: f64,
    /// Below this (°C) raises `low_temperature`
    pub temperature_low: f64,
    /// Ideal pH band lower bound
    pub ph_low: f64,
    /// Ideal pH band upper bound
    pub ph_high: f64,
    /// Below this the pH alert is critical
    pub ph_critical_low: f64,
    /// Above this the pH alert is critical
    pub ph_critical_high: f64,
    /// Reference value stored with pH alerts
    pub ph_target: f64,
    /// Below this (%) raises `low_humidity`
    pub humidity_low: f64,
    /// Above this (%) raises `high_humidity`
    pub humidity_high: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            temperature_high: 35.0,
            temperature_low: 15.0,
            ph_low: 6.0,
            ph_high: 8.0,
            ph_critical_low: 5.0,
            ph_critical_high: 9.0,
            ph_target: 7.0,
            humidity_low: 30.0,
            humidity_high: 70.0,
        }
    }
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighTemperature => "high_temperature",
            Self::LowTemperature => "low_temperature",
            Self::PhOutOfRange => "ph_out_of_range",
            Self::LowHumidity => "low_humidity",
            Self::HighHumidity => "high_humidity",
        }
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    /// Numeric rank, used for ordering in SQL
    pub fn rank(&self) -> i64 {
        match self {
            Self::Info => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_temperature" => Ok(Self::HighTemperature),
            "low_temperature" => Ok(Self::LowTemperature),
            "ph_out_of_range" => Ok(Self::PhOutOfRange),
            "low_humidity" => Ok(Self::LowHumidity),
            "high_humidity" => Ok(Self::HighHumidity),
            other => Err(ContractError::Other(format!("unknown alert kind '{other}'"))),
        }
    }
}

impl FromStr for Severity {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(ContractError::Other(format!("unknown severity '{other}'"))),
        }
    }
}
