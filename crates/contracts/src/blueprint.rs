//! MonitorBlueprint - Config Loader output
//!
//! Describes one monitoring deployment: which device link to open, where to
//! persist, how the pipeline is tuned and which alert thresholds apply.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AlertThresholds;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete monitor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MonitorBlueprint {
    pub version: ConfigVersion,

    /// Device link selection
    #[validate(nested)]
    pub device: DeviceConfig,

    /// Simulated link tuning
    #[validate(nested)]
    pub simulator: SimulatorConfig,

    /// Replay link tuning
    #[validate(nested)]
    pub replay: ReplayConfig,

    /// Storage backend
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Worker / queue / shutdown tuning
    #[validate(nested)]
    pub pipeline: PipelineConfig,

    /// Threshold alert limits
    pub alerts: AlertThresholds,
}

/// Which device link variant to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    /// Serial port or `tcp://host:port` bridge
    #[default]
    Live,
    /// Synthetic records, no hardware
    Simulated,
    /// Captured serial log played back
    Replay,
}

impl DeviceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Simulated => "simulated",
            Self::Replay => "replay",
        }
    }
}

/// Device link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DeviceConfig {
    pub mode: DeviceMode,

    /// Serial device path (e.g. `/dev/ttyUSB0`) or `tcp://host:port`
    pub address: String,

    #[validate(range(min = 300, max = 4_000_000))]
    pub baud_rate: u32,

    /// Read timeout of the blocking reader, also bounds stop latency
    #[validate(range(min = 1, max = 60_000))]
    pub read_timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::Live,
            address: "/dev/ttyUSB0".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 1000,
        }
    }
}

impl DeviceConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Shortest period handed to a timer
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Simulated link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Time between synthetic records
    #[validate(range(min = 1))]
    pub interval_ms: u64,

    /// RNG seed, random when absent
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Never shorter than `MIN_TICK`, also for unvalidated blueprints
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms).max(MIN_TICK)
    }
}

/// Replay link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReplayConfig {
    /// Captured serial log, one line per frame
    pub path: Option<PathBuf>,

    /// Time between replayed lines
    #[validate(range(min = 1))]
    pub interval_ms: u64,

    /// Restart from the beginning at end of file
    pub loop_playback: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: None,
            interval_ms: 500,
            loop_playback: false,
        }
    }
}

impl ReplayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms).max(MIN_TICK)
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file, `:memory:` for a throwaway database
    pub path: PathBuf,

    /// Data older than this is removed by cleanup
    #[validate(range(min = 1, max = 3650))]
    pub retention_days: u32,

    /// Period of the background retention cleanup
    #[validate(range(min = 1))]
    pub cleanup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("soil_monitoring.db"),
            retention_days: 30,
            cleanup_interval_secs: 6 * 60 * 60,
        }
    }
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ingestion queue capacity
    #[validate(range(min = 1, max = 1_000_000))]
    pub queue_capacity: usize,

    /// Worker pop timeout, bounds cancellation latency
    #[validate(range(min = 1, max = 10_000))]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for the worker during stop
    #[validate(range(min = 1))]
    pub shutdown_timeout_ms: u64,

    /// Upper bound on waiting for the link reading loop during stop
    #[validate(range(min = 1))]
    pub link_stop_timeout_ms: u64,

    /// Period of the mini-report logged while running
    #[validate(range(min = 1))]
    pub report_interval_secs: u64,

    /// Directory receiving the final report file
    pub report_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            poll_interval_ms: 250,
            shutdown_timeout_ms: 5000,
            link_stop_timeout_ms: 2000,
            report_interval_secs: 60,
            report_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_TICK)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn link_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.link_stop_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

impl MonitorBlueprint {
    /// Blueprint for a simulated device with an in-memory database
    pub fn simulated() -> Self {
        let mut blueprint = Self::default();
        blueprint.device.mode = DeviceMode::Simulated;
        blueprint.storage.path = PathBuf::from(":memory:");
        blueprint
    }
}
