//! Pipeline metrics
//!
//! Thin helpers over the `metrics` facade plus an in-memory aggregator of
//! sensor values for end-of-run summaries. Without an installed recorder
//! every helper is a no-op.

use contracts::SensorReadings;
use metrics::{counter, gauge, histogram};
use serde::Serialize;

/// A telemetry record entered the worker (raw line with JSON, or simulated)
pub fn record_reading_received(source: &str) {
    counter!(
        "soil_monitor_readings_received_total",
        "source" => source.to_string()
    )
    .increment(1);
}

/// Sensor reading persisted
pub fn record_reading_stored(sensors: &SensorReadings) {
    counter!("soil_monitor_readings_stored_total").increment(1);
    gauge!("soil_monitor_temperature_celsius").set(sensors.temperature);
    gauge!("soil_monitor_humidity_percent").set(sensors.humidity);
    gauge!("soil_monitor_ph").set(sensors.ph);
}

/// Frame rejected by the parser (`malformed_json`, `missing_field`)
pub fn record_parse_error(kind: &str) {
    counter!(
        "soil_monitor_parse_errors_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Line without a JSON object
pub fn record_line_ignored() {
    counter!("soil_monitor_lines_ignored_total").increment(1);
}

/// Failed store write
pub fn record_storage_failure(operation: &str, kind: &str) {
    counter!(
        "soil_monitor_storage_failures_total",
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Items waiting in the ingestion queue
pub fn record_queue_depth(depth: usize) {
    gauge!("soil_monitor_queue_depth").set(depth as f64);
}

/// Time spent handling one queue item, storage included
pub fn record_item_latency_ms(latency_ms: f64) {
    histogram!("soil_monitor_item_latency_ms").record(latency_ms);
}

/// Online mean/variance/min/max (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean, `None` without samples
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// Summary of one running statistic
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min().unwrap_or_default(),
            max: stats.max().unwrap_or_default(),
            mean: stats.mean().unwrap_or_default(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "mean={:.2}, min={:.2}, max={:.2}, std={:.2} (n={})",
                self.mean, self.min, self.max, self.std_dev, self.count
            )
        }
    }
}

/// Aggregates sensor values of the readings seen in one run
#[derive(Debug, Clone, Default)]
pub struct SensorAggregator {
    pub temperature: RunningStats,
    pub humidity: RunningStats,
    pub ph: RunningStats,
}

impl SensorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, sensors: &SensorReadings) {
        self.temperature.push(sensors.temperature);
        self.humidity.push(sensors.humidity);
        self.ph.push(sensors.ph);
    }

    pub fn summary(&self) -> SensorSummary {
        SensorSummary {
            temperature: StatsSummary::from(&self.temperature),
            humidity: StatsSummary::from(&self.humidity),
            ph: StatsSummary::from(&self.ph),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-sensor summaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorSummary {
    pub temperature: StatsSummary,
    pub humidity: StatsSummary,
    pub ph: StatsSummary,
}

impl std::fmt::Display for SensorSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Temperature (°C): {}", self.temperature)?;
        writeln!(f, "Humidity (%): {}", self.humidity)?;
        writeln!(f, "pH: {}", self.ph)
    }
}
