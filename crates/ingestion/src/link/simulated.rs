//! Simulated device: synthetic telemetry without hardware

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contracts::{
    IrrigationStatus, LinkItem, LinkStatus, SensorReadings, SimulatorConfig, SystemStatus,
    TelemetryRecord,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Notify;
use tracing::{debug, info, trace};

use crate::queue::QueueProducer;

/// Chance per tick that the pump changes state
const TOGGLE_PROBABILITY: f64 = 0.2;

/// Simulated link settings
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    pub(crate) interval: Duration,
    pub(crate) seed: Option<u64>,
}

impl SimulatedLink {
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            interval: config.interval(),
            seed: config.seed,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Synthetic record generator
///
/// Values stay in plausible field ranges: temperature 15-30 °C,
/// humidity 20-70 %, pH 5-8, all rounded to one decimal.
pub struct TelemetrySimulator {
    rng: StdRng,
    irrigation_active: bool,
    activation_started: u64,
    daily_activations: u64,
    ticks: u64,
    tick_seconds: u64,
}

impl TelemetrySimulator {
    pub fn new(seed: Option<u64>, interval: Duration) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Self {
            rng,
            irrigation_active: false,
            activation_started: 0,
            daily_activations: 0,
            ticks: 0,
            tick_seconds: interval.as_secs().max(1),
        }
    }

    /// Produce the next record
    pub fn next_record(&mut self) -> TelemetryRecord {
        self.ticks += 1;
        let device_uptime = self.ticks * self.tick_seconds;

        if self.rng.random_bool(TOGGLE_PROBABILITY) {
            self.irrigation_active = !self.irrigation_active;
            if self.irrigation_active {
                self.daily_activations += 1;
                self.activation_started = device_uptime;
            }
        }
        let irrigation_uptime = if self.irrigation_active {
            device_uptime - self.activation_started
        } else {
            0
        };

        let received_at = Utc::now();
        TelemetryRecord {
            sensors: SensorReadings {
                temperature: round1(self.rng.random_range(15.0..30.0)),
                humidity: round1(self.rng.random_range(20.0..70.0)),
                ph: round1(self.rng.random_range(5.0..8.0)),
                phosphorus_present: self.rng.random_bool(0.5),
                potassium_present: self.rng.random_bool(0.5),
                device_timestamp: Some(received_at.timestamp_millis()),
            },
            irrigation: IrrigationStatus {
                active: self.irrigation_active,
                uptime_seconds: irrigation_uptime,
                daily_activation_count: self.daily_activations,
            },
            system: SystemStatus {
                free_heap_bytes: self.rng.random_range(100_000..200_000),
                uptime_seconds: device_uptime,
                link_status: LinkStatus::Connected,
            },
            received_at,
            inferred_fields: Vec::new(),
        }
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Async production loop, first record is produced immediately
pub(crate) async fn simulate_loop(
    link: SimulatedLink,
    producer: QueueProducer,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
) {
    let mut simulator = TelemetrySimulator::new(link.seed, link.interval);
    let mut ticker = tokio::time::interval(link.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(interval_ms = link.interval.as_millis() as u64, "simulated device started");

    let mut produced = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.notified() => break,
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }

        let record = simulator.next_record();
        trace!(temperature = record.sensors.temperature, "simulated record");
        if producer.push(LinkItem::Record(record)).await.is_err() {
            debug!("queue closed, stopping simulator");
            break;
        }
        produced += 1;
    }

    info!(produced, "simulated device stopped");
}
