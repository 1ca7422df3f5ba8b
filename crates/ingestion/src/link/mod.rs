//! Device link - owns the channel to the soil monitoring device
//!
//! One link type with three variants chosen at construction:
//! - `Live`: serial port or `tcp://host:port` bridge, blocking reader thread
//! - `Simulated`: synthetic records from an async task
//! - `Replay`: captured serial log played back from a blocking thread
//!
//! Lifecycle: `connect` -> `start_reading` -> (`get_data`)* -> `stop_reading` -> `disconnect`.

mod lines;
mod live;
mod replay;
mod simulated;

use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{DeviceMode, LinkItem, MonitorBlueprint};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

pub use live::{LiveEndpoint, LiveLink};
pub use replay::ReplayLink;
pub use simulated::{SimulatedLink, TelemetrySimulator};

use crate::error::{LinkError, Result};
use crate::queue::{DropPolicy, IngestionQueue, QueueConsumer, QueueSnapshot};

/// Link variant
#[derive(Debug, Clone)]
pub enum LinkKind {
    Live(LiveLink),
    Simulated(SimulatedLink),
    Replay(ReplayLink),
}

impl LinkKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Simulated(_) => "simulated",
            Self::Replay(_) => "replay",
        }
    }

    /// Full-queue policy of this variant's producer
    pub fn drop_policy(&self) -> DropPolicy {
        match self {
            Self::Simulated(_) => DropPolicy::DropOldest,
            Self::Live(_) | Self::Replay(_) => DropPolicy::Block,
        }
    }
}

/// Channel opened by `connect`, consumed by `start_reading`
enum Connection {
    Stream(live::ByteStream),
    Capture(File),
    Synthetic,
}

/// Running reading loop
struct ReadingTask {
    queue: IngestionQueue,
    consumer: QueueConsumer,
    running: Arc<AtomicBool>,
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Device link
pub struct DeviceLink {
    kind: LinkKind,
    description: String,
    queue_capacity: usize,
    connection: Option<Connection>,
    reading: Option<ReadingTask>,
}

impl DeviceLink {
    /// Create a link of the given variant
    pub fn new(kind: LinkKind, queue_capacity: usize) -> Self {
        let description = match &kind {
            LinkKind::Live(live) => live.address.clone(),
            LinkKind::Simulated(_) => "simulator".to_string(),
            LinkKind::Replay(replay) => replay.path.display().to_string(),
        };
        Self {
            kind,
            description,
            queue_capacity: queue_capacity.max(1),
            connection: None,
            reading: None,
        }
    }

    /// Build the variant selected by the blueprint
    pub fn from_blueprint(blueprint: &MonitorBlueprint) -> Self {
        let kind = match blueprint.device.mode {
            DeviceMode::Live => LinkKind::Live(LiveLink::new(&blueprint.device)),
            DeviceMode::Simulated => {
                LinkKind::Simulated(SimulatedLink::new(&blueprint.simulator))
            }
            DeviceMode::Replay => LinkKind::Replay(ReplayLink::new(
                blueprint.replay.path.clone().unwrap_or_default(),
                &blueprint.replay,
            )),
        };
        Self::new(kind, blueprint.pipeline.queue_capacity)
    }

    pub fn kind(&self) -> &LinkKind {
        &self.kind
    }

    /// Address, capture path or `simulator`
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some() || self.reading.is_some()
    }

    pub fn is_reading(&self) -> bool {
        self.reading.is_some()
    }

    /// Reading loop started and not yet finished on its own
    ///
    /// A loop ends without `stop_reading` when the device closes the stream,
    /// a replay reaches the end of its capture, or the task panics.
    pub fn is_alive(&self) -> bool {
        self.reading
            .as_ref()
            .is_some_and(|reading| !reading.handle.is_finished())
    }

    /// Open the channel
    ///
    /// Connecting an already connected link is a no-op.
    #[instrument(name = "link_connect", skip(self), fields(kind = self.kind.name(), link = %self.description))]
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("link already connected");
            return Ok(());
        }

        let connection = match &self.kind {
            LinkKind::Live(live) => {
                let live = live.clone();
                let stream = tokio::task::spawn_blocking(move || live.open())
                    .await
                    .map_err(|e| LinkError::connect(&self.description, e))??;
                Connection::Stream(stream)
            }
            LinkKind::Replay(replay) => Connection::Capture(replay.open()?),
            LinkKind::Simulated(_) => Connection::Synthetic,
        };

        self.connection = Some(connection);
        info!("device link connected");
        Ok(())
    }

    /// Start the reading loop and return the queue consumer
    ///
    /// Non-blocking: production runs on its own task/thread.
    #[instrument(name = "link_start_reading", skip(self), fields(kind = self.kind.name()))]
    pub fn start_reading(&mut self) -> Result<QueueConsumer> {
        if self.reading.is_some() {
            return Err(LinkError::AlreadyReading(self.description.clone()));
        }
        let connection = self
            .connection
            .take()
            .ok_or_else(|| LinkError::NotConnected(self.description.clone()))?;

        let queue = IngestionQueue::new(self.queue_capacity);
        let producer = queue.producer(self.kind.drop_policy());
        let running = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(Notify::new());

        let handle = match (connection, &self.kind) {
            (Connection::Stream(stream), LinkKind::Live(_)) => {
                let running = running.clone();
                let source = self.description.clone();
                tokio::task::spawn_blocking(move || {
                    live::read_loop(stream, producer, running, source)
                })
            }
            (Connection::Capture(file), LinkKind::Replay(replay)) => {
                let running = running.clone();
                let replay = replay.clone();
                tokio::task::spawn_blocking(move || {
                    replay::replay_loop(replay, file, producer, running)
                })
            }
            (Connection::Synthetic, LinkKind::Simulated(sim)) => tokio::spawn(
                simulated::simulate_loop(sim.clone(), producer, running.clone(), stop.clone()),
            ),
            _ => return Err(LinkError::NotConnected(self.description.clone())),
        };

        let consumer = queue.consumer();
        self.reading = Some(ReadingTask {
            consumer: consumer.clone(),
            queue,
            running,
            stop,
            handle,
        });
        info!(capacity = self.queue_capacity, "reading loop started");
        Ok(consumer)
    }

    /// Pop the next item, `None` on timeout or when not reading
    pub async fn get_data(&self, timeout: Duration) -> Option<LinkItem> {
        match &self.reading {
            Some(reading) => reading.consumer.get_data(timeout).await,
            None => None,
        }
    }

    /// Current queue metrics, if reading
    pub fn queue_snapshot(&self) -> Option<QueueSnapshot> {
        self.reading.as_ref().map(|r| r.queue.snapshot())
    }

    /// Signal the reading loop to exit and wait at most `timeout`
    ///
    /// The queue is closed so a producer blocked on a full queue wakes up;
    /// items already buffered stay receivable through existing consumers.
    /// Returns `false` if the loop did not finish in time or crashed.
    #[instrument(name = "link_stop_reading", skip(self), fields(kind = self.kind.name()))]
    pub async fn stop_reading(&mut self, timeout: Duration) -> bool {
        let Some(reading) = self.reading.take() else {
            return true;
        };

        reading.running.store(false, Ordering::SeqCst);
        reading.stop.notify_one();
        reading.queue.close();

        match tokio::time::timeout(timeout, reading.handle).await {
            Ok(Ok(())) => {
                info!("reading loop stopped");
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "reading loop ended abnormally");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "ShutdownTimeout: reading loop did not stop in time, detaching it"
                );
                false
            }
        }
    }

    /// Release the channel
    ///
    /// A live stream is owned by its reading loop and closes when the loop ends.
    pub fn disconnect(&mut self) {
        if let Some(reading) = self.reading.take() {
            reading.running.store(false, Ordering::SeqCst);
            reading.stop.notify_one();
            reading.queue.close();
        }
        if self.connection.take().is_some() {
            debug!(link = %self.description, "unused connection released");
        }
        info!(link = %self.description, "device link disconnected");
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        if let Some(reading) = &self.reading {
            reading.running.store(false, Ordering::SeqCst);
            reading.stop.notify_one();
            reading.queue.close();
        }
    }
}
