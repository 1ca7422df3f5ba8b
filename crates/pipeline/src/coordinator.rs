//! Pipeline coordinator - lifecycle of link, worker and statistics
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//! ```
//!
//! Two concurrent units while running: the link reading loop and the worker
//! task. They share only the ingestion queue. Statistics have a single
//! writer (the worker) and are read through a `watch` snapshot.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contracts::{MonitorBlueprint, PipelineConfig, TelemetryStore, MIN_TICK};
use ingestion::{DeviceLink, QueueConsumer};
use observability::SensorAggregator;
use serde::Serialize;
use state_tracker::StateTracker;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{CoordinatorError, Result};
use crate::report::{build_report, PipelineReport};
use crate::stats::PipelineStatistics;
use crate::worker::Worker;

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Result of `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Start on a running pipeline is a no-op
    AlreadyRunning,
}

/// How the last shutdown went
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ShutdownStatus {
    Clean,
    /// A component missed its budget; statistics are the last published snapshot
    Degraded(String),
}

/// Timing knobs of the coordinator
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Worker pop timeout, bounds cancellation latency
    pub poll_interval: Duration,
    /// Budget for the worker to finish after cancellation
    pub shutdown_timeout: Duration,
    /// Budget for the link reading loop to exit
    pub link_stop_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for CoordinatorSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            link_stop_timeout: config.link_stop_timeout(),
        }
    }
}

/// Pipeline coordinator
pub struct Coordinator<S> {
    link: DeviceLink,
    store: Arc<S>,
    settings: CoordinatorSettings,
    state: CoordinatorState,
    publisher: Arc<watch::Sender<PipelineStatistics>>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<PipelineStatistics>>,
    /// Queue of the current run, read once more after the worker is gone
    queue: Option<QueueConsumer>,
    dropped_base: u64,
    shutdown_status: Option<ShutdownStatus>,
}

impl<S> Coordinator<S>
where
    S: TelemetryStore + Sync + 'static,
{
    pub fn new(link: DeviceLink, store: Arc<S>, settings: CoordinatorSettings) -> Self {
        let (publisher, _) = watch::channel(PipelineStatistics::default());
        Self {
            link,
            store,
            settings,
            state: CoordinatorState::Stopped,
            publisher: Arc::new(publisher),
            cancel: Arc::new(AtomicBool::new(false)),
            worker: None,
            queue: None,
            dropped_base: 0,
            shutdown_status: None,
        }
    }

    /// Coordinator with the link variant and timings of the blueprint
    pub fn from_blueprint(blueprint: &MonitorBlueprint, store: Arc<S>) -> Self {
        Self::new(
            DeviceLink::from_blueprint(blueprint),
            store,
            CoordinatorSettings::from(&blueprint.pipeline),
        )
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == CoordinatorState::Running
    }

    pub fn link(&self) -> &DeviceLink {
        &self.link
    }

    /// Whether the link reading loop is still producing
    ///
    /// False once the loop ended without `stop`: device closed the stream,
    /// replay reached the end of its capture, or the loop crashed.
    pub fn link_alive(&self) -> bool {
        self.link.is_alive()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Copy of the latest statistics
    pub fn statistics(&self) -> PipelineStatistics {
        self.publisher.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatistics> {
        self.publisher.subscribe()
    }

    /// Outcome of the last `stop`, `None` before the first one
    pub fn shutdown_status(&self) -> Option<&ShutdownStatus> {
        self.shutdown_status.as_ref()
    }

    /// Connect the link and spawn the worker
    ///
    /// # Errors
    /// A link that cannot connect or start leaves the coordinator `Stopped`.
    #[instrument(name = "coordinator_start", skip(self), fields(link = %self.link.description()))]
    pub async fn start(&mut self) -> Result<StartOutcome> {
        if matches!(
            self.state,
            CoordinatorState::Running | CoordinatorState::Starting
        ) {
            warn!("pipeline already running");
            return Ok(StartOutcome::AlreadyRunning);
        }
        self.state = CoordinatorState::Starting;

        if let Err(e) = self.link.connect().await {
            self.state = CoordinatorState::Stopped;
            error!(error = %e, "failed to connect device link");
            return Err(e.into());
        }

        let consumer = match self.link.start_reading() {
            Ok(consumer) => consumer,
            Err(e) => {
                self.link.disconnect();
                self.state = CoordinatorState::Stopped;
                error!(error = %e, "failed to start reading");
                return Err(e.into());
            }
        };

        self.publisher.send_modify(|stats| {
            stats.start_time.get_or_insert_with(Utc::now);
        });
        self.cancel = Arc::new(AtomicBool::new(false));

        // Each run gets a fresh queue whose drop counter starts at zero
        let stats = self.statistics();
        self.dropped_base = stats.items_dropped;
        self.queue = Some(consumer.clone());

        let worker = Worker {
            consumer,
            store: Arc::clone(&self.store),
            tracker: StateTracker::new(),
            dropped_base: stats.items_dropped,
            stats,
            sensors: SensorAggregator::new(),
            publisher: Arc::clone(&self.publisher),
            cancel: Arc::clone(&self.cancel),
            poll_interval: self.settings.poll_interval.max(MIN_TICK),
            source: self.link.kind().name(),
        };
        self.worker = Some(tokio::spawn(worker.run()));
        self.state = CoordinatorState::Running;

        info!(
            kind = self.link.kind().name(),
            store = self.store.name(),
            "pipeline running"
        );
        Ok(StartOutcome::Started)
    }

    /// Stop the link and the worker, returning the final statistics
    ///
    /// Idempotent: on a stopped pipeline the previous final statistics are
    /// returned unchanged. Components missing their budget are logged as
    /// `ShutdownTimeout` and the shutdown is reported as degraded.
    #[instrument(name = "coordinator_stop", skip(self), fields(link = %self.link.description()))]
    pub async fn stop(&mut self) -> PipelineStatistics {
        if self.state == CoordinatorState::Stopped {
            debug!("pipeline already stopped");
            return self.statistics();
        }
        self.state = CoordinatorState::Stopping;
        self.cancel.store(true, Ordering::SeqCst);

        let mut status = ShutdownStatus::Clean;

        if !self.link.stop_reading(self.settings.link_stop_timeout).await {
            status = ShutdownStatus::Degraded(format!(
                "link reading loop did not stop cleanly within {:?}",
                self.settings.link_stop_timeout
            ));
        }

        if let Some(mut handle) = self.worker.take() {
            match tokio::time::timeout(self.settings.shutdown_timeout, &mut handle).await {
                Ok(Ok(stats)) => {
                    self.publisher.send_replace(stats);
                }
                Ok(Err(e)) => {
                    error!(error = %e, "worker task failed");
                    status = ShutdownStatus::Degraded(format!("worker task failed: {e}"));
                }
                Err(_) => {
                    handle.abort();
                    let err =
                        CoordinatorError::shutdown_timeout("worker", self.settings.shutdown_timeout);
                    warn!(error = %err, "ShutdownTimeout: worker aborted, keeping last snapshot");
                    status = ShutdownStatus::Degraded(err.to_string());
                }
            }
        }

        // Drops after the last item the worker handled, or after an abort
        if let Some(queue) = self.queue.take() {
            let dropped = self.dropped_base + queue.snapshot().dropped;
            self.publisher.send_if_modified(|stats| {
                let changed = stats.items_dropped < dropped;
                stats.items_dropped = stats.items_dropped.max(dropped);
                changed
            });
        }

        self.link.disconnect();
        self.state = CoordinatorState::Stopped;

        let stats = self.statistics();
        info!(
            received = stats.readings_received,
            stored = stats.readings_stored,
            errors = stats.errors,
            ignored = stats.lines_ignored,
            events = stats.events_stored,
            partial_writes = stats.partial_writes,
            dropped = stats.items_dropped,
            status = ?status,
            "pipeline stopped"
        );
        self.shutdown_status = Some(status);
        stats
    }

    /// Read-only report over the trailing `period`
    pub async fn generate_report(&self, period: Duration) -> Result<PipelineReport> {
        build_report(self.store.as_ref(), period, Some(self.statistics())).await
    }
}

impl<S> Drop for Coordinator<S> {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DeviceConfig, SimulatorConfig};
    use ingestion::{LinkKind, LiveLink, SimulatedLink};
    use storage::MemoryStore;

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            poll_interval: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(2),
            link_stop_timeout: Duration::from_secs(1),
        }
    }

    fn simulated(store: MemoryStore) -> Coordinator<MemoryStore> {
        let link = DeviceLink::new(
            LinkKind::Simulated(SimulatedLink::new(&SimulatorConfig {
                interval_ms: 20,
                seed: Some(11),
            })),
            16,
        );
        Coordinator::new(link, Arc::new(store), settings())
    }

    #[tokio::test]
    async fn test_start_and_stop_twice() {
        let mut coordinator = simulated(MemoryStore::new("mem"));
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);

        assert_eq!(coordinator.start().await.unwrap(), StartOutcome::Started);
        assert!(coordinator.is_running());
        assert!(coordinator.link_alive());
        assert_eq!(
            coordinator.start().await.unwrap(),
            StartOutcome::AlreadyRunning
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        let first = coordinator.stop().await;
        let second = coordinator.stop().await;

        assert_eq!(first, second);
        assert!(first.readings_received > 0);
        assert_eq!(first.readings_stored, first.readings_received - first.errors);
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert_eq!(coordinator.shutdown_status(), Some(&ShutdownStatus::Clean));
        assert!(!coordinator.link().is_connected());
        assert!(!coordinator.link_alive());
    }

    #[tokio::test]
    async fn test_zero_periods_do_not_stall() {
        let link = DeviceLink::new(
            LinkKind::Simulated(SimulatedLink::new(&SimulatorConfig {
                interval_ms: 0,
                seed: Some(2),
            })),
            16,
        );
        let settings = CoordinatorSettings {
            poll_interval: Duration::ZERO,
            ..settings()
        };
        let mut coordinator = Coordinator::new(link, Arc::new(MemoryStore::new("mem")), settings);

        coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(coordinator.link_alive());
        let stats = coordinator.stop().await;

        assert!(stats.readings_received > 0);
        assert_eq!(coordinator.shutdown_status(), Some(&ShutdownStatus::Clean));
    }

    #[tokio::test]
    async fn test_dropped_items_accumulate_across_restarts() {
        let store = MemoryStore::new("mem");
        store.set_write_delay(Duration::from_millis(20));
        let link = DeviceLink::new(
            LinkKind::Simulated(SimulatedLink::new(&SimulatorConfig {
                interval_ms: 1,
                seed: Some(5),
            })),
            1,
        );
        let mut coordinator = Coordinator::new(link, Arc::new(store), settings());

        coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let first = coordinator.stop().await;
        assert!(first.items_dropped > 0);

        coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let second = coordinator.stop().await;

        assert!(second.items_dropped > first.items_dropped);
        assert_eq!(coordinator.statistics().items_dropped, second.items_dropped);
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let mut coordinator = simulated(MemoryStore::new("mem"));
        let stats = coordinator.stop().await;
        assert_eq!(stats, PipelineStatistics::default());
        assert!(coordinator.shutdown_status().is_none());
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_stopped() {
        let link = DeviceLink::new(
            LinkKind::Live(LiveLink::new(&DeviceConfig {
                address: "/dev/no-such-soil-probe".into(),
                ..Default::default()
            })),
            4,
        );
        let mut coordinator = Coordinator::new(link, Arc::new(MemoryStore::new("mem")), settings());

        let err = coordinator.start().await.unwrap_err();
        assert!(matches!(err, CoordinatorError::Link(_)));
        assert_eq!(coordinator.state(), CoordinatorState::Stopped);
        assert!(coordinator.statistics().start_time.is_none());
    }

    #[tokio::test]
    async fn test_restart_keeps_counters() {
        let store = MemoryStore::new("mem");
        let mut coordinator = simulated(store.clone());

        coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let first = coordinator.stop().await;

        coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = coordinator.stop().await;

        assert_eq!(second.start_time, first.start_time);
        assert!(second.readings_received > first.readings_received);
        assert_eq!(store.reading_count() as u64, second.readings_stored);
    }

    #[tokio::test]
    async fn test_subscribe_sees_progress() {
        let mut coordinator = simulated(MemoryStore::new("mem"));
        let mut rx = coordinator.subscribe();
        coordinator.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        coordinator.stop().await;
        assert!(rx.borrow().start_time.is_some());
    }

    #[tokio::test]
    async fn test_generate_report() {
        let mut coordinator = simulated(MemoryStore::new("mem"));
        coordinator.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        let stats = coordinator.stop().await;

        let report = coordinator
            .generate_report(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(report.statistics.total_readings, stats.readings_stored);
        assert_eq!(report.pipeline.as_ref(), Some(&stats));
        assert!(report.top_alerts.len() <= 5);
    }
}
