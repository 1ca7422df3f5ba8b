//! Pipeline worker - single consumer of the ingestion queue
//!
//! Parses, persists and tracks each item. No error escapes the loop: every
//! failure is counted and logged, and the next item is processed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{IrrigationEvent, TelemetryRecord, TelemetryStore};
use ingestion::{parse_at, LinkItem, ParseError, QueueConsumer};
use observability::SensorAggregator;
use state_tracker::StateTracker;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::stats::PipelineStatistics;

/// Stored readings between progress log lines
const PROGRESS_EVERY: u64 = 10;

pub(crate) struct Worker<S> {
    pub consumer: QueueConsumer,
    pub store: Arc<S>,
    pub tracker: StateTracker,
    pub stats: PipelineStatistics,
    pub sensors: SensorAggregator,
    pub publisher: Arc<watch::Sender<PipelineStatistics>>,
    pub cancel: Arc<AtomicBool>,
    pub poll_interval: Duration,
    pub source: &'static str,
    /// Drops counted by queues of earlier runs
    pub dropped_base: u64,
}

impl<S> Worker<S>
where
    S: TelemetryStore + Sync + 'static,
{
    /// Consume until cancelled, then drain what is already buffered
    #[instrument(name = "pipeline_worker", skip(self), fields(source = self.source))]
    pub async fn run(mut self) -> PipelineStatistics {
        debug!("worker started");

        while !self.cancel.load(Ordering::SeqCst) {
            if let Some(item) = self.consumer.get_data(self.poll_interval).await {
                self.handle(item).await;
            }
        }

        let mut drained = 0usize;
        while let Some(item) = self.consumer.try_get() {
            self.handle(item).await;
            drained += 1;
        }
        self.refresh_queue();
        self.publisher.send_replace(self.stats.clone());

        debug!(drained, "worker stopped");
        self.stats
    }

    async fn handle(&mut self, item: LinkItem) {
        let started = Instant::now();

        if let Some(record) = self.decode(item) {
            self.persist_reading(&record).await;
            if let Some(event) = self.tracker.observe(&record) {
                self.persist_event(&event).await;
            }
        }

        self.refresh_queue();
        observability::record_item_latency_ms(started.elapsed().as_secs_f64() * 1000.0);
        self.publisher.send_replace(self.stats.clone());
    }

    fn refresh_queue(&mut self) {
        let queue = self.consumer.snapshot();
        self.stats.items_dropped = self.dropped_base + queue.dropped;
        observability::record_queue_depth(queue.depth);
    }

    /// Turn a queue item into a record, counting it
    fn decode(&mut self, item: LinkItem) -> Option<TelemetryRecord> {
        let record = match item {
            LinkItem::Record(record) => record,
            LinkItem::Raw(line) => match parse_at(&line.text, line.received_at) {
                Ok(record) => record,
                Err(ParseError::NoJsonFound) => {
                    self.stats.lines_ignored += 1;
                    observability::record_line_ignored();
                    trace!(line = %line.text, "line without JSON ignored");
                    return None;
                }
                Err(e) => {
                    self.stats.readings_received += 1;
                    self.stats.errors += 1;
                    observability::record_reading_received(self.source);
                    observability::record_parse_error(e.kind());
                    warn!(error = %e, line = %line.text, "discarding unparseable frame");
                    return None;
                }
            },
        };

        self.stats.readings_received += 1;
        observability::record_reading_received(self.source);
        Some(record)
    }

    async fn persist_reading(&mut self, record: &TelemetryRecord) {
        let id = match self.store.insert_sensor_reading(record).await {
            Ok(id) => id,
            Err(e) => {
                self.stats.errors += 1;
                observability::record_storage_failure("insert_sensor_reading", e.kind());
                error!(store = self.store.name(), error = %e, "failed to store sensor reading");
                return;
            }
        };

        self.stats.readings_stored += 1;
        self.stats.last_reading_at = Some(record.received_at);
        self.sensors.update(&record.sensors);
        self.stats.sensors = self.sensors.summary();
        observability::record_reading_stored(&record.sensors);

        if self.stats.readings_stored % PROGRESS_EVERY == 0 {
            info!(
                stored = self.stats.readings_stored,
                temperature = record.sensors.temperature,
                humidity = record.sensors.humidity,
                ph = record.sensors.ph,
                irrigation = record.irrigation.active,
                "telemetry progress"
            );
        } else {
            trace!(id, "sensor reading stored");
        }

        if let Err(e) = self.store.insert_system_stats(record).await {
            self.stats.partial_writes += 1;
            observability::record_storage_failure("insert_system_stats", e.kind());
            warn!(reading_id = id, error = %e, "failed to store system stats");
        }
    }

    async fn persist_event(&mut self, event: &IrrigationEvent) {
        match self.store.insert_irrigation_event(event).await {
            Ok(id) => {
                self.stats.events_stored += 1;
                info!(
                    id,
                    event = %event.event_type,
                    trigger = %event.trigger,
                    duration_seconds = ?event.duration_seconds,
                    "irrigation event stored"
                );
            }
            Err(e) => {
                self.stats.partial_writes += 1;
                observability::record_storage_failure("insert_irrigation_event", e.kind());
                warn!(event = %event.event_type, error = %e, "failed to store irrigation event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{IrrigationEventType, RawLine, Trigger};
    use ingestion::{DropPolicy, IngestionQueue};
    use storage::MemoryStore;

    fn frame(active: bool, humidity: f64) -> String {
        format!(
            r#"{{"sensors":{{"temperature":22.0,"humidity":{humidity},"ph":6.8}},"irrigation":{{"active":{active}}},"system":{{"freeHeap":120000,"uptime":60,"wifi":"Connected"}}}}"#
        )
    }

    async fn run_lines(store: MemoryStore, lines: &[String]) -> PipelineStatistics {
        let queue = IngestionQueue::new(lines.len().max(1));
        let producer = queue.producer(DropPolicy::Block);
        let t0 = chrono::Utc::now();
        for (i, line) in lines.iter().enumerate() {
            let at = t0 + chrono::Duration::seconds(i as i64 * 10);
            producer.push(LinkItem::Raw(RawLine::at(line.clone(), at))).await.unwrap();
        }
        queue.close();

        let (tx, _rx) = watch::channel(PipelineStatistics::default());
        let worker = Worker {
            consumer: queue.consumer(),
            store: Arc::new(store),
            tracker: StateTracker::new(),
            stats: PipelineStatistics::default(),
            sensors: SensorAggregator::new(),
            publisher: Arc::new(tx),
            // Cancelled from the start: the worker only drains
            cancel: Arc::new(AtomicBool::new(true)),
            poll_interval: Duration::from_millis(10),
            source: "test",
            dropped_base: 0,
        };
        worker.run().await
    }

    #[tokio::test]
    async fn test_counts_per_item_kind() {
        let store = MemoryStore::new("mem");
        let lines = vec![
            "ESP32 boot".to_string(),
            frame(false, 40.0),
            r#"{"sensors":{"humidity":40.0,"ph":6.8}}"#.to_string(),
            r#"{"sensors":{"temperature":"x","humidity":40.0,"ph":6.8}}"#.to_string(),
            frame(false, 41.0),
        ];
        let stats = run_lines(store.clone(), &lines).await;

        assert_eq!(stats.lines_ignored, 1);
        assert_eq!(stats.readings_received, 4);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.readings_stored, 2);
        assert_eq!(stats.readings_stored, stats.readings_received - stats.errors);
        assert_eq!(store.reading_count(), 2);
        assert_eq!(store.system_stats_count(), 2);
        assert_eq!(stats.sensors.humidity.count, 2);
    }

    #[tokio::test]
    async fn test_irrigation_session_persisted() {
        let store = MemoryStore::new("mem");
        let lines = vec![
            frame(false, 25.0),
            frame(true, 25.0),
            frame(true, 35.0),
            frame(false, 55.0),
        ];
        let stats = run_lines(store.clone(), &lines).await;

        assert_eq!(stats.events_stored, 2);
        let events = store.events();
        assert_eq!(events[0].event_type, IrrigationEventType::Start);
        assert_eq!(events[0].trigger, Trigger::Auto);
        assert_eq!(events[1].event_type, IrrigationEventType::Stop);
        assert_eq!(events[1].duration_seconds, Some(20));
    }

    #[tokio::test]
    async fn test_storage_failure_counts_error_and_tracker_advances() {
        let store = MemoryStore::new("mem");
        store.set_unavailable(true);
        let lines = vec![frame(false, 50.0), frame(true, 50.0)];
        let stats = run_lines(store.clone(), &lines).await;

        assert_eq!(stats.readings_received, 2);
        assert_eq!(stats.errors, 2);
        assert_eq!(stats.readings_stored, 0);
        // The start event was derived even though nothing could be written
        assert_eq!(stats.partial_writes, 1);
        assert_eq!(stats.failures(), 3);
        assert_eq!(stats.events_stored, 0);
    }

    #[tokio::test]
    async fn test_dropped_count_continues_from_base() {
        let queue = IngestionQueue::new(1);
        let producer = queue.producer(DropPolicy::DropOldest);
        for humidity in [40.0, 41.0, 42.0] {
            producer
                .push(LinkItem::Raw(RawLine::new(frame(false, humidity))))
                .await
                .unwrap();
        }
        queue.close();

        let (tx, rx) = watch::channel(PipelineStatistics::default());
        let worker = Worker {
            consumer: queue.consumer(),
            store: Arc::new(MemoryStore::new("mem")),
            tracker: StateTracker::new(),
            stats: PipelineStatistics {
                items_dropped: 5,
                ..Default::default()
            },
            sensors: SensorAggregator::new(),
            publisher: Arc::new(tx),
            cancel: Arc::new(AtomicBool::new(true)),
            poll_interval: Duration::from_millis(10),
            source: "test",
            dropped_base: 5,
        };
        let stats = worker.run().await;

        assert_eq!(stats.readings_stored, 1);
        assert_eq!(stats.items_dropped, 7);
        assert_eq!(rx.borrow().items_dropped, 7);
    }
}
