//! Ingestion queue - bounded FIFO between the link reading loop and the worker
//!
//! Built on `async-channel` so the blocking reader thread and the async worker
//! share one queue. Producers pick a policy when the queue is full:
//! - `Block`: wait for room, nothing is lost (live serial, replay)
//! - `DropOldest`: evict the oldest buffered item and count it (simulator)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use contracts::LinkItem;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Producer behaviour when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Wait for the consumer
    #[default]
    Block,
    /// Evict the oldest buffered item
    DropOldest,
}

/// Queue closed, the item was not enqueued
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("ingestion queue closed")]
pub struct QueueClosed;

/// Queue metrics
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Items accepted by the queue
    pub pushed: AtomicU64,

    /// Items evicted by drop-oldest
    pub dropped: AtomicU64,

    /// Items taken by the consumer
    pub popped: AtomicU64,
}

impl QueueMetrics {
    fn record_pushed(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("soil_monitor_queue_pushed_total").increment(1);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("soil_monitor_queue_dropped_total").increment(1);
    }

    fn record_popped(&self) {
        self.popped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub pushed: u64,
    pub dropped: u64,
    pub popped: u64,
    /// Items currently buffered
    pub depth: usize,
    pub capacity: usize,
}

/// Bounded ingestion queue
pub struct IngestionQueue {
    tx: Sender<LinkItem>,
    rx: Receiver<LinkItem>,
    metrics: Arc<QueueMetrics>,
}

impl IngestionQueue {
    /// Create a queue holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            metrics: Arc::new(QueueMetrics::default()),
        }
    }

    /// Producer handle with the given full-queue policy
    pub fn producer(&self, policy: DropPolicy) -> QueueProducer {
        QueueProducer {
            tx: self.tx.clone(),
            policy,
            metrics: self.metrics.clone(),
        }
    }

    /// Consumer handle
    pub fn consumer(&self) -> QueueConsumer {
        QueueConsumer {
            rx: self.rx.clone(),
            tx: self.tx.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Close the queue; buffered items stay receivable
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        snapshot(&self.rx, &self.metrics)
    }
}

fn snapshot(rx: &Receiver<LinkItem>, metrics: &QueueMetrics) -> QueueSnapshot {
    QueueSnapshot {
        pushed: metrics.pushed.load(Ordering::Relaxed),
        dropped: metrics.dropped.load(Ordering::Relaxed),
        popped: metrics.popped.load(Ordering::Relaxed),
        depth: rx.len(),
        capacity: rx.capacity().unwrap_or(0),
    }
}

/// Producer side of the queue
#[derive(Clone)]
pub struct QueueProducer {
    tx: Sender<LinkItem>,
    policy: DropPolicy,
    metrics: Arc<QueueMetrics>,
}

impl QueueProducer {
    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// Push from a blocking thread, applying the producer policy
    pub fn push_blocking(&self, item: LinkItem) -> Result<(), QueueClosed> {
        match self.policy {
            DropPolicy::Block => {
                self.tx.send_blocking(item).map_err(|_| QueueClosed)?;
                self.metrics.record_pushed();
                Ok(())
            }
            DropPolicy::DropOldest => self.push_drop_oldest(item),
        }
    }

    /// Push from async code, applying the producer policy
    pub async fn push(&self, item: LinkItem) -> Result<(), QueueClosed> {
        match self.policy {
            DropPolicy::Block => {
                self.tx.send(item).await.map_err(|_| QueueClosed)?;
                self.metrics.record_pushed();
                Ok(())
            }
            DropPolicy::DropOldest => self.push_drop_oldest(item),
        }
    }

    /// Never waits: when full, the oldest item is evicted
    fn push_drop_oldest(&self, item: LinkItem) -> Result<(), QueueClosed> {
        let evicted = self.tx.force_send(item).map_err(|_| QueueClosed)?;
        self.metrics.record_pushed();
        if let Some(old) = evicted {
            self.metrics.record_dropped();
            trace!(received_at = %old.received_at(), "queue full, dropped oldest item");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the queue
#[derive(Clone)]
pub struct QueueConsumer {
    rx: Receiver<LinkItem>,
    tx: Sender<LinkItem>,
    metrics: Arc<QueueMetrics>,
}

impl QueueConsumer {
    /// Pop the next item, waiting at most `timeout`
    ///
    /// Returns `None` on timeout. A closed and drained queue also waits out
    /// the timeout before returning `None` so pollers do not spin.
    pub async fn get_data(&self, timeout: Duration) -> Option<LinkItem> {
        let deadline = tokio::time::Instant::now() + timeout;
        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Ok(item)) => {
                self.metrics.record_popped();
                Some(item)
            }
            Ok(Err(_closed)) => {
                tokio::time::sleep_until(deadline).await;
                None
            }
            Err(_elapsed) => None,
        }
    }

    /// Pop an already buffered item without waiting
    pub fn try_get(&self) -> Option<LinkItem> {
        let item = self.rx.try_recv().ok()?;
        self.metrics.record_popped();
        Some(item)
    }

    /// Close the queue; blocked producers wake with an error
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }

    /// Items currently buffered
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        snapshot(&self.rx, &self.metrics)
    }
}
