//! # Ingestion
//!
//! Telemetry ingestion module.
//!
//! Responsibilities:
//! - Own the device channel (live serial/TCP, simulated, replay)
//! - Frame raw bytes into lines and parse them into `TelemetryRecord`
//! - Bounded queue between the reading loop and the pipeline worker,
//!   with per-producer backpressure policy
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{parse, DeviceLink, LinkItem};
//!
//! let mut link = DeviceLink::from_blueprint(&blueprint);
//! link.connect().await?;
//! let consumer = link.start_reading()?;
//! while let Some(item) = consumer.get_data(Duration::from_millis(250)).await {
//!     match item {
//!         LinkItem::Raw(line) => { let record = parse(&line.text)?; }
//!         LinkItem::Record(record) => { /* simulated */ }
//!     }
//! }
//! link.stop_reading(Duration::from_secs(2)).await;
//! link.disconnect();
//! ```

mod error;
mod link;
mod parser;
mod queue;

// Re-exports
pub use contracts::{LinkItem, RawLine, TelemetryRecord};
pub use error::{LinkError, ParseError, Result};
pub use link::{
    DeviceLink, LinkKind, LiveEndpoint, LiveLink, ReplayLink, SimulatedLink, TelemetrySimulator,
};
pub use parser::{extract_json, parse, parse_at, WireFormat};
pub use queue::{
    DropPolicy, IngestionQueue, QueueClosed, QueueConsumer, QueueMetrics, QueueProducer,
    QueueSnapshot,
};
