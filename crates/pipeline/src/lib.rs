//! # Pipeline
//!
//! Coordinates the device link, the ingestion worker and the store.
//!
//! ## Usage Example
//!
//! ```ignore
//! use pipeline::Coordinator;
//!
//! let store = Arc::new(SqliteStore::open(&blueprint.storage.path, blueprint.alerts).await?);
//! let mut coordinator = Coordinator::from_blueprint(&blueprint, store);
//! coordinator.start().await?;
//! // ...
//! let stats = coordinator.stop().await;
//! let report = coordinator.generate_report(Duration::from_secs(24 * 3600)).await?;
//! ```

mod coordinator;
mod error;
mod report;
mod stats;
mod worker;

pub use coordinator::{
    Coordinator, CoordinatorSettings, CoordinatorState, ShutdownStatus, StartOutcome,
};
pub use error::{CoordinatorError, Result};
pub use report::{build_report, PipelineReport, REPORT_TOP_ALERTS};
pub use stats::PipelineStatistics;
