//! # Storage
//!
//! Implementations of [`contracts::TelemetryStore`]:
//! - `SqliteStore`: durable, `rusqlite` on the blocking pool
//! - `MemoryStore`: in-process, for tests and dry runs
//!
//! Both derive threshold alerts from each stored reading.

mod alerts;
mod memory;
mod sqlite;

pub use alerts::derive_alerts;
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, MEMORY_PATH};
