//! Coordinator errors

use std::time::Duration;

use contracts::StorageError;
use ingestion::LinkError;
use thiserror::Error;

/// Pipeline coordinator error
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Device link could not be opened or started
    #[error("device link error: {0}")]
    Link(#[from] LinkError),

    /// A component did not finish within its shutdown budget
    #[error("{component} did not stop within {timeout:?}")]
    ShutdownTimeout {
        component: &'static str,
        timeout: Duration,
    },

    /// Storage query failed while building a report
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Report could not be serialized or written
    #[error("report error: {0}")]
    Report(String),
}

impl CoordinatorError {
    pub fn shutdown_timeout(component: &'static str, timeout: Duration) -> Self {
        Self::ShutdownTimeout { component, timeout }
    }
}

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
