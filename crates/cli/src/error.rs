//! Error types for CLI operations.

use contracts::{ContractError, StorageError};
use pipeline::CoordinatorError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse or validation error
    #[error("Invalid configuration: {0}")]
    Config(#[from] ContractError),

    /// Database missing for a read-only command
    #[error("Database not found: {path}")]
    DatabaseNotFound { path: String },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Pipeline error
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] CoordinatorError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn database_not_found(path: impl Into<String>) -> Self {
        Self::DatabaseNotFound { path: path.into() }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
