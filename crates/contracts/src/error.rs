//! Layered error definitions
//!
//! Categorized by source: config / storage

use thiserror::Error;

/// Unified error type for shared contracts
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration parse error keeping the underlying cause
    pub fn config_parse_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Storage collaborator errors
///
/// Always recoverable from the pipeline's point of view.
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQL engine error
    #[error("sqlite error during {operation}: {message}")]
    Sqlite { operation: String, message: String },

    /// Blocking storage task panicked or was cancelled
    #[error("storage task failed: {0}")]
    Task(String),

    /// Store cannot accept writes (closed, locked, injected failure)
    #[error("store '{store}' unavailable: {message}")]
    Unavailable { store: String, message: String },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Create sqlite error
    pub fn sqlite(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Sqlite {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create unavailable error
    pub fn unavailable(store: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            store: store.into(),
            message: message.into(),
        }
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sqlite { .. } => "sqlite",
            Self::Task(_) => "task",
            Self::Unavailable { .. } => "unavailable",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation_message() {
        let err = ContractError::config_validation("pipeline.queue_capacity", "must be >= 1");
        assert_eq!(
            err.to_string(),
            "config validation error at 'pipeline.queue_capacity': must be >= 1"
        );
    }

    #[test]
    fn test_storage_error_kind() {
        assert_eq!(StorageError::sqlite("insert", "disk full").kind(), "sqlite");
        assert_eq!(StorageError::unavailable("mem", "closed").kind(), "unavailable");
    }
}
