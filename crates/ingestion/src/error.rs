//! Ingestion error types

use thiserror::Error;

/// Frame parse failure
///
/// Always recoverable: the line is discarded and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No `{...}` span in the line (boot banners, debug prints)
    #[error("no JSON object found in line")]
    NoJsonFound,

    /// JSON span present but undecodable or with a wrongly typed field
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// Required field absent
    #[error("missing required field '{0}'")]
    MissingField(String),
}

impl ParseError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoJsonFound => "no_json",
            Self::MalformedJson(_) => "malformed_json",
            Self::MissingField(_) => "missing_field",
        }
    }

    /// Benign noise rather than protocol drift
    pub fn is_noise(&self) -> bool {
        matches!(self, Self::NoJsonFound)
    }
}

/// Device link error
#[derive(Debug, Error)]
pub enum LinkError {
    /// Channel could not be opened
    #[error("failed to connect to '{address}': {message}")]
    Connect { address: String, message: String },

    /// I/O failure on an open channel
    #[error("io error on '{address}': {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Operation needs a connected link
    #[error("link '{0}' is not connected")]
    NotConnected(String),

    /// Reading loop already running
    #[error("link '{0}' is already reading")]
    AlreadyReading(String),
}

impl LinkError {
    /// Create connect error
    pub fn connect(address: impl Into<String>, message: impl ToString) -> Self {
        Self::Connect {
            address: address.into(),
            message: message.to_string(),
        }
    }

    /// Create io error
    pub fn io(address: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            address: address.into(),
            source,
        }
    }
}

/// Ingestion Result type alias
pub type Result<T> = std::result::Result<T, LinkError>;
