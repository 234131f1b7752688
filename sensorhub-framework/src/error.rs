//! Error types for the framework.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`AdapterError`].
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Errors surfaced while building or running an adapter.
///
/// These are startup failures. Per-target fetch problems are [`FetchError`]s
/// and never leave the adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AdapterError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }

    /// Wrap an error with context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

impl From<json5::Error> for AdapterError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<sensorhub_common::Error> for AdapterError {
    fn from(err: sensorhub_common::Error) -> Self {
        match err {
            sensorhub_common::Error::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

/// A failed read against one poll target.
///
/// Every variant is handled the same way: fields cleared, session closed,
/// retried on the next tick.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Read failed: {0}")]
    Read(String),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Short label used in logs and statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Connection(_) => "connection",
            FetchError::Timeout(_) => "timeout",
            FetchError::Read(_) => "read",
            FetchError::Malformed(_) => "malformed",
            FetchError::Io(_) => "io",
        }
    }
}
