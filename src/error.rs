//! Error types for vcrproxy

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for vcrproxy operations
pub type Result<T> = std::result::Result<T, VcrError>;

/// Errors that can occur in vcrproxy
#[derive(Debug, Error)]
pub enum VcrError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Archive content that cannot be interpreted
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    /// Archive record holds no entries, so it cannot answer a request
    #[error("Archive record has no entries")]
    EmptyRecord,

    /// No archive stored under the given key
    #[error("Record not found: {}", .0.display())]
    RecordNotFound(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Origin URL that cannot be proxied
    #[error("Invalid origin '{0}'")]
    InvalidOrigin(String),

    /// Listening socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested
        addr: String,
        /// Underlying socket error
        source: io::Error,
    },

    /// Transport failure while talking to the origin
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
