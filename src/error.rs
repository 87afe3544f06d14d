//! Error types for the shellsync library.

use thiserror::Error;

/// Errors that can occur while synchronizing the offline cache.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error from the network backend.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error from a disk-backed cache store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config parsing failed: {0}")]
    Toml(#[from] toml::de::Error),

    /// A response arrived but did not carry a success status.
    #[error("{url} responded with status {status}")]
    Status {
        /// Request URL.
        url: String,
        /// HTTP status code received.
        status: u16,
    },

    /// Transport failure reported by a non-HTTP network backend.
    #[error("Network error: {0}")]
    Network(String),

    /// Resource table or persisted manifest is malformed.
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// A core shell entry names a key the resource table does not contain.
    #[error("Core resource not in resource table: {0}")]
    UnknownCoreResource(String),

    /// The configured origin is not an absolute http(s) origin.
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    /// A cache store rejected an operation.
    #[error("Cache store error: {0}")]
    Store(String),
}

/// A specialized `Result` type for shellsync operations.
pub type Result<T> = std::result::Result<T, Error>;
