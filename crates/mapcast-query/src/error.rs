//! Error types for the query daemon.

use thiserror::Error;

/// Result type for query daemon operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the query daemon.
#[derive(Debug, Error)]
pub enum Error {
    /// The claim database could not be opened, read or written
    #[error("Claim store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An object-store request failed
    #[error("Object store {op} failed for {key}: {reason}")]
    ObjectStore {
        op: &'static str,
        key: String,
        reason: String,
    },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn object_store(op: &'static str, key: impl Into<String>, reason: impl ToString) -> Self {
        Error::ObjectStore {
            op,
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}
