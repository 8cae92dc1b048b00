use std::io;

use thiserror::Error;

/// Unified error type for the engine and the record layer.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected (CRC mismatch, bad format, etc).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// The key is absent. Expected and recoverable: lookups treat it as
    /// "nothing there yet".
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// Optimistic concurrency abort. The transaction read a key that a
    /// concurrent commit changed; re-run it in a fresh transaction.
    #[error("transaction conflict, please retry")]
    Conflict,

    /// Raised by a listing visitor to end iteration early. Never escapes
    /// a listing call.
    #[error("stop iteration")]
    StopIteration,

    /// Stored bytes did not decode into the requested type.
    #[error("unmarshal, key: {key}, raw: {raw}: {source}")]
    Decode {
        key: String,
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be marshaled.
    #[error("marshal: {0}")]
    Encode(#[source] serde_json::Error),

    /// The database handle has been closed.
    #[error("database is closed")]
    Closed,

    /// A write was attempted in a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,
}

impl Error {
    pub(crate) fn not_found(key: impl Into<String>) -> Self {
        Error::KeyNotFound { key: key.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict)
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
