//! Error types for focal-core

use thiserror::Error;

/// Result type alias using focal-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in focal-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity or key not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local storage has no room left for the write
    #[error("Storage quota exceeded for '{key}' ({needed} bytes needed, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: u64,
        available: u64,
    },

    /// Remote operation attempted without an authenticated session
    #[error("Not authenticated")]
    NotAuthenticated,

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote store rejected or failed the request
    #[error("Remote error: {0}")]
    Remote(String),

    /// Row received from the remote store could not be decoded
    #[error("Malformed {table} row: {reason}")]
    MalformedRow { table: &'static str, reason: String },

    /// Migration halted on a failing step
    #[error("Migration failed while {step}: {message}")]
    Migration { step: String, message: String },
}

impl Error {
    /// Whether the error came from local storage running out of space.
    pub const fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}
