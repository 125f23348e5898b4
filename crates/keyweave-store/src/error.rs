//! Store error type.

use thiserror::Error;

/// Failures from either backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record already exists under the same key.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
