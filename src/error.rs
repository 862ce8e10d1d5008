//! Error types shared by all core operations.
//!
//! Every operation in the crate fails with a [`CoreError`]. The taxonomy
//! distinguishes the caller-facing outcomes (not found, forbidden, invalid
//! state, conflict, unauthorized) from infrastructure faults (storage,
//! database, corrupt data).
//!
//! All mutating operations run inside a single transaction, so any error
//! means "nothing happened"; there is no partially-applied outcome for a
//! caller to repair.

use thiserror::Error;

/// Error type for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Referenced member/message/circle/invitation does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor lacks rights over the target.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Target is not in the status the operation requires.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Duplicate identity on creation, or a raced single-use token.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credential missing, invalid, or expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Persisted value failed to parse back into its domain type.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Storage-level fault (lock poisoning and the like).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
