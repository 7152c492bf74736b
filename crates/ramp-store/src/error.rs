use domain::DomainError;
use thiserror::Error;

use crate::RampId;

/// Errors that can occur when interacting with the ramp store.
#[derive(Debug, Error)]
pub enum RampStoreError {
    /// The record was updated since it was read.
    #[error("Concurrency conflict for ramp {ramp_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        ramp_id: RampId,
        expected: i64,
        actual: i64,
    },

    /// The ramp was not found in the store.
    #[error("Ramp not found: {0}")]
    NotFound(RampId),

    /// A ramp with this ID already exists.
    #[error("Ramp already exists: {0}")]
    AlreadyExists(RampId),

    /// The update violates a record invariant (e.g. leaving a terminal phase).
    #[error("Invalid ramp update: {0}")]
    Domain(#[from] DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for ramp store operations.
pub type Result<T> = std::result::Result<T, RampStoreError>;
