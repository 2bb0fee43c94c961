// SPDX-License-Identifier: MIT

//! Storage error types.

use thiserror::Error;
use tw_core::ValidationError;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("stored row is corrupt: {0}")]
    Corrupt(String),

    #[error("incident not found: {0}")]
    IncidentNotFound(String),
}

impl StorageError {
    /// Machine-readable error code for the ingestion surface.
    pub fn code(&self) -> &'static str {
        match self {
            StorageError::Validation(v) => v.code(),
            StorageError::Database(_) | StorageError::Corrupt(_) => "storage_error",
            StorageError::IncidentNotFound(_) => "not_found",
        }
    }
}

/// Whether a database error is worth one immediate retry.
///
/// Connection resets and pool exhaustion are transient; constraint and
/// decode failures are not.
pub fn is_transient_db_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}
