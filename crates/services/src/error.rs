//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{ProgressRecordError, ScopeError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressStoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode progress record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ProgressRecordError),
}

/// Errors emitted by `SessionProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error(transparent)]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Store(#[from] ProgressStoreError),
}

/// Errors emitted by `LegacyMigrator`. A failed run is retried on the next start.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MigrationError {
    #[error("merged record is invalid: {0}")]
    Invalid(#[from] ProgressRecordError),
    #[error(transparent)]
    Store(#[from] ProgressStoreError),
}

/// Errors emitted by `ModeTransitionManager`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModeTransitionError {
    #[error("registration was not committed: {0}")]
    NotCommitted(#[source] ProgressStoreError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Store(#[from] ProgressStoreError),
}
