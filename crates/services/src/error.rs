//! Shared error types for the services crate.

use thiserror::Error;

use learn_core::model::IdError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressTracker` and `LessonPlayer`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    /// Rejected before any write was attempted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The progress store could not be reached or timed out; retrying later may succeed.
    #[error("progress store unavailable")]
    PersistenceUnavailable(#[source] StorageError),

    #[error(transparent)]
    Storage(StorageError),
}

impl TrackerError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::PersistenceUnavailable(_))
    }
}

impl From<StorageError> for TrackerError {
    fn from(err: StorageError) -> Self {
        if err.is_unavailable() {
            TrackerError::PersistenceUnavailable(err)
        } else {
            TrackerError::Storage(err)
        }
    }
}

impl From<IdError> for TrackerError {
    fn from(err: IdError) -> Self {
        TrackerError::InvalidArgument(err.to_string())
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_retryable() {
        let err = TrackerError::from(StorageError::Connection("timed out".into()));
        assert!(err.is_retryable());
        assert!(matches!(err, TrackerError::PersistenceUnavailable(_)));
    }

    #[test]
    fn other_storage_errors_are_not_retryable() {
        let err = TrackerError::from(StorageError::Serialization("bad row".into()));
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "serialization error: bad row");

        let err = TrackerError::from(StorageError::Database("no such table".into()));
        assert!(!err.is_retryable());
        assert!(matches!(err, TrackerError::Storage(StorageError::Database(_))));
    }

    #[test]
    fn empty_ids_become_invalid_arguments() {
        let id_err = learn_core::model::LessonId::new("").unwrap_err();
        let err = TrackerError::from(id_err);
        assert!(matches!(err, TrackerError::InvalidArgument(_)));
        assert_eq!(err.to_string(), "invalid argument: LessonId cannot be empty");
    }
}
