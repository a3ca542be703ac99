//! Engine and store error types.

use thiserror::Error;

/// Errors raised by a [`ReviewStore`](crate::traits::ReviewStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The request did not complete in time.
    #[error("store request timed out after {0}s")]
    Timeout(u64),

    /// The store answered with an error response.
    #[error("store API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A stored document could not be decoded.
    #[error("malformed record at {key}: {message}")]
    Malformed { key: String, message: String },

    /// The store refused a write.
    #[error("write rejected for {key}: {message}")]
    WriteRejected { key: String, message: String },

    /// Local I/O failure in a file-backed store.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` if repeating the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::Io(_) => true,
            StoreError::Api { status, .. } => *status >= 500 || *status == 429,
            StoreError::Malformed { .. } | StoreError::WriteRejected { .. } => false,
        }
    }
}

/// Errors that abort an engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No rubric has been defined (or it has no items) for the program.
    #[error("no rubric defined for program '{program}' (coordinator '{coordinator_id}')")]
    RubricMissing {
        coordinator_id: String,
        program: String,
    },

    /// The record store could not serve a read the operation depends on.
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    /// No group membership is recorded for the project.
    #[error("unknown project group: {0}")]
    UnknownGroup(String),

    /// The review unit names no one to write marks for.
    #[error("invalid review unit: {0}")]
    InvalidUnit(String),
}

impl EngineError {
    /// Returns `true` when the user should be sent to rubric setup.
    pub fn is_rubric_missing(&self) -> bool {
        matches!(self, EngineError::RubricMissing { .. })
    }
}
