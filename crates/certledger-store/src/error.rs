use certledger_types::Version;

use crate::journal::JournalError;

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No live value under this key.
    #[error("key not found: {0}")]
    NotFound(String),

    /// A conditional write found a different live version than expected.
    /// `None` on either side means "no live value".
    #[error("version conflict on {key}: expected {expected:?}, found {actual:?}")]
    VersionConflict {
        key: String,
        expected: Option<Version>,
        actual: Option<Version>,
    },

    /// Failure in the backing journal file.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
