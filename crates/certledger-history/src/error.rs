use certledger_store::JournalError;

/// Errors from history log operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Failure in the backing journal file.
    #[error("history journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("history lock poisoned")]
    LockPoisoned,
}

/// Result alias for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
