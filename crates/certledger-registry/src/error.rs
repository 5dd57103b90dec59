use certledger_codec::CodecError;
use certledger_history::HistoryError;
use certledger_store::StoreError;

use crate::config::ConfigError;

/// Errors returned by registry operations and transactions.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("document {0} already exists")]
    AlreadyExists(String),

    #[error("document {0} does not exist")]
    NotFound(String),

    /// The caller's owner does not match the stored record's owner.
    #[error("document {id} is not owned by {owner}")]
    Forbidden { id: String, owner: String },

    /// A concurrent commit changed the document between read and write.
    #[error("concurrent modification of document {0}")]
    Conflict(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// Stored bytes for a single-document read did not decode.
    #[error("stored document {id} is unreadable: {reason}")]
    Decode { id: String, reason: String },

    #[error("encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
