/// Errors from canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
