//! Cache error types.

use douga_media::MediaError;
use douga_models::ValidationError;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while looking up or deriving an artifact.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("failed to download blob: {0}")]
    Source(String),

    #[error("failed to download blob: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    /// Recorded failure of an earlier derivation, replayed to later readers.
    #[error("{0}")]
    Derivation(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    pub fn source_failed(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
