//! Protocol client errors.

use thiserror::Error;

/// Result type for protocol operations.
pub type AtprotoResult<T> = Result<T, AtprotoError>;

/// Errors from identity resolution and PDS calls.
#[derive(Debug, Error)]
pub enum AtprotoError {
    #[error("unsupported did method: {0}")]
    UnsupportedDid(String),

    #[error("failed to resolve {did}: {reason}")]
    IdentityResolution { did: String, reason: String },

    #[error("user has no PDS")]
    NoPds,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-200 answer from the PDS blob upload endpoint.
    #[error("upload error {status}, {body}")]
    Upload { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AtprotoError {
    pub fn resolution(did: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IdentityResolution {
            did: did.into(),
            reason: reason.into(),
        }
    }
}
