use common::CacheError;
use thiserror::Error;

/// Token codec failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Claims must serialize to a JSON object")]
    InvalidClaims,

    #[error("Token encoding failed: {0}")]
    Encoding(String),
}

/// Session store failures. A miss is not an error: `get` returns `Ok(None)`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),

    #[error("Session store rejected request: {0}")]
    Rejected(String),

    #[error("Session record corrupted: {0}")]
    Serialization(String),
}

impl From<CacheError> for StoreError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Unavailable(msg) => Self::Unavailable(msg),
            CacheError::Rejected(msg) => Self::Rejected(msg),
            CacheError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}

/// Errors surfaced by [`AuthBackend`](crate::AuthBackend).
///
/// Validation only ever yields `Unauthenticated`; the other variants are
/// issuance failures that the caller of `create_token` needs to see.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unauthenticated")]
    Unauthenticated,

    #[error(transparent)]
    Token(#[from] JwtError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
