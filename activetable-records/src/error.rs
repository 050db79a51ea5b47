//! Error types for the record layer.

use thiserror::Error;

/// Errors from the write path and configuration.
///
/// The read path (`decrypt_*`) does not fail; see [`crate::RecordCipher`].
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("crypto error: {0}")]
    Crypto(#[from] activetable_crypto::CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
