//! Error types for the crypto layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by the fallible encryption primitives.
///
/// The read path never surfaces these to callers: the fail-safe decrypt
/// wrappers log them and hand back the original ciphertext instead.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("unsupported value for {domain}: {value}")]
    UnsupportedValue { domain: &'static str, value: String },
}
