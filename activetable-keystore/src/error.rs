//! Key storage error types.

use thiserror::Error;

/// Result type for key storage operations.
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// Errors that can occur while persisting or loading table keys.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("invalid key format: expected 32 ASCII characters, got {length} characters")]
    KeyFormat { length: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}
