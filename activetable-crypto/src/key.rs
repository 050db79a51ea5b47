//! Table key material.
//!
//! A table key is a 32-character string typed (or pasted) by the user. Its
//! UTF-8 bytes are used directly as the AES-256 key; there is no KDF step.
//! The server only ever sees `SHA-256(key)` as hex (the auth digest), which
//! lets the client check a locally entered key without transmitting it.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the raw AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Minimum accepted key length, in characters.
pub const MIN_KEY_LENGTH: usize = 32;

/// Alphabet used for generated keys: alphanumerics plus eight symbols that
/// survive copy/paste and shell quoting.
pub const KEY_ALPHABET: &[u8; 70] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

/// A validated 32-byte table key held in memory.
///
/// Zeroized on drop. `Debug` never prints the key bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TableKey {
    bytes: [u8; KEY_SIZE],
}

impl TableKey {
    /// Builds a key from the user-facing key string.
    ///
    /// The string's UTF-8 encoding must be exactly [`KEY_SIZE`] bytes.
    pub fn new(key: &str) -> CryptoResult<Self> {
        let raw = key.as_bytes();
        if raw.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: raw.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(raw);
        Ok(Self { bytes })
    }

    /// Creates a key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Lowercase hex SHA-256 of the key bytes.
    pub fn auth_digest(&self) -> String {
        hex::encode(Sha256::digest(self.bytes))
    }

    /// Whether this key hashes to the given auth digest.
    pub fn matches_digest(&self, auth_digest: &str) -> bool {
        self.auth_digest().eq_ignore_ascii_case(auth_digest.trim())
    }
}

impl fmt::Debug for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TableKey([REDACTED])")
    }
}

impl TryFrom<&str> for TableKey {
    type Error = CryptoError;

    fn try_from(key: &str) -> CryptoResult<Self> {
        Self::new(key)
    }
}

/// Generates a new [`KEY_SIZE`]-character table key.
pub fn generate_key() -> String {
    generate_key_with_length(KEY_SIZE)
}

/// Generates a key of `length` characters drawn from [`KEY_ALPHABET`].
///
/// Each character comes from one byte of the thread-local CSPRNG reduced
/// modulo the alphabet size.
pub fn generate_key_with_length(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);

    let key = bytes
        .iter()
        .map(|b| KEY_ALPHABET[*b as usize % KEY_ALPHABET.len()] as char)
        .collect();

    bytes.zeroize();
    key
}

/// Lowercase hex SHA-256 of a key string, as computed server-side at table
/// creation and shipped as `encryptionAuthKey`.
pub fn auth_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Format-only check: non-empty and at least `min_length` characters.
///
/// Says nothing about whether the key belongs to a given table.
pub fn validate_format(key: &str, min_length: usize) -> bool {
    !key.is_empty() && key.chars().count() >= min_length
}

/// [`validate_format`] with the default minimum length.
pub fn validate_key_format(key: &str) -> bool {
    validate_format(key, MIN_KEY_LENGTH)
}

/// Checks a key against a table's auth digest.
///
/// Returns `false` for malformed keys and mismatching digests alike; it
/// never fails.
pub fn validate_against_table(key: &str, auth_digest_hex: &str) -> bool {
    if !validate_key_format(key) {
        return false;
    }
    let matches = auth_digest(key).eq_ignore_ascii_case(auth_digest_hex.trim());
    if !matches {
        debug!("table key does not match auth digest");
    }
    matches
}

/// Why a key is or is not usable for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    /// No key stored or entered.
    Missing,
    /// Key fails the format check.
    Malformed,
    /// Key is well-formed but does not hash to the table's auth digest.
    Mismatch,
    /// Key matches the auth digest.
    Valid,
}

impl KeyStatus {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Classifies an optional key against a table's auth digest.
pub fn key_status(key: Option<&str>, auth_digest_hex: &str) -> KeyStatus {
    match key {
        None => KeyStatus::Missing,
        Some(k) if !validate_key_format(k) => KeyStatus::Malformed,
        Some(k) if validate_against_table(k, auth_digest_hex) => KeyStatus::Valid,
        Some(_) => KeyStatus::Mismatch,
    }
}

/// Returns a usable [`TableKey`] only if `key` validates against the table
/// and has the exact AES-256 key size.
pub fn unlock_table_key(key: &str, auth_digest_hex: &str) -> Option<TableKey> {
    if !validate_against_table(key, auth_digest_hex) {
        return None;
    }
    TableKey::new(key).ok()
}
