//! Record payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Plaintext view of a record, keyed by field name.
pub type PlainRecord = Map<String, Value>;

/// A record as stored and transmitted.
///
/// `data` holds plaintext values (every field of a non-encrypted table, and
/// the unencrypted fields of an encrypted one). `encrypted_data` holds the
/// per-field ciphertexts and `hashed_keywords` the search tokens. Decrypting
/// never modifies this struct, so it can be sent back verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub encrypted_data: Map<String, Value>,
    #[serde(default)]
    pub hashed_keywords: Vec<String>,
}

impl TableRecord {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether any search token matches.
    pub fn has_keyword(&self, token: &str) -> bool {
        self.hashed_keywords.iter().any(|k| k == token)
    }
}

/// Result of encrypting one field value.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedField {
    /// Ciphertext, or the original value for unencrypted fields.
    pub value: Value,
    /// Whether `value` belongs in `encryptedData` rather than `data`.
    pub encrypted: bool,
    /// Search tokens contributed by this value.
    pub keywords: Vec<String>,
}

impl EncryptedField {
    pub(crate) fn plain(value: Value) -> Self {
        Self {
            value,
            encrypted: false,
            keywords: Vec::new(),
        }
    }
}
