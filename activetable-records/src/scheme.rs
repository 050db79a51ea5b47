//! Field type to encryption scheme mapping.

use crate::field::{FieldType, TableConfig};
use serde::{Deserialize, Serialize};

/// How a field's values are protected at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionScheme {
    /// AES-256-CBC, confidentiality only.
    AesCbc,
    /// Deterministic order-preserving encryption, sortable server-side.
    OrderPreserving,
    /// HMAC-SHA256 search tokens; irreversible.
    KeywordHash,
    /// Stored in plaintext.
    None,
}

impl EncryptionScheme {
    /// Short label shown next to encrypted columns.
    pub fn badge(&self) -> Option<&'static str> {
        match self {
            Self::AesCbc => Some("AES"),
            Self::OrderPreserving => Some("OPE"),
            Self::KeywordHash => Some("HMAC"),
            Self::None => None,
        }
    }
}

/// Primary scheme of a field type in an encryption-enabled table.
///
/// Select options, references, users, flags and attachments carry
/// identifiers or small vocabularies that must stay joinable on the server.
pub fn encryption_scheme_for(field_type: FieldType) -> EncryptionScheme {
    match field_type {
        FieldType::Text
        | FieldType::LongText
        | FieldType::RichText
        | FieldType::Email
        | FieldType::Url
        | FieldType::Phone => EncryptionScheme::AesCbc,

        FieldType::Integer
        | FieldType::Numeric
        | FieldType::Date
        | FieldType::DateTime
        | FieldType::Time
        | FieldType::Year
        | FieldType::Month
        | FieldType::Day
        | FieldType::Hour
        | FieldType::Minute
        | FieldType::Second => EncryptionScheme::OrderPreserving,

        FieldType::Checkbox
        | FieldType::SelectOne
        | FieldType::SelectList
        | FieldType::CheckList
        | FieldType::Reference
        | FieldType::ReferenceList
        | FieldType::User
        | FieldType::UserList
        | FieldType::Attachment => EncryptionScheme::None,
    }
}

/// Everything the record cipher does with one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemePlan {
    pub primary: EncryptionScheme,
    /// Also emit keyword tokens into `hashedKeywords`.
    pub keyword_hash: bool,
}

impl SchemePlan {
    /// All schemes applied, primary first.
    pub fn schemes(&self) -> impl Iterator<Item = EncryptionScheme> {
        std::iter::once(self.primary)
            .chain(self.keyword_hash.then_some(EncryptionScheme::KeywordHash))
    }
}

/// Resolves schemes in the context of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchemeResolver {
    encryption_enabled: bool,
}

impl FieldSchemeResolver {
    pub const fn new(encryption_enabled: bool) -> Self {
        Self { encryption_enabled }
    }

    pub fn for_table(table: &TableConfig) -> Self {
        Self::new(table.encryption_enabled)
    }

    pub fn encryption_enabled(&self) -> bool {
        self.encryption_enabled
    }

    /// Primary scheme; always `None` when the table is not encrypted.
    pub fn scheme_for(&self, field_type: FieldType) -> EncryptionScheme {
        if self.encryption_enabled {
            encryption_scheme_for(field_type)
        } else {
            EncryptionScheme::None
        }
    }

    pub fn plan(&self, field_type: FieldType) -> SchemePlan {
        SchemePlan {
            primary: self.scheme_for(field_type),
            keyword_hash: self.encryption_enabled && field_type.is_text_bearing(),
        }
    }
}
