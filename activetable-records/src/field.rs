//! Field and table descriptors as delivered by the server.

use activetable_crypto::OpeDomain;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    // Text-bearing
    Text,
    LongText,
    RichText,
    Email,
    Url,
    Phone,

    // Sortable numeric and temporal
    Integer,
    Numeric,
    Date,
    #[serde(rename = "DATETIME")]
    DateTime,
    Time,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,

    // Structural and reference
    Checkbox,
    SelectOne,
    SelectList,
    CheckList,
    Reference,
    ReferenceList,
    User,
    UserList,
    Attachment,
}

impl FieldType {
    /// Wire tag, as used in field configs and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::LongText => "LONG_TEXT",
            Self::RichText => "RICH_TEXT",
            Self::Email => "EMAIL",
            Self::Url => "URL",
            Self::Phone => "PHONE",
            Self::Integer => "INTEGER",
            Self::Numeric => "NUMERIC",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::Time => "TIME",
            Self::Year => "YEAR",
            Self::Month => "MONTH",
            Self::Day => "DAY",
            Self::Hour => "HOUR",
            Self::Minute => "MINUTE",
            Self::Second => "SECOND",
            Self::Checkbox => "CHECKBOX",
            Self::SelectOne => "SELECT_ONE",
            Self::SelectList => "SELECT_LIST",
            Self::CheckList => "CHECK_LIST",
            Self::Reference => "REFERENCE",
            Self::ReferenceList => "REFERENCE_LIST",
            Self::User => "USER",
            Self::UserList => "USER_LIST",
            Self::Attachment => "ATTACHMENT",
        }
    }

    /// Whether values of this type feed the keyword search index.
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            Self::Text | Self::LongText | Self::RichText | Self::Email | Self::Url | Self::Phone
        )
    }

    /// Plaintext domain for order-preserving types, `None` otherwise.
    pub fn ope_domain(&self) -> Option<OpeDomain> {
        match self {
            Self::Integer
            | Self::Year
            | Self::Month
            | Self::Day
            | Self::Hour
            | Self::Minute
            | Self::Second => Some(OpeDomain::Integer),
            Self::Numeric => Some(OpeDomain::Decimal),
            Self::Date => Some(OpeDomain::Date),
            Self::DateTime => Some(OpeDomain::DateTime),
            Self::Time => Some(OpeDomain::Time),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field of a table's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimal_places: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<serde_json::Value>,
}

impl FieldConfig {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            decimal_places: None,
            options: Vec::new(),
        }
    }
}

/// Encryption-relevant part of a table payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    #[serde(default)]
    pub encryption_enabled: bool,
    /// Hex SHA-256 of the table key, set when encryption is enabled.
    #[serde(default)]
    pub encryption_auth_key: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl TableConfig {
    pub fn field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.name == name)
    }
}
