//! Record-level encryption for Active Tables.
//!
//! Sits between the network layer and the renderers:
//!
//! - [`FieldSchemeResolver`] picks a scheme per field type
//! - [`RecordCipher`] decrypts fields, records and pages of records, and
//!   encrypts records for saving
//! - [`DecryptionCache`] memoizes decryptions so re-rendering a page does
//!   not repeat the cipher work
//!
//! # Failure policy
//!
//! Decryption never fails. A value that cannot be decrypted comes back
//! unchanged, so a missing or wrong key shows up as ciphertext in the
//! affected cells. Only the write path returns [`RecordError`].
//!
//! # Example
//!
//! ```
//! use activetable_crypto::TableKey;
//! use activetable_records::{
//!     FieldConfig, FieldType, RecordCipher, SharedDecryptionCache, TableConfig,
//! };
//! use serde_json::json;
//!
//! let table = TableConfig {
//!     encryption_enabled: true,
//!     encryption_auth_key: None,
//!     fields: vec![FieldConfig::new("title", FieldType::Text)],
//! };
//! let cipher = RecordCipher::for_table(&table, SharedDecryptionCache::default());
//! let key = TableKey::new("abcdef1234567890ABCDEF1234567890").unwrap();
//!
//! let plain = json!({ "title": "Hello, World!" }).as_object().unwrap().clone();
//! let record = cipher.encrypt_record(&plain, &table.fields, &key).unwrap();
//! assert_eq!(cipher.decrypt_record(&record, &table.fields, Some(&key)), plain);
//! ```

mod cache;
mod cipher;
mod config;
mod error;
mod field;
mod record;
mod scheme;

pub use cache::{
    cache_key, key_scope, CacheConfig, CacheEntry, CacheStats, Clock, DecryptionCache, ManualClock,
    SharedDecryptionCache, SystemClock,
};
pub use cipher::RecordCipher;
pub use config::EngineConfig;
pub use error::{RecordError, RecordResult};
pub use field::{FieldConfig, FieldType, TableConfig};
pub use record::{EncryptedField, PlainRecord, TableRecord};
pub use scheme::{encryption_scheme_for, EncryptionScheme, FieldSchemeResolver, SchemePlan};
