//! Record-level encryption and decryption.
//!
//! The read path is fail-safe: any value that cannot be decrypted (no key,
//! wrong key, malformed ciphertext, unexpected JSON shape) is returned as
//! it was received. A renderer showing thousands of cells gets ciphertext
//! in the affected cells instead of an error.

use crate::cache::{key_scope, SharedDecryptionCache};
use crate::error::RecordResult;
use crate::field::{FieldConfig, TableConfig};
use crate::record::{EncryptedField, PlainRecord, TableRecord};
use crate::scheme::{EncryptionScheme, FieldSchemeResolver};
use activetable_crypto::{
    decrypt_order_preserving, encrypt_aes_cbc, encrypt_order_preserving, keyword_tokens,
    search_token, try_decrypt_aes_cbc, CryptoError, CryptoResult, OpeDomain, OpeValue, TableKey,
};
use serde_json::{Number, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace};

/// Encrypts and decrypts records of one table.
///
/// Cheap to clone; clones share the decryption cache.
#[derive(Clone)]
pub struct RecordCipher {
    resolver: FieldSchemeResolver,
    cache: SharedDecryptionCache,
}

impl RecordCipher {
    pub fn new(resolver: FieldSchemeResolver, cache: SharedDecryptionCache) -> Self {
        Self { resolver, cache }
    }

    pub fn for_table(table: &TableConfig, cache: SharedDecryptionCache) -> Self {
        Self::new(FieldSchemeResolver::for_table(table), cache)
    }

    /// Uses the process-wide cache.
    pub fn with_global_cache(table: &TableConfig) -> Self {
        Self::for_table(table, SharedDecryptionCache::global().clone())
    }

    pub fn resolver(&self) -> FieldSchemeResolver {
        self.resolver
    }

    pub fn cache(&self) -> &SharedDecryptionCache {
        &self.cache
    }

    // ========================================================================
    // Read path
    // ========================================================================

    /// Decrypts one field value, returning it unchanged on any failure.
    ///
    /// Memoized plaintexts are scoped to `key`, so a wrong key never reads
    /// what the right key decrypted earlier.
    pub fn decrypt_field(&self, value: &Value, field: &FieldConfig, key: Option<&TableKey>) -> Value {
        match key {
            Some(key) => self.decrypt_field_scoped(value, field, key, &key_scope(key)),
            None => value.clone(),
        }
    }

    fn decrypt_field_scoped(
        &self,
        value: &Value,
        field: &FieldConfig,
        key: &TableKey,
        scope: &str,
    ) -> Value {
        let scheme = self.resolver.scheme_for(field.field_type);
        if value.is_null() || matches!(scheme, EncryptionScheme::None | EncryptionScheme::KeywordHash) {
            return value.clone();
        }

        let result = self.cache.get_or_try_insert_with(
            scope,
            value,
            &field.name,
            field.field_type,
            || decrypt_value(value, scheme, field, key),
        );

        match result {
            Ok(plain) => plain,
            Err(e) => {
                debug!(
                    field = %field.name,
                    scheme = scheme_name(scheme),
                    "decrypt fell back to ciphertext: {e}"
                );
                value.clone()
            }
        }
    }

    /// Builds the plaintext view of a record.
    ///
    /// Starts from `record.data` and overlays the decrypted value of every
    /// field in `fields` that has an entry in `record.encrypted_data`.
    pub fn decrypt_record(
        &self,
        record: &TableRecord,
        fields: &[FieldConfig],
        key: Option<&TableKey>,
    ) -> PlainRecord {
        let mut plain = record.data.clone();
        let scope = key.map(|key| (key, key_scope(key)));
        for field in fields {
            if let Some(value) = record.encrypted_data.get(&field.name) {
                let decrypted = match &scope {
                    Some((key, scope)) => self.decrypt_field_scoped(value, field, key, scope),
                    None => value.clone(),
                };
                plain.insert(field.name.clone(), decrypted);
            }
        }

        let unknown = record
            .encrypted_data
            .keys()
            .filter(|name| !fields.iter().any(|f| &f.name == *name))
            .count();
        if unknown > 0 {
            trace!(unknown, "skipped encrypted values without a field config");
        }

        plain
    }

    /// Decrypts a page of records, preserving order.
    pub fn decrypt_records(
        &self,
        records: &[TableRecord],
        fields: &[FieldConfig],
        key: Option<&TableKey>,
    ) -> Vec<PlainRecord> {
        records
            .iter()
            .map(|record| self.decrypt_record(record, fields, key))
            .collect()
    }

    /// Like [`Self::decrypt_records`], split across up to `shards` scoped
    /// threads that share this cipher's cache. Output order matches input.
    pub fn decrypt_records_sharded(
        &self,
        records: &[TableRecord],
        fields: &[FieldConfig],
        key: Option<&TableKey>,
        shards: usize,
    ) -> Vec<PlainRecord> {
        let shards = shards.max(1);
        if shards == 1 || records.len() < 2 {
            return self.decrypt_records(records, fields, key);
        }
        let chunk_size = records.len().div_ceil(shards);

        std::thread::scope(|scope| {
            let handles: Vec<_> = records
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.decrypt_records(chunk, fields, key)))
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        })
    }

    // ========================================================================
    // Write path
    // ========================================================================

    /// Encrypts one field value according to its scheme plan.
    pub fn encrypt_field(
        &self,
        value: &Value,
        field: &FieldConfig,
        key: &TableKey,
    ) -> RecordResult<EncryptedField> {
        let plan = self.resolver.plan(field.field_type);
        if value.is_null() {
            return Ok(EncryptedField::plain(Value::Null));
        }

        let keywords = match (plan.keyword_hash, value) {
            (true, Value::String(text)) => keyword_tokens(text, key),
            _ => Vec::new(),
        };

        let (value, encrypted) = match plan.primary {
            EncryptionScheme::AesCbc => {
                let text = value_as_text(value)?;
                (Value::String(encrypt_aes_cbc(&text, key)?), true)
            }
            EncryptionScheme::OrderPreserving => {
                let domain = ope_domain(field)?;
                let ope = ope_value_from_json(domain, value)?;
                (Value::String(encrypt_order_preserving(&ope, key)?), true)
            }
            EncryptionScheme::KeywordHash | EncryptionScheme::None => (value.clone(), false),
        };

        Ok(EncryptedField {
            value,
            encrypted,
            keywords,
        })
    }

    /// Encrypts a plaintext record for saving.
    ///
    /// Values of fields in `fields` are routed through [`Self::encrypt_field`];
    /// values with no field config are kept in `data` as-is.
    pub fn encrypt_record(
        &self,
        plain: &PlainRecord,
        fields: &[FieldConfig],
        key: &TableKey,
    ) -> RecordResult<TableRecord> {
        let by_name: HashMap<&str, &FieldConfig> =
            fields.iter().map(|f| (f.name.as_str(), f)).collect();

        let mut record = TableRecord::default();
        let mut keywords = BTreeSet::new();

        for (name, value) in plain {
            let Some(field) = by_name.get(name.as_str()) else {
                record.data.insert(name.clone(), value.clone());
                continue;
            };
            let encrypted = self.encrypt_field(value, field, key)?;
            keywords.extend(encrypted.keywords);
            if encrypted.encrypted {
                record.encrypted_data.insert(name.clone(), encrypted.value);
            } else {
                record.data.insert(name.clone(), encrypted.value);
            }
        }

        record.hashed_keywords = keywords.into_iter().collect();
        Ok(record)
    }

    /// Token to match against `hashedKeywords` for a search term, or `None`
    /// when the table is not encrypted or the term is blank.
    pub fn search_token(&self, query: &str, key: &TableKey) -> Option<String> {
        if !self.resolver.encryption_enabled() {
            return None;
        }
        search_token(query, key)
    }
}

fn scheme_name(scheme: EncryptionScheme) -> &'static str {
    match scheme {
        EncryptionScheme::AesCbc => "aes_cbc",
        EncryptionScheme::OrderPreserving => "order_preserving",
        EncryptionScheme::KeywordHash => "keyword_hash",
        EncryptionScheme::None => "none",
    }
}

fn decrypt_value(
    value: &Value,
    scheme: EncryptionScheme,
    field: &FieldConfig,
    key: &TableKey,
) -> CryptoResult<Value> {
    let Value::String(encoded) = value else {
        return Err(CryptoError::Encoding("ciphertext is not a string".into()));
    };
    match scheme {
        EncryptionScheme::AesCbc => try_decrypt_aes_cbc(encoded, key).map(Value::String),
        EncryptionScheme::OrderPreserving => {
            let domain = ope_domain(field)?;
            decrypt_order_preserving(encoded, domain, key).map(ope_value_to_json)
        }
        EncryptionScheme::KeywordHash | EncryptionScheme::None => Ok(value.clone()),
    }
}

fn ope_domain(field: &FieldConfig) -> CryptoResult<OpeDomain> {
    field
        .field_type
        .ope_domain()
        .ok_or_else(|| CryptoError::UnsupportedValue {
            domain: "order_preserving",
            value: field.field_type.to_string(),
        })
}

/// Text handed to AES: strings verbatim, anything else as compact JSON.
fn value_as_text(value: &Value) -> RecordResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

fn ope_value_from_json(domain: OpeDomain, value: &Value) -> CryptoResult<OpeValue> {
    let unsupported = || CryptoError::UnsupportedValue {
        domain: "order_preserving",
        value: value.to_string(),
    };
    match (domain, value) {
        (OpeDomain::Integer, Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral_f64_as_i64))
            .map(OpeValue::Integer)
            .ok_or_else(unsupported),
        (OpeDomain::Decimal, Value::Number(n)) => {
            n.as_f64().ok_or_else(unsupported).and_then(OpeValue::decimal)
        }
        (_, Value::String(s)) => OpeValue::parse(domain, s),
        _ => Err(unsupported()),
    }
}

/// Exact `i64` value of an integral float, `None` when it has a fraction or
/// lies outside the `i64` range.
fn integral_f64_as_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range.
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// Decimals with no fractional part come back as JSON integers, matching
/// how they are usually written.
fn ope_value_to_json(value: OpeValue) -> Value {
    match value {
        OpeValue::Integer(i) => Value::from(i),
        OpeValue::Decimal(f) => match integral_f64_as_i64(f) {
            Some(i) => Value::from(i),
            None => Number::from_f64(f).map_or(Value::Null, Value::Number),
        },
        other => Value::String(other.to_string()),
    }
}
