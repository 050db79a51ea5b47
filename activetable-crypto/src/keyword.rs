//! Keyed search tokens.
//!
//! The server stores `HMAC-SHA256(key, normalize(term))` for every word of a
//! record's searchable text in `hashedKeywords`. A client hashes the query
//! term the same way and asks for an exact token match, so the server never
//! learns the vocabulary.

use crate::key::TableKey;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeSet;

type HmacSha256 = Hmac<Sha256>;

/// Lowercases and trims a search term.
pub fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

/// Hashes one search term into a lowercase hex token.
pub fn hash_keyword(term: &str, key: &TableKey) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(normalize_term(term).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Splits text into normalized, de-duplicated words.
///
/// Word boundaries are any character that is neither alphanumeric nor one
/// of `@ . - _` (kept so emails and URLs stay whole tokens). Empty pieces
/// are dropped.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '@' | '.' | '-' | '_')))
        .map(|w| w.trim_matches(|c: char| matches!(c, '.' | '-' | '_')))
        .map(normalize_term)
        .filter(|w| !w.is_empty())
        .collect()
}

/// Hashes every distinct word of `text`.
///
/// Tokens are returned in a stable (sorted-by-word) order.
pub fn keyword_tokens(text: &str, key: &TableKey) -> Vec<String> {
    tokenize(text)
        .iter()
        .map(|word| hash_keyword(word, key))
        .collect()
}

/// Token to look up for a user-entered query term.
pub fn search_token(query: &str, key: &TableKey) -> Option<String> {
    let normalized = normalize_term(query);
    if normalized.is_empty() {
        return None;
    }
    Some(hash_keyword(&normalized, key))
}
