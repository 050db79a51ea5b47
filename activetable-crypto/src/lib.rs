//! Field-level encryption primitives for Active Table records.
//!
//! Everything here runs synchronously on the caller's thread:
//! - [`key`]: table key generation, format checks and auth-digest validation
//! - [`cipher`]: AES-256-CBC with a random IV per call, base64 wire format
//! - [`ope`]: keyed order-preserving encryption for sortable fields
//! - [`keyword`]: HMAC-SHA256 search tokens for exact-match lookup
//!
//! # Wire format
//!
//! AES-CBC values are `base64(IV[16] || ciphertext)` with PKCS7 padding.
//! Data already stored by other clients uses exactly this layout.
//!
//! # Failure policy
//!
//! [`decrypt_aes_cbc`] never fails: on any error it returns its input
//! unchanged. The `try_*` variants expose the underlying [`CryptoError`].

pub mod cipher;
mod error;
pub mod key;
pub mod keyword;
pub mod ope;

pub use cipher::{
    decrypt_aes_cbc, decrypt_aes_cbc_with_str, encrypt_aes_cbc, looks_like_aes_payload,
    try_decrypt_aes_cbc, BLOCK_SIZE, IV_SIZE,
};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    auth_digest, generate_key, generate_key_with_length, key_status, unlock_table_key,
    validate_against_table, validate_format, validate_key_format, KeyStatus, TableKey,
    KEY_ALPHABET, KEY_SIZE, MIN_KEY_LENGTH,
};
pub use keyword::{hash_keyword, keyword_tokens, normalize_term, search_token, tokenize};
pub use ope::{
    decrypt_order_preserving, encrypt_order_preserving, OpeDomain, OpeValue, OPE_CIPHERTEXT_LEN,
};
