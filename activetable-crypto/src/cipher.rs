//! AES-256-CBC field encryption.
//!
//! Wire format: `base64(IV[16] || AES-256-CBC-PKCS7(plaintext))`, standard
//! alphabet with padding. Every call draws a fresh IV, so equal plaintexts
//! never produce equal ciphertexts.

use crate::error::{CryptoError, CryptoResult};
use crate::key::TableKey;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use tracing::debug;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Encrypts a UTF-8 string into the base64 wire format.
pub fn encrypt_aes_cbc(plaintext: &str, key: &TableKey) -> CryptoResult<String> {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::Encryption(format!("cipher init failed: {e}")))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    let mut payload = Vec::with_capacity(IV_SIZE + ciphertext.len());
    payload.extend_from_slice(&iv);
    payload.extend_from_slice(&ciphertext);

    Ok(STANDARD.encode(payload))
}

/// Decrypts a base64 wire payload, reporting why it failed.
///
/// Prefer [`decrypt_aes_cbc`] on read paths; this variant exists for
/// callers that need the failure reason.
pub fn try_decrypt_aes_cbc(encoded: &str, key: &TableKey) -> CryptoResult<String> {
    let payload = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::Encoding(format!("invalid base64: {e}")))?;

    if payload.len() < IV_SIZE + BLOCK_SIZE {
        return Err(CryptoError::Decryption(format!(
            "payload too short: {} bytes",
            payload.len()
        )));
    }

    let (iv, ciphertext) = payload.split_at(IV_SIZE);
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::Decryption(format!(
            "ciphertext not block aligned: {} bytes",
            ciphertext.len()
        )));
    }

    let plaintext = Aes256CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| CryptoError::Decryption(format!("cipher init failed: {e}")))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption("padding check failed (wrong key?)".into()))?;

    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".into()))
}

/// Fail-safe decrypt: returns the plaintext, or `encoded` unchanged if
/// anything goes wrong (bad base64, short payload, wrong key, non-UTF-8).
///
/// Never panics and never returns partial plaintext.
pub fn decrypt_aes_cbc(encoded: &str, key: &TableKey) -> String {
    match try_decrypt_aes_cbc(encoded, key) {
        Ok(plaintext) => plaintext,
        Err(e) => {
            debug!(len = encoded.len(), "AES-CBC decrypt fell back to ciphertext: {e}");
            encoded.to_string()
        }
    }
}

/// Decrypts with a raw key string, returning `encoded` unchanged when the
/// key itself is unusable.
pub fn decrypt_aes_cbc_with_str(encoded: &str, key: &str) -> String {
    match TableKey::new(key) {
        Ok(key) => decrypt_aes_cbc(encoded, &key),
        Err(e) => {
            debug!("AES-CBC decrypt skipped: {e}");
            encoded.to_string()
        }
    }
}

/// Heuristic: does `value` have the shape of an AES-CBC wire payload?
///
/// Collaborators use this to tell "still encrypted" output apart from
/// decrypted text after a fail-safe decrypt.
pub fn looks_like_aes_payload(value: &str) -> bool {
    match STANDARD.decode(value.trim()) {
        Ok(bytes) => {
            bytes.len() >= IV_SIZE + BLOCK_SIZE && (bytes.len() - IV_SIZE) % BLOCK_SIZE == 0
        }
        Err(_) => false,
    }
}
