use activetable_crypto::{auth_digest, generate_key, KeyStatus};
use activetable_keystore::{DuckDbStore, KeyStore, KeyStoreError, LocalStore, MemoryStore};

const KEY: &str = "abcdef1234567890ABCDEF1234567890";
const WRONG_KEY: &str = "wrongkey1234567890WRONGKEY123456";

// ── Persistence ──────────────────────────────────────────────────

#[test]
fn duckdb_keys_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keys.duckdb");

    {
        let keys = KeyStore::new(DuckDbStore::open(&path).unwrap());
        keys.save("ws-1", "tbl-1", KEY).unwrap();
    }

    let keys = KeyStore::new(DuckDbStore::open(&path).unwrap());
    assert_eq!(keys.get("ws-1", "tbl-1").unwrap().as_deref(), Some(KEY));
}

#[test]
fn keys_are_namespaced_per_table() {
    let keys = KeyStore::new(DuckDbStore::open_in_memory().unwrap());
    let other = generate_key();

    keys.save("ws", "a", KEY).unwrap();
    keys.save("ws", "b", &other).unwrap();

    assert_eq!(keys.get("ws", "a").unwrap().as_deref(), Some(KEY));
    assert_eq!(keys.get("ws", "b").unwrap().as_deref(), Some(other.as_str()));
    assert_eq!(
        keys.store().get_item("e2ee_key_ws_a").unwrap().as_deref(),
        Some(KEY)
    );
}

#[test]
fn save_overwrites_previous_key() {
    let keys = KeyStore::new(DuckDbStore::open_in_memory().unwrap());
    keys.save("ws", "t", KEY).unwrap();
    keys.save("ws", "t", WRONG_KEY).unwrap();
    assert_eq!(keys.get("ws", "t").unwrap().as_deref(), Some(WRONG_KEY));
}

#[test]
fn invalid_key_is_not_persisted() {
    let keys = KeyStore::new(DuckDbStore::open_in_memory().unwrap());
    let result = keys.save("ws", "t", "");
    assert!(matches!(result, Err(KeyStoreError::KeyFormat { length: 0 })));
    assert!(!keys.has("ws", "t").unwrap());
}

#[test]
fn non_ascii_key_of_32_characters_is_not_persisted() {
    let keys = KeyStore::new(DuckDbStore::open_in_memory().unwrap());
    let key = format!("é{}", &KEY[1..]);
    assert_eq!(key.chars().count(), 32);

    let result = keys.save("ws", "t", &key);
    assert!(matches!(result, Err(KeyStoreError::KeyFormat { length: 32 })));
    assert!(!keys.has("ws", "t").unwrap());
}

// ── Validation against the table ─────────────────────────────────

#[test]
fn load_validated_returns_matching_key() {
    let keys = KeyStore::new(MemoryStore::new());
    keys.save("ws", "t", KEY).unwrap();

    let loaded = keys.load_validated("ws", "t", &auth_digest(KEY)).unwrap();
    assert_eq!(loaded.unwrap().auth_digest(), auth_digest(KEY));
}

#[test]
fn load_validated_rejects_mismatch_but_keeps_entry() {
    let keys = KeyStore::new(MemoryStore::new());
    keys.save("ws", "t", WRONG_KEY).unwrap();

    assert!(keys.load_validated("ws", "t", &auth_digest(KEY)).unwrap().is_none());
    assert!(keys.has("ws", "t").unwrap());
}

#[test]
fn status_reports_missing_and_mismatch() {
    let keys = KeyStore::new(MemoryStore::new());
    let digest = auth_digest(KEY);

    assert_eq!(keys.status("ws", "t", &digest).unwrap(), KeyStatus::Missing);
    keys.save("ws", "t", WRONG_KEY).unwrap();
    assert_eq!(keys.status("ws", "t", &digest).unwrap(), KeyStatus::Mismatch);
    keys.save("ws", "t", KEY).unwrap();
    assert_eq!(keys.status("ws", "t", &digest).unwrap(), KeyStatus::Valid);
}
