//! Per-table key persistence.

use crate::error::{KeyStoreError, KeyStoreResult};
use crate::store::LocalStore;
use activetable_crypto::{key_status, unlock_table_key, KeyStatus, TableKey, KEY_SIZE};
use tracing::{debug, warn};

/// Prefix of every storage entry: `e2ee_key_{workspaceId}_{tableId}`.
pub const STORAGE_KEY_PREFIX: &str = "e2ee_key_";

/// Storage entry name for a (workspace, table) pair.
pub fn storage_key(workspace_id: &str, table_id: &str) -> String {
    format!("{STORAGE_KEY_PREFIX}{workspace_id}_{table_id}")
}

/// Saves, loads and forgets table keys in a device-local store.
///
/// Keys are stored as the raw 32-character string and never leave the
/// backing store through this type.
pub struct KeyStore<S: LocalStore> {
    store: S,
}

impl<S: LocalStore> KeyStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persists the key for a table, replacing any previous one.
    ///
    /// Rejects keys that are not exactly 32 ASCII characters, the only
    /// strings that map onto a 32-byte AES key.
    pub fn save(&self, workspace_id: &str, table_id: &str, key: &str) -> KeyStoreResult<()> {
        if !key.is_ascii() || key.len() != KEY_SIZE {
            return Err(KeyStoreError::KeyFormat {
                length: key.chars().count(),
            });
        }
        self.store
            .set_item(&storage_key(workspace_id, table_id), key)?;
        debug!(workspace_id, table_id, "saved table key");
        Ok(())
    }

    /// Returns the stored key, if any.
    pub fn get(&self, workspace_id: &str, table_id: &str) -> KeyStoreResult<Option<String>> {
        self.store.get_item(&storage_key(workspace_id, table_id))
    }

    /// Removes the stored key. Succeeds if none was stored.
    pub fn clear(&self, workspace_id: &str, table_id: &str) -> KeyStoreResult<()> {
        self.store.remove_item(&storage_key(workspace_id, table_id))?;
        debug!(workspace_id, table_id, "cleared table key");
        Ok(())
    }

    pub fn has(&self, workspace_id: &str, table_id: &str) -> KeyStoreResult<bool> {
        Ok(self.get(workspace_id, table_id)?.is_some())
    }

    /// Classifies the stored key against the table's auth digest.
    pub fn status(
        &self,
        workspace_id: &str,
        table_id: &str,
        auth_digest: &str,
    ) -> KeyStoreResult<KeyStatus> {
        let stored = self.get(workspace_id, table_id)?;
        Ok(key_status(stored.as_deref(), auth_digest))
    }

    /// Loads the stored key only if it validates against `auth_digest`.
    ///
    /// A stored key that no longer matches (e.g. the table was recreated)
    /// yields `None`; it is left in place for the user to replace.
    pub fn load_validated(
        &self,
        workspace_id: &str,
        table_id: &str,
        auth_digest: &str,
    ) -> KeyStoreResult<Option<TableKey>> {
        let Some(stored) = self.get(workspace_id, table_id)? else {
            return Ok(None);
        };
        let key = unlock_table_key(&stored, auth_digest);
        if key.is_none() {
            warn!(workspace_id, table_id, "stored table key does not match auth digest");
        }
        Ok(key)
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn storage_key_format() {
        assert_eq!(storage_key("ws1", "tbl9"), "e2ee_key_ws1_tbl9");
    }

    #[test]
    fn save_rejects_wrong_length() {
        let keys = KeyStore::new(MemoryStore::new());
        let err = keys.save("ws", "t", "too-short").unwrap_err();
        assert!(matches!(err, KeyStoreError::KeyFormat { length: 9 }));

        let err = keys.save("ws", "t", &"a".repeat(33)).unwrap_err();
        assert!(matches!(err, KeyStoreError::KeyFormat { length: 33 }));
        assert!(keys.store().is_empty());
    }

    #[test]
    fn save_get_has_clear() {
        let keys = KeyStore::new(MemoryStore::new());
        let key = "abcdef1234567890ABCDEF1234567890";

        assert!(!keys.has("ws", "t").unwrap());
        keys.save("ws", "t", key).unwrap();
        assert!(keys.has("ws", "t").unwrap());
        assert_eq!(keys.get("ws", "t").unwrap().as_deref(), Some(key));
        assert_eq!(keys.get("ws", "other").unwrap(), None);

        keys.clear("ws", "t").unwrap();
        assert!(!keys.has("ws", "t").unwrap());
    }
}
