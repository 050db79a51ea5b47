//! Local key-value backends.
//!
//! Keys are persisted on the device only. The backend is a plain string
//! key-value store, mirroring browser `localStorage` semantics: one flat
//! namespace, last write wins, missing keys read as `None`.

use crate::error::{KeyStoreError, KeyStoreResult};
use duckdb::{params, Connection, OptionalExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// A flat, device-local string key-value store.
pub trait LocalStore: Send + Sync {
    fn get_item(&self, key: &str) -> KeyStoreResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> KeyStoreResult<()>;

    fn remove_item(&self, key: &str) -> KeyStoreResult<()>;
}

// ============================================================================
// MemoryStore
// ============================================================================

/// Process-lifetime store, for tests and hosts without persistent storage.
#[derive(Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryStore {
    fn get_item(&self, key: &str) -> KeyStoreResult<Option<String>> {
        let items = self
            .items
            .read()
            .map_err(|e| KeyStoreError::Storage(e.to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> KeyStoreResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|e| KeyStoreError::Storage(e.to_string()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> KeyStoreResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|e| KeyStoreError::Storage(e.to_string()))?;
        items.remove(key);
        Ok(())
    }
}

// ============================================================================
// DuckDbStore
// ============================================================================

const LOCAL_STORAGE_TABLE: &str = "local_storage";

/// DuckDB-backed store that survives restarts.
#[derive(Clone)]
pub struct DuckDbStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbStore {
    /// Opens (or creates) the store database at `path`.
    pub fn open(path: &Path) -> KeyStoreResult<Self> {
        Self::from_connection(Arc::new(Mutex::new(Connection::open(path)?)))
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> KeyStoreResult<Self> {
        Self::from_connection(Arc::new(Mutex::new(Connection::open_in_memory()?)))
    }

    /// Wraps a connection shared with other components of the host.
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> KeyStoreResult<Self> {
        let store = Self { conn };
        store.ensure_table()?;
        Ok(store)
    }

    fn ensure_table(&self) -> KeyStoreResult<()> {
        let conn = self.lock_conn();
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {LOCAL_STORAGE_TABLE} (
                key VARCHAR PRIMARY KEY,
                value VARCHAR NOT NULL
            );"
        ))?;
        Ok(())
    }

    /// Acquire the connection lock, recovering from poison.
    fn lock_conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("DuckDbStore recovering from poisoned mutex");
            poisoned.into_inner()
        })
    }
}

impl LocalStore for DuckDbStore {
    fn get_item(&self, key: &str) -> KeyStoreResult<Option<String>> {
        let conn = self.lock_conn();
        let value = conn
            .query_row(
                &format!("SELECT value FROM {LOCAL_STORAGE_TABLE} WHERE key = ?"),
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> KeyStoreResult<()> {
        let conn = self.lock_conn();
        conn.execute(
            &format!("INSERT OR REPLACE INTO {LOCAL_STORAGE_TABLE} (key, value) VALUES (?, ?)"),
            params![key, value],
        )?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> KeyStoreResult<()> {
        let conn = self.lock_conn();
        conn.execute(
            &format!("DELETE FROM {LOCAL_STORAGE_TABLE} WHERE key = ?"),
            params![key],
        )?;
        Ok(())
    }
}
