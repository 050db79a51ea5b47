//! Device-local storage for Active Table encryption keys.
//!
//! Table keys are never transmitted. They live in memory while a table is
//! open and in a local key-value store between sessions, namespaced as
//! `e2ee_key_{workspaceId}_{tableId}`.
//!
//! # Backends
//!
//! - [`MemoryStore`]: in-process map, for tests and ephemeral hosts
//! - [`DuckDbStore`]: a `local_storage` table in a DuckDB database

mod error;
mod keystore;
mod store;

pub use error::{KeyStoreError, KeyStoreResult};
pub use keystore::{storage_key, KeyStore, STORAGE_KEY_PREFIX};
pub use store::{DuckDbStore, LocalStore, MemoryStore};
