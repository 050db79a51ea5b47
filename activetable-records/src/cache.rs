//! Bounded LRU + TTL memo of field decryptions.
//!
//! Entries are keyed by `scope:fieldName:FIELD_TYPE:json(ciphertext)`,
//! where the scope is the fingerprint of the table key that produced the
//! plaintext ([`key_scope`]). A different key never sees another key's
//! entries, so a shared cache cannot hand plaintext to a caller holding
//! the wrong key. A read
//! refreshes the entry's timestamp, so eviction removes the entry touched
//! least recently (ties go to the one read fewer times). An entry older
//! than the TTL is dropped on the read that finds it.
//!
//! [`DecryptionCache`] is single-owner (`&mut self`). Share it across
//! threads through [`SharedDecryptionCache`].

use crate::config::EngineConfig;
use crate::field::FieldType;
use activetable_crypto::TableKey;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

// ============================================================================
// Clock
// ============================================================================

/// Time source for entry timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to (for tests).
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ============================================================================
// DecryptionCache
// ============================================================================

/// Size and lifetime limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for CacheConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_size: config.cache_max_size,
            ttl: config.cache_ttl(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub timestamp: Instant,
    pub access_count: u64,
}

/// Counters and limits, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub ttl: Duration,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
}

/// Cache scope of a table key: its auth digest.
pub fn key_scope(key: &TableKey) -> String {
    key.auth_digest()
}

/// Composite cache key for one ciphertext of one field under one key scope.
pub fn cache_key(scope: &str, encrypted: &Value, field_name: &str, field_type: FieldType) -> String {
    format!("{scope}:{field_name}:{}:{encrypted}", field_type.as_str())
}

pub struct DecryptionCache {
    entries: HashMap<String, CacheEntry>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
}

impl DecryptionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            clock,
            hits: 0,
            misses: 0,
            evictions: 0,
            expired: 0,
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.timestamp) > self.config.ttl
    }

    /// Returns the memoized plaintext and refreshes the entry.
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(
        &mut self,
        scope: &str,
        encrypted: &Value,
        field_name: &str,
        field_type: FieldType,
    ) -> Option<Value> {
        let key = cache_key(scope, encrypted, field_name, field_type);
        let now = self.clock.now();

        let Some(entry) = self.entries.get(&key) else {
            self.misses += 1;
            return None;
        };

        if self.is_expired(entry, now) {
            self.entries.remove(&key);
            self.expired += 1;
            self.misses += 1;
            trace!(field_name, "cache entry expired");
            return None;
        }

        let entry = self.entries.get_mut(&key)?;
        entry.access_count += 1;
        entry.timestamp = now;
        self.hits += 1;
        Some(entry.value.clone())
    }

    /// Stores a plaintext, evicting the least recently used entry first if
    /// the cache is full and the key is new.
    pub fn set(
        &mut self,
        scope: &str,
        encrypted: &Value,
        field_name: &str,
        field_type: FieldType,
        value: Value,
    ) {
        if self.config.max_size == 0 {
            return;
        }
        let key = cache_key(scope, encrypted, field_name, field_type);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_size {
            self.evict_lru();
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                timestamp: self.clock.now(),
                access_count: 1,
            },
        );
    }

    /// Whether a live entry exists. Does not refresh or evict.
    pub fn has(&self, scope: &str, encrypted: &Value, field_name: &str, field_type: FieldType) -> bool {
        let now = self.clock.now();
        self.entries
            .get(&cache_key(scope, encrypted, field_name, field_type))
            .is_some_and(|entry| !self.is_expired(entry, now))
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// Only `Ok` results are memoized, so a failed decryption is retried on
    /// the next call (e.g. after the user enters the correct key).
    pub fn get_or_try_insert_with<E>(
        &mut self,
        scope: &str,
        encrypted: &Value,
        field_name: &str,
        field_type: FieldType,
        compute: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, E> {
        if let Some(hit) = self.get(scope, encrypted, field_name, field_type) {
            return Ok(hit);
        }
        let value = compute()?;
        self.set(scope, encrypted, field_name, field_type, value.clone());
        Ok(value)
    }

    /// Removes the entry with the oldest timestamp, ties broken by the
    /// lowest access count.
    fn evict_lru(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by(|(_, a), (_, b)| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then(a.access_count.cmp(&b.access_count))
            })
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions += 1;
            trace!("evicted least recently used cache entry");
        }
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn clear_expired(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = self.config.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.timestamp) <= ttl);
        let removed = before - self.entries.len();
        self.expired += removed as u64;
        if removed > 0 {
            debug!(removed, "cleared expired cache entries");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.entries.len(),
            max_size: self.config.max_size,
            ttl: self.config.ttl,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            expired: self.expired,
        }
    }
}

impl Default for DecryptionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

// ============================================================================
// SharedDecryptionCache
// ============================================================================

/// Cloneable, thread-safe handle to a [`DecryptionCache`].
#[derive(Clone)]
pub struct SharedDecryptionCache {
    inner: Arc<Mutex<DecryptionCache>>,
}

static GLOBAL_CACHE: OnceLock<SharedDecryptionCache> = OnceLock::new();

impl SharedDecryptionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::from_cache(DecryptionCache::new(config))
    }

    pub fn from_cache(cache: DecryptionCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    /// Process-wide default instance with default limits.
    ///
    /// Tests and hosts that need isolation construct their own instance.
    pub fn global() -> &'static SharedDecryptionCache {
        GLOBAL_CACHE.get_or_init(|| Self::new(CacheConfig::default()))
    }

    /// Acquire the cache lock, recovering from poison.
    pub fn lock(&self) -> MutexGuard<'_, DecryptionCache> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("decryption cache recovering from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Like [`DecryptionCache::get_or_try_insert_with`], but `compute` runs
    /// without holding the lock so concurrent callers are not serialized on
    /// the cipher work.
    pub fn get_or_try_insert_with<E>(
        &self,
        scope: &str,
        encrypted: &Value,
        field_name: &str,
        field_type: FieldType,
        compute: impl FnOnce() -> Result<Value, E>,
    ) -> Result<Value, E> {
        if let Some(hit) = self.lock().get(scope, encrypted, field_name, field_type) {
            return Ok(hit);
        }
        let value = compute()?;
        self.lock()
            .set(scope, encrypted, field_name, field_type, value.clone());
        Ok(value)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn clear_expired(&self) -> usize {
        self.lock().clear_expired()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }
}

impl Default for SharedDecryptionCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const S: &str = "scope-a";

    fn cache(max_size: usize, ttl: Duration) -> (DecryptionCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = DecryptionCache::with_clock(CacheConfig { max_size, ttl }, clock.clone());
        (cache, clock)
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            cache_key("k1", &json!("abc=="), "title", FieldType::Text),
            "k1:title:TEXT:\"abc==\""
        );
    }

    #[test]
    fn set_then_get() {
        let (mut c, _) = cache(10, Duration::from_secs(60));
        let ct = json!("cipher");
        assert_eq!(c.get(S, &ct, "title", FieldType::Text), None);
        c.set(S, &ct, "title", FieldType::Text, json!("plain"));
        assert_eq!(c.get(S, &ct, "title", FieldType::Text), Some(json!("plain")));
        // Same ciphertext under another field is a different slot.
        assert_eq!(c.get(S, &ct, "notes", FieldType::Text), None);
        assert_eq!(c.get(S, &ct, "title", FieldType::LongText), None);
    }

    #[test]
    fn expired_entry_is_a_miss_and_removed() {
        let (mut c, clock) = cache(10, Duration::from_secs(300));
        let ct = json!("cipher");
        c.set(S, &ct, "f", FieldType::Text, json!("plain"));

        clock.advance(Duration::from_secs(300));
        assert!(c.has(S, &ct, "f", FieldType::Text), "exactly at ttl is still live");

        clock.advance(Duration::from_secs(1));
        assert!(!c.has(S, &ct, "f", FieldType::Text));
        assert_eq!(c.get(S, &ct, "f", FieldType::Text), None);
        assert!(c.is_empty());
        assert_eq!(c.stats().expired, 1);
    }

    #[test]
    fn read_keeps_entry_alive() {
        let (mut c, clock) = cache(10, Duration::from_secs(10));
        let ct = json!("cipher");
        c.set(S, &ct, "f", FieldType::Text, json!("plain"));

        for _ in 0..5 {
            clock.advance(Duration::from_secs(8));
            assert!(c.get(S, &ct, "f", FieldType::Text).is_some());
        }
    }

    #[test]
    fn full_cache_evicts_least_recently_touched() {
        let (mut c, clock) = cache(3, Duration::from_secs(300));
        for name in ["a", "b", "c"] {
            c.set(S, &json!(name), name, FieldType::Text, json!(name));
            clock.advance(Duration::from_secs(1));
        }
        // Touch "a" so "b" becomes the oldest.
        assert!(c.get(S, &json!("a"), "a", FieldType::Text).is_some());
        clock.advance(Duration::from_secs(1));

        c.set(S, &json!("d"), "d", FieldType::Text, json!("d"));
        assert_eq!(c.len(), 3);
        assert!(!c.has(S, &json!("b"), "b", FieldType::Text));
        for name in ["a", "c", "d"] {
            assert!(c.has(S, &json!(name), name, FieldType::Text));
        }
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn eviction_tie_breaks_on_access_count() {
        let (mut c, clock) = cache(2, Duration::from_secs(300));
        c.set(S, &json!("x"), "x", FieldType::Text, json!("x"));
        c.set(S, &json!("y"), "y", FieldType::Text, json!("y"));
        // Same timestamp for both, "x" read once more.
        assert!(c.get(S, &json!("x"), "x", FieldType::Text).is_some());

        clock.advance(Duration::from_secs(1));
        c.set(S, &json!("z"), "z", FieldType::Text, json!("z"));
        assert!(c.has(S, &json!("x"), "x", FieldType::Text));
        assert!(!c.has(S, &json!("y"), "y", FieldType::Text));
    }

    #[test]
    fn overwrite_does_not_evict() {
        let (mut c, _) = cache(2, Duration::from_secs(300));
        c.set(S, &json!("a"), "a", FieldType::Text, json!(1));
        c.set(S, &json!("b"), "b", FieldType::Text, json!(2));
        c.set(S, &json!("a"), "a", FieldType::Text, json!(3));
        assert_eq!(c.len(), 2);
        assert_eq!(c.stats().evictions, 0);
        assert_eq!(c.get(S, &json!("a"), "a", FieldType::Text), Some(json!(3)));
    }

    #[test]
    fn clear_expired_sweeps_only_stale() {
        let (mut c, clock) = cache(10, Duration::from_secs(10));
        c.set(S, &json!("old"), "f", FieldType::Text, json!("old"));
        clock.advance(Duration::from_secs(11));
        c.set(S, &json!("new"), "f", FieldType::Text, json!("new"));

        assert_eq!(c.clear_expired(), 1);
        assert_eq!(c.len(), 1);
        c.clear();
        assert!(c.is_empty());
    }

    #[test]
    fn get_or_try_insert_memoizes_only_success() {
        let (mut c, _) = cache(10, Duration::from_secs(60));
        let ct = json!("cipher");
        let mut calls = 0;

        let first: Result<Value, ()> = c.get_or_try_insert_with(S, &ct, "f", FieldType::Text, || {
            calls += 1;
            Err(())
        });
        assert!(first.is_err());

        for _ in 0..3 {
            let out: Result<Value, ()> = c.get_or_try_insert_with(S, &ct, "f", FieldType::Text, || {
                calls += 1;
                Ok(json!("plain"))
            });
            assert_eq!(out, Ok(json!("plain")));
        }
        assert_eq!(calls, 2);
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let (mut c, _) = cache(10, Duration::from_secs(60));
        let ct = json!("cipher");
        c.get(S, &ct, "f", FieldType::Text);
        c.set(S, &ct, "f", FieldType::Text, json!("p"));
        c.get(S, &ct, "f", FieldType::Text);
        c.get(S, &ct, "f", FieldType::Text);

        let stats = c.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, 10);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn shared_handle_sees_same_entries() {
        let shared = SharedDecryptionCache::new(CacheConfig::default());
        let clone = shared.clone();
        let ct = json!("cipher");
        let _: Result<Value, ()> =
            shared.get_or_try_insert_with(S, &ct, "f", FieldType::Text, || Ok(json!("p")));
        assert!(clone.lock().has(S, &ct, "f", FieldType::Text));
        assert_eq!(clone.stats().size, 1);
    }

    #[test]
    fn scopes_do_not_share_entries() {
        let (mut c, _) = cache(10, Duration::from_secs(60));
        let ct = json!("cipher");
        c.set("scope-a", &ct, "f", FieldType::Text, json!("plain"));

        assert!(!c.has("scope-b", &ct, "f", FieldType::Text));
        assert_eq!(c.get("scope-b", &ct, "f", FieldType::Text), None);
        assert_eq!(c.get("scope-a", &ct, "f", FieldType::Text), Some(json!("plain")));
    }

    #[test]
    fn key_scope_is_the_auth_digest() {
        let key = TableKey::new("abcdef1234567890ABCDEF1234567890").unwrap();
        assert_eq!(key_scope(&key), key.auth_digest());
    }
}
