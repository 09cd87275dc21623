//! Expiring, count-bounded response cache.
//!
//! Each `CacheStore` owns one storage slot and keeps its whole collection
//! there as a single JSON document. Every mutation is a read-modify-write of
//! that document. Eviction is oldest-`stored_at`-first, not by access time.

mod storage;

use crate::config::CacheConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use storage::{KeyValueStorage, MemoryStorage, SqliteStorage, StorageError};

/// Millisecond wall clock, injectable for tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        let ms = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A stored payload with its lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Milliseconds since epoch.
    pub stored_at: i64,
    pub expires_at: i64,
    /// Insertion order, breaks `stored_at` ties within one millisecond.
    #[serde(default)]
    pub seq: u64,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Everything one cache domain persists under its slot.
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedCollection<T> {
    pub entries: HashMap<String, CacheEntry<T>>,
}

impl<T> Default for CachedCollection<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> CachedCollection<T> {
    fn next_seq(&self) -> u64 {
        self.entries.values().map(|e| e.seq + 1).max().unwrap_or(0)
    }

    /// Drop expired entries, then the oldest until at most `max_items` remain.
    /// Returns how many entries were removed.
    fn sweep(&mut self, now_ms: i64, max_items: usize) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now_ms));

        if self.entries.len() > max_items {
            let mut by_age: Vec<(i64, u64, String)> = self
                .entries
                .iter()
                .map(|(k, e)| (e.stored_at, e.seq, k.clone()))
                .collect();
            by_age.sort_unstable();
            let excess = self.entries.len() - max_items;
            for (_, _, key) in by_age.into_iter().take(excess) {
                self.entries.remove(&key);
            }
        }

        before - self.entries.len()
    }
}

/// Expiring cache for one logical data domain.
pub struct CacheStore<T> {
    slot: String,
    storage: Arc<dyn KeyValueStorage>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for CacheStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("slot", &self.slot)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T> CacheStore<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    pub fn new(
        slot: impl Into<String>,
        storage: Arc<dyn KeyValueStorage>,
        config: CacheConfig,
    ) -> Self {
        Self::with_clock(slot, storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        slot: impl Into<String>,
        storage: Arc<dyn KeyValueStorage>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            slot: slot.into(),
            storage,
            config,
            clock,
            write_lock: Mutex::new(()),
            _payload: PhantomData,
        }
    }

    #[must_use]
    pub fn slot(&self) -> &str {
        &self.slot
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Store `data` under `key`. Never fails: storage errors are logged.
    pub async fn set(&self, key: &str, data: T, max_age: Option<Duration>) {
        if !self.config.enabled {
            return;
        }
        let max_age = max_age.unwrap_or_else(|| self.config.max_age());
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX).max(1);

        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await;
        let now = self.clock.now_ms();
        let seq = collection.next_seq();
        collection.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                stored_at: now,
                expires_at: now.saturating_add(max_age_ms),
                seq,
            },
        );

        let evicted = collection.sweep(now, self.config.max_items);
        if evicted > 0 {
            debug!("Cache {}: evicted {} entries", self.slot, evicted);
        }
        self.persist(&collection).await;
    }

    /// Fetch a live entry. Expired entries are removed on the way.
    pub async fn get(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }

        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await;
        let now = self.clock.now_ms();
        let expired = collection.entries.get(key)?.is_expired(now);
        if expired {
            collection.entries.remove(key);
            self.persist(&collection).await;
            return None;
        }
        collection.entries.remove(key).map(|e| e.data)
    }

    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn remove(&self, key: &str) {
        let _guard = self.write_lock.lock().await;
        let mut collection = self.load().await;
        if collection.entries.remove(key).is_some() {
            self.persist(&collection).await;
        }
    }

    pub async fn clear(&self) {
        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.storage.remove(&self.slot).await {
            warn!("Cache {}: failed to clear: {}", self.slot, e);
        }
    }

    /// Keys of live entries, oldest first.
    pub async fn keys(&self) -> Vec<String> {
        if !self.config.enabled {
            return Vec::new();
        }
        let collection = self.load().await;
        let now = self.clock.now_ms();
        let mut live: Vec<(i64, u64, String)> = collection
            .entries
            .into_iter()
            .filter(|(_, e)| !e.is_expired(now))
            .map(|(k, e)| (e.stored_at, e.seq, k))
            .collect();
        live.sort_unstable();
        live.into_iter().map(|(_, _, k)| k).collect()
    }

    pub async fn size(&self) -> usize {
        self.keys().await.len()
    }

    /// Read the collection. Missing, unreadable or corrupt data reads as empty.
    async fn load(&self) -> CachedCollection<T> {
        let bytes = match self.storage.get(&self.slot).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return CachedCollection::default(),
            Err(e) => {
                warn!("Cache {}: read failed, treating as empty: {}", self.slot, e);
                return CachedCollection::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!("Cache {}: corrupt data, treating as empty: {}", self.slot, e);
            CachedCollection::default()
        })
    }

    async fn persist(&self, collection: &CachedCollection<T>) {
        let bytes = match serde_json::to_vec(collection) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cache {}: failed to serialize: {}", self.slot, e);
                return;
            }
        };
        if let Err(e) = self.storage.set(&self.slot, bytes).await {
            warn!("Cache {}: write failed: {}", self.slot, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: i64 = 1_700_000_000_000;

    fn config(max_items: usize) -> CacheConfig {
        CacheConfig {
            enabled: true,
            max_age_secs: 300,
            max_items,
        }
    }

    fn store(max_items: usize) -> (CacheStore<String>, Arc<ManualClock>, Arc<MemoryStorage>) {
        let clock = Arc::new(ManualClock::new(START));
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheStore::with_clock("test_cache", storage.clone(), config(max_items), clock.clone());
        (cache, clock, storage)
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (cache, clock, _) = store(10);
        cache.set("k", "v".to_string(), Some(Duration::from_secs(10))).await;

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.has("k").await);
    }

    #[tokio::test]
    async fn test_default_max_age_from_config() {
        let (cache, clock, _) = store(10);
        cache.set("k", "v".to_string(), None).await;

        clock.advance(Duration::from_secs(299));
        assert!(cache.has("k").await);
        clock.advance(Duration::from_secs(1));
        assert!(!cache.has("k").await);
    }

    #[tokio::test]
    async fn test_expired_entry_removed_lazily() {
        let (cache, clock, storage) = store(10);
        cache.set("old", "a".to_string(), Some(Duration::from_secs(1))).await;
        cache.set("new", "b".to_string(), Some(Duration::from_secs(60))).await;
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.get("old").await, None);

        let raw = storage.get("test_cache").await.unwrap().unwrap();
        let collection: CachedCollection<String> = serde_json::from_slice(&raw).unwrap();
        assert!(!collection.entries.contains_key("old"));
        assert!(collection.entries.contains_key("new"));
    }

    #[tokio::test]
    async fn test_eviction_keeps_most_recent() {
        let (cache, clock, _) = store(3);
        for i in 0..5 {
            cache.set(&format!("k{i}"), format!("v{i}"), None).await;
            clock.advance(Duration::from_millis(5));
        }

        assert_eq!(cache.size().await, 3);
        assert_eq!(cache.keys().await, vec!["k2", "k3", "k4"]);
    }

    #[tokio::test]
    async fn test_eviction_ties_broken_by_insertion_order() {
        let (cache, _, _) = store(2);
        // Same millisecond for every insert.
        cache.set("a", "1".into(), None).await;
        cache.set("b", "2".into(), None).await;
        cache.set("c", "3".into(), None).await;

        assert_eq!(cache.keys().await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_reads_do_not_protect_from_eviction() {
        let (cache, clock, _) = store(2);
        cache.set("hot", "1".into(), None).await;
        clock.advance(Duration::from_millis(1));
        cache.set("cold", "2".into(), None).await;
        clock.advance(Duration::from_millis(1));

        for _ in 0..5 {
            assert!(cache.has("hot").await);
        }
        cache.set("newest", "3".into(), None).await;

        assert!(!cache.has("hot").await);
        assert!(cache.has("cold").await);
        assert!(cache.has("newest").await);
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_entry() {
        let (cache, clock, _) = store(2);
        cache.set("a", "old".into(), None).await;
        clock.advance(Duration::from_millis(1));
        cache.set("b", "x".into(), None).await;
        clock.advance(Duration::from_millis(1));
        cache.set("a", "new".into(), None).await;
        clock.advance(Duration::from_millis(1));
        cache.set("c", "y".into(), None).await;

        assert_eq!(cache.get("a").await.as_deref(), Some("new"));
        assert!(!cache.has("b").await);
    }

    #[tokio::test]
    async fn test_disabled_cache_is_noop() {
        let storage = Arc::new(MemoryStorage::new());
        let cache: CacheStore<String> = CacheStore::new(
            "off",
            storage.clone(),
            CacheConfig {
                enabled: false,
                ..config(10)
            },
        );
        cache.set("k", "v".into(), None).await;

        assert_eq!(cache.get("k").await, None);
        assert!(storage.get("off").await.unwrap().is_none());
        assert!(cache.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_backing_data_reads_empty() {
        let (cache, _, storage) = store(10);
        storage.set("test_cache", b"{not json".to_vec()).await.unwrap();

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.size().await, 0);

        // A write replaces the corrupt blob.
        cache.set("k", "v".into(), None).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_quota_failure_is_swallowed() {
        let clock = Arc::new(ManualClock::new(START));
        let cache: CacheStore<String> = CacheStore::with_clock(
            "tiny",
            Arc::new(MemoryStorage::with_quota(16)),
            config(10),
            clock,
        );

        cache.set("k", "a value that will not fit".into(), None).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (cache, _, _) = store(10);
        cache.set("a", "1".into(), None).await;
        cache.set("b", "2".into(), None).await;

        cache.remove("a").await;
        assert_eq!(cache.keys().await, vec!["b"]);

        cache.clear().await;
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn test_stores_share_medium_without_clashing() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let search: CacheStore<String> = CacheStore::new("search", storage.clone(), config(10));
        let saved: CacheStore<u32> = CacheStore::new("saved", storage, config(10));

        search.set("k", "results".into(), None).await;
        saved.set("k", 7, None).await;

        assert_eq!(search.get("k").await.as_deref(), Some("results"));
        assert_eq!(saved.get("k").await, Some(7));
    }
}
