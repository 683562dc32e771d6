//! Process-wide cache engine.
//!
//! `CacheManager` owns the store and the tag index behind a single mutex, so
//! every store mutation and its index update happen in one critical section.
//! The lock is never held across an `.await`: caller-supplied fetchers run
//! before the write that stores their result.
//!
//! Concurrent misses on the same key are not deduplicated. Each caller runs
//! its own fetcher and the last write wins.
//!
//! Pattern invalidation scans every stored key, which is linear in the store
//! size.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tagcache_core::{CacheKey, TagCacheResult};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, CacheOptions};
use crate::pattern::compile_pattern;
use crate::stats::{CacheStats, StatsCounters};
use crate::store::{CacheStore, InMemoryStore};
use crate::sweeper::{sweep_task, SweeperHandle};
use crate::tag_index::TagIndex;

/// Store plus tag index. Only ever touched under the manager's lock.
struct CacheState {
    store: Box<dyn CacheStore<Value>>,
    tags: TagIndex,
}

/// Outcome of a single insert.
struct Inserted {
    evicted: bool,
}

impl CacheState {
    fn insert(&mut self, entry: CacheEntry<Value>) -> Inserted {
        let key = entry.key.clone();
        let tags = entry.tags.clone();

        let write = self.store.set(entry);
        if let Some(old) = &write.replaced {
            self.tags.unindex_entry(old);
        }
        if let Some(evicted) = &write.evicted {
            self.tags.unindex_entry(evicted);
        }
        for tag in &tags {
            self.tags.add(tag, &key);
        }

        Inserted {
            evicted: write.evicted.is_some(),
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<Value>> {
        let entry = self.store.delete(key)?;
        self.tags.unindex_entry(&entry);
        Some(entry)
    }

    fn live(&self, key: &str, now: Instant) -> Option<&CacheEntry<Value>> {
        self.store.get(key).filter(|e| !e.is_expired_at(now))
    }

    fn clear(&mut self) {
        self.store.clear();
        self.tags.clear();
    }
}

/// Tag-indexed TTL cache shared by every façade in the process.
///
/// Construct once, wrap in an [`Arc`] and hand clones to
/// `TenantCache`/`QueryCache` instances.
pub struct CacheManager {
    state: Mutex<CacheState>,
    config: CacheConfig,
    enabled: AtomicBool,
    debug: AtomicBool,
    stats: StatsCounters,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("enabled", &self.is_enabled())
            .field("debug", &self.is_debug())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::build(
            CacheConfig::default(),
            Box::new(InMemoryStore::new(CacheConfig::default().max_entries)),
        )
    }
}

impl CacheManager {
    /// Create a manager backed by an [`InMemoryStore`] of
    /// `config.max_entries` entries.
    pub fn new(config: CacheConfig) -> TagCacheResult<Self> {
        config.validate()?;
        let store = InMemoryStore::new(config.max_entries);
        Ok(Self::build(config, Box::new(store)))
    }

    /// Create a manager over a caller-supplied store.
    ///
    /// The store's own capacity applies; `config.max_entries` is ignored.
    pub fn with_store<S>(config: CacheConfig, store: S) -> TagCacheResult<Self>
    where
        S: CacheStore<Value> + 'static,
    {
        config.validate()?;
        Ok(Self::build(config, Box::new(store)))
    }

    fn build(config: CacheConfig, store: Box<dyn CacheStore<Value>>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                store,
                tags: TagIndex::new(),
            }),
            enabled: AtomicBool::new(config.enabled),
            debug: AtomicBool::new(config.debug),
            config,
            stats: StatsCounters::new(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Options carrying the configured default TTL and no tags.
    pub fn default_options(&self) -> CacheOptions {
        CacheOptions::new(self.config.default_ttl)
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Cache state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn lock_sweeper(&self) -> MutexGuard<'_, Option<SweeperHandle>> {
        self.sweeper.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Cache sweeper lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn log_op(&self, op: &'static str, key: &str) {
        if self.is_debug() {
            tracing::debug!(op, key = %key, "Cache operation");
        }
    }

    // ------------------------------------------------------------------
    // Reads and writes
    // ------------------------------------------------------------------

    /// Read a live entry.
    ///
    /// Missing, expired and undecodable entries all read as `None`. Expired
    /// entries are removed on the way out.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }

        let now = Instant::now();
        let found = {
            let mut state = self.lock_state();
            match state.store.get(key).map(|e| e.is_expired_at(now)) {
                None => None,
                Some(true) => {
                    state.remove(key);
                    StatsCounters::record(&self.stats.expirations, 1);
                    self.log_op("expired", key);
                    None
                }
                Some(false) => state.store.get(key).map(|e| e.data.clone()),
            }
        };

        let Some(value) = found else {
            StatsCounters::record(&self.stats.misses, 1);
            self.log_op("miss", key);
            return None;
        };

        match serde_json::from_value(value) {
            Ok(data) => {
                StatsCounters::record(&self.stats.hits, 1);
                self.log_op("hit", key);
                Some(data)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cached payload has unexpected shape");
                StatsCounters::record(&self.stats.misses, 1);
                None
            }
        }
    }

    /// Store `data` under `key`, replacing any previous entry.
    ///
    /// Returns `false` when the cache is disabled or the value cannot be
    /// serialized.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, options: &CacheOptions) -> bool {
        if !self.is_enabled() {
            return false;
        }

        match serde_json::to_value(data) {
            Ok(value) => {
                self.store_value(key, value, options);
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache payload");
                false
            }
        }
    }

    fn store_value(&self, key: &str, value: Value, options: &CacheOptions) {
        let entry = CacheEntry::new(key, value, options);
        let inserted = self.lock_state().insert(entry);

        StatsCounters::record(&self.stats.writes, 1);
        if inserted.evicted {
            StatsCounters::record(&self.stats.evictions, 1);
        }
        self.log_op("set", key);
    }

    /// Remove one entry. Returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.lock_state().remove(key).is_some();
        if removed {
            StatsCounters::record(&self.stats.deletes, 1);
            self.log_op("delete", key);
        }
        removed
    }

    /// Cache-aside read.
    ///
    /// On a hit the fetcher is not called. On a miss the fetcher runs and
    /// its value is stored and returned. Fetcher errors are returned
    /// unchanged and nothing is stored. A value that serializes to `null`
    /// is returned but not stored, so not-found results are re-fetched.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        fetcher: F,
        options: &CacheOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }

        let data = fetcher().await?;

        if self.is_enabled() {
            match serde_json::to_value(&data) {
                Ok(Value::Null) => self.log_op("skip-null", key),
                Ok(value) => self.store_value(key, value, options),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to serialize fetched value");
                }
            }
        }

        Ok(data)
    }

    /// [`get`](Self::get) for each key, in order.
    pub fn get_many<T, K>(&self, keys: &[K]) -> Vec<Option<T>>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
    {
        keys.iter().map(|k| self.get(k.as_ref())).collect()
    }

    /// [`set`](Self::set) for each entry, in order. Returns how many were
    /// stored.
    pub fn set_many<K, T, I>(&self, entries: I) -> usize
    where
        K: AsRef<str>,
        T: Serialize,
        I: IntoIterator<Item = (K, T, CacheOptions)>,
    {
        entries
            .into_iter()
            .filter(|(key, data, options)| self.set(key.as_ref(), data, options))
            .count()
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Remove every key matching a `*` glob. Returns the number removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let re = match compile_pattern(pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Invalid invalidation pattern");
                return 0;
            }
        };

        let removed = {
            let mut state = self.lock_state();
            let matching: Vec<String> = state
                .store
                .keys()
                .into_iter()
                .filter(|k| re.is_match(k))
                .collect();
            matching
                .iter()
                .filter(|k| state.remove(k).is_some())
                .count()
        };

        StatsCounters::record(&self.stats.deletes, removed as u64);
        if removed > 0 {
            tracing::info!(pattern, count = removed, "Invalidated cache entries by pattern");
        }
        removed
    }

    /// Remove every entry carrying `tag`. Returns the number removed.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let removed = {
            let mut state = self.lock_state();
            let keys = state.tags.take(tag);
            keys.iter().filter(|k| state.remove(k).is_some()).count()
        };

        StatsCounters::record(&self.stats.deletes, removed as u64);
        if removed > 0 {
            tracing::info!(tag, count = removed, "Invalidated cache entries by tag");
        }
        removed
    }

    /// Remove every key whose tenant segment is `tenant_id`.
    pub fn invalidate_tenant(&self, tenant_id: &str) -> usize {
        self.invalidate_pattern(&CacheKey::tenant_pattern(tenant_id))
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut state = self.lock_state();
            let expired: Vec<String> = state
                .store
                .keys()
                .into_iter()
                .filter(|k| state.store.get(k).is_some_and(|e| e.is_expired_at(now)))
                .collect();
            expired
                .iter()
                .filter(|k| state.remove(k).is_some())
                .count()
        };

        StatsCounters::record(&self.stats.expirations, removed as u64);
        removed
    }

    /// Drop every entry and tag bucket.
    pub fn clear(&self) {
        self.lock_state().clear();
    }

    // ------------------------------------------------------------------
    // Switches
    // ------------------------------------------------------------------

    /// Disabled: reads miss, writes are dropped, `get_or_set` always fetches.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::info!(enabled, "Cache enabled flag changed");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Stored keys, oldest first. Includes expired entries not yet swept.
    pub fn keys(&self) -> Vec<String> {
        self.lock_state().store.keys()
    }

    /// Stored entry count, including expired entries not yet swept.
    pub fn len(&self) -> usize {
        self.lock_state().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists. Does not count as a read.
    pub fn contains(&self, key: &str) -> bool {
        self.lock_state().live(key, Instant::now()).is_some()
    }

    /// Time left on a live entry.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.lock_state()
            .store
            .get(key)
            .and_then(|e| e.remaining_at(now))
    }

    /// Tags of a live entry.
    pub fn tags_of(&self, key: &str) -> Option<BTreeSet<String>> {
        self.lock_state()
            .live(key, Instant::now())
            .map(|e| e.tags.clone())
    }

    /// Sorted copy of the tag index.
    pub fn tag_buckets(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.lock_state().tags.snapshot()
    }

    /// Tags carried by each stored entry, expired ones included.
    pub fn entry_tags(&self) -> BTreeMap<String, BTreeSet<String>> {
        let state = self.lock_state();
        state
            .store
            .keys()
            .into_iter()
            .filter_map(|k| state.store.get(&k).map(|e| (k, e.tags.clone())))
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock_state();
        self.stats.snapshot(state.store.len(), state.tags.len())
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Spawn the background sweep on the current tokio runtime.
    ///
    /// Returns `true` if a task was spawned, `false` if one is already
    /// running or no runtime is available.
    pub fn start_sweeper(self: &Arc<Self>) -> bool {
        let mut slot = self.lock_sweeper();
        if slot.as_ref().is_some_and(SweeperHandle::is_running) {
            return false;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::warn!(error = %e, "No tokio runtime, cache sweeper not started");
                return false;
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(sweep_task(
            Arc::downgrade(self),
            self.config.sweep_interval,
            shutdown_rx,
        ));
        *slot = Some(SweeperHandle { shutdown_tx, task });
        true
    }

    pub fn is_sweeper_running(&self) -> bool {
        self.lock_sweeper()
            .as_ref()
            .is_some_and(SweeperHandle::is_running)
    }

    /// Stop the sweep and wait for it to finish.
    pub async fn shutdown(&self) {
        let handle = self.lock_sweeper().take();
        if let Some(handle) = handle {
            handle.signal();
            if let Err(e) = handle.task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "Cache sweeper ended abnormally");
                }
            }
        }
    }

    /// Stop the sweep and drop all cached state.
    pub fn destroy(&self) {
        if let Some(handle) = self.lock_sweeper().take() {
            handle.signal();
            handle.task.abort();
        }
        self.clear();
        self.stats.reset();
        tracing::info!("Cache destroyed");
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        let slot = self
            .sweeper
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tagcache_core::TtlClass;

    fn manager() -> CacheManager {
        CacheManager::new(CacheConfig::default()).unwrap()
    }

    fn opts(ttl: TtlClass, tags: &[&str]) -> CacheOptions {
        CacheOptions::new(ttl).with_tags(tags.iter().copied())
    }

    /// Every bucket key must reference a stored entry carrying that tag and
    /// every stored tag must be indexed.
    fn assert_consistent(m: &CacheManager) {
        let buckets = m.tag_buckets();
        let entries = m.entry_tags();
        for (tag, keys) in &buckets {
            assert!(!keys.is_empty(), "empty bucket {tag}");
            for key in keys {
                let tags = entries.get(key).expect("dangling key in tag bucket");
                assert!(tags.contains(tag), "{key} indexed under {tag} without carrying it");
            }
        }
        for (key, tags) in &entries {
            for tag in tags {
                assert!(buckets.get(tag).is_some_and(|b| b.contains(key)), "{key} missing from {tag}");
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Order {
        id: u32,
        total: f64,
    }

    #[test]
    fn test_set_get_roundtrip() {
        let m = manager();
        let order = Order { id: 1, total: 9.5 };
        assert!(m.set("orders:t1:1", &order, &opts(TtlClass::FiveMinutes, &[])));
        assert_eq!(m.get::<Order>("orders:t1:1"), Some(order));
        assert_eq!(m.get::<Order>("orders:t1:2"), None);
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let m = manager();
        m.set("k", "text", &CacheOptions::default());
        assert_eq!(m.get::<Order>("k"), None);
        assert_eq!(m.stats().misses, 1);
        // The entry itself is untouched.
        assert_eq!(m.get::<String>("k").as_deref(), Some("text"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_removes_expired_entry() {
        let m = manager();
        m.set("k", &1, &opts(TtlClass::OneMinute, &["a"]));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(m.get::<i32>("k"), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(m.get::<i32>("k"), None);
        assert!(m.keys().is_empty());
        assert!(m.tag_buckets().is_empty());

        let stats = m.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_keeps_live_entries() {
        let m = manager();
        m.set("short", &1, &opts(TtlClass::OneMinute, &["x"]));
        m.set("long", &2, &opts(TtlClass::OneHour, &["x"]));

        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(m.len(), 2);
        assert_eq!(m.purge_expired(), 1);
        assert_eq!(m.keys(), vec!["long"]);
        assert_consistent(&m);
    }

    #[test]
    fn test_replacing_key_moves_tag_memberships() {
        let m = manager();
        m.set("k", &1, &opts(TtlClass::FiveMinutes, &["a", "b"]));
        m.set("k", &2, &opts(TtlClass::FiveMinutes, &["b", "c"]));

        let buckets = m.tag_buckets();
        assert!(!buckets.contains_key("a"));
        assert!(buckets["b"].contains("k"));
        assert!(buckets["c"].contains("k"));
        assert_consistent(&m);
    }

    #[test]
    fn test_eviction_cleans_tag_index() {
        let m = CacheManager::new(CacheConfig::default().with_max_entries(2)).unwrap();
        m.set("a", &1, &opts(TtlClass::FiveMinutes, &["t"]));
        m.set("b", &2, &opts(TtlClass::FiveMinutes, &["t"]));
        m.set("c", &3, &opts(TtlClass::FiveMinutes, &["t"]));

        assert_eq!(m.keys(), vec!["b", "c"]);
        assert_eq!(
            m.tag_buckets()["t"],
            BTreeSet::from(["b".to_string(), "c".to_string()])
        );
        assert_eq!(m.stats().evictions, 1);
        assert_consistent(&m);
    }

    #[test]
    fn test_delete() {
        let m = manager();
        m.set("k", &1, &opts(TtlClass::FiveMinutes, &["t"]));
        assert!(m.delete("k"));
        assert!(!m.delete("k"));
        assert!(m.tag_buckets().is_empty());
    }

    #[test]
    fn test_invalidate_tag() {
        let m = manager();
        m.set("a", &1, &opts(TtlClass::FiveMinutes, &["orders", "tenant:t1"]));
        m.set("b", &2, &opts(TtlClass::FiveMinutes, &["orders"]));
        m.set("c", &3, &opts(TtlClass::FiveMinutes, &["tenant:t1"]));

        assert_eq!(m.invalidate_tag("orders"), 2);
        assert_eq!(m.keys(), vec!["c"]);
        assert_eq!(m.invalidate_tag("orders"), 0);
        assert_eq!(m.invalidate_tag("never-used"), 0);
        assert_consistent(&m);
    }

    #[test]
    fn test_invalidate_pattern() {
        let m = manager();
        for key in ["crm:customers:t1:1", "crm:customers:list:t1:all", "crm:leads:t1:1"] {
            m.set(key, &json!({"k": key}), &CacheOptions::default());
        }

        assert_eq!(m.invalidate_pattern("crm:customers:*"), 2);
        assert_eq!(m.keys(), vec!["crm:leads:t1:1"]);
        assert_eq!(m.invalidate_pattern("nothing:*"), 0);
    }

    #[test]
    fn test_invalidate_tenant_leaves_other_tenants() {
        let m = manager();
        m.set("crm:customers:t1:1", &1, &CacheOptions::default());
        m.set("crm:customers:list:t1:all", &[1], &CacheOptions::default());
        m.set("crm:customers:t2:1", &2, &CacheOptions::default());
        m.set("crm:customers:t10:1", &3, &CacheOptions::default());

        assert_eq!(m.invalidate_tenant("t1"), 2);
        assert_eq!(m.keys(), vec!["crm:customers:t2:1", "crm:customers:t10:1"]);
    }

    #[tokio::test]
    async fn test_get_or_set_fetches_once() {
        let m = manager();
        let mut calls = 0;

        let first: Result<i32, String> = m
            .get_or_set("k", || { calls += 1; async { Ok(7) } }, &CacheOptions::default())
            .await;
        assert_eq!(first, Ok(7));

        let second: Result<i32, String> = m
            .get_or_set("k", || { calls += 1; async { Ok(99) } }, &CacheOptions::default())
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_get_or_set_propagates_error_without_caching() {
        let m = manager();
        let result: Result<i32, &str> = m
            .get_or_set("k", || async { Err("db down") }, &CacheOptions::default())
            .await;
        assert_eq!(result, Err("db down"));
        assert!(!m.contains("k"));
    }

    #[tokio::test]
    async fn test_get_or_set_does_not_cache_null() {
        let m = manager();
        let result: Result<Option<Order>, ()> = m
            .get_or_set("k", || async { Ok(None) }, &CacheOptions::default())
            .await;
        assert_eq!(result, Ok(None));
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_cache_always_fetches() {
        let m = manager();
        m.set("k", &1, &CacheOptions::default());
        m.set_enabled(false);

        assert_eq!(m.get::<i32>("k"), None);
        assert!(!m.set("other", &2, &CacheOptions::default()));

        let mut calls = 0;
        for _ in 0..2 {
            let v: Result<i32, ()> = m
                .get_or_set("k", || { calls += 1; async { Ok(5) } }, &CacheOptions::default())
                .await;
            assert_eq!(v, Ok(5));
        }
        assert_eq!(calls, 2);

        m.set_enabled(true);
        assert_eq!(m.get::<i32>("k"), Some(1));
        assert!(!m.contains("other"));
    }

    #[test]
    fn test_get_many_and_set_many() {
        let m = manager();
        let stored = m.set_many([
            ("a", 1, CacheOptions::default()),
            ("b", 2, CacheOptions::new(TtlClass::OneHour).with_tag("x")),
        ]);
        assert_eq!(stored, 2);
        assert_eq!(m.get_many::<i32, _>(&["a", "missing", "b"]), vec![Some(1), None, Some(2)]);
        assert_eq!(m.tags_of("b"), Some(BTreeSet::from(["x".to_string()])));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let m = manager();
        m.set("k", &1, &CacheOptions::new(TtlClass::OneMinute));
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(m.ttl_remaining("k"), Some(Duration::from_secs(40)));
        assert_eq!(m.ttl_remaining("missing"), None);
    }

    #[test]
    fn test_stats_and_reset() {
        let m = manager();
        m.set("k", &1, &CacheOptions::default());
        m.get::<i32>("k");
        m.get::<i32>("missing");
        m.delete("k");

        let stats = m.stats();
        assert_eq!((stats.writes, stats.hits, stats.misses, stats.deletes), (1, 1, 1, 1));
        assert_eq!(stats.entry_count, 0);

        m.reset_stats();
        assert_eq!(m.stats(), CacheStats::default());
    }

    #[test]
    fn test_with_store_uses_store_capacity() {
        let m = CacheManager::with_store(CacheConfig::default(), InMemoryStore::new(1)).unwrap();
        m.set("a", &1, &opts(TtlClass::FiveMinutes, &["t"]));
        m.set("b", &2, &opts(TtlClass::FiveMinutes, &["t"]));
        assert_eq!(m.keys(), vec!["b"]);
        assert_consistent(&m);
    }

    #[test]
    fn test_default_options_follow_config() {
        let m = CacheManager::new(CacheConfig::default().with_default_ttl(TtlClass::SixHours)).unwrap();
        assert_eq!(m.default_options().ttl, TtlClass::SixHours);
        assert!(m.default_options().tags.is_empty());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(CacheManager::new(CacheConfig::default().with_max_entries(0)).is_err());
    }

    #[test]
    fn test_start_sweeper_without_runtime() {
        let m = Arc::new(manager());
        assert!(!m.start_sweeper());
        assert!(!m.is_sweeper_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_expired_entries() {
        let config = CacheConfig::default().with_sweep_interval(Duration::from_secs(60));
        let m = Arc::new(CacheManager::new(config).unwrap());
        m.set("k", &1, &opts(TtlClass::OneMinute, &["t"]));

        assert!(m.start_sweeper());
        assert!(!m.start_sweeper());

        // First tick at 60s sees the entry at exactly its TTL; the second
        // at 120s removes it.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(m.keys(), vec!["k"]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(m.keys().is_empty());
        assert!(m.tag_buckets().is_empty());
        assert_eq!(m.stats().expirations, 1);

        m.shutdown().await;
        assert!(!m.is_sweeper_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_when_manager_dropped() {
        let config = CacheConfig::default().with_sweep_interval(Duration::from_secs(1));
        let m = Arc::new(CacheManager::new(config).unwrap());
        m.start_sweeper();
        let handle = m.lock_sweeper().as_ref().map(|h| h.task.abort_handle()).unwrap();

        drop(m);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.is_finished());
    }

    #[tokio::test]
    async fn test_destroy_clears_everything() {
        let m = Arc::new(manager());
        m.set("k", &1, &opts(TtlClass::FiveMinutes, &["t"]));
        m.start_sweeper();

        m.destroy();
        assert!(m.is_empty());
        assert!(m.tag_buckets().is_empty());
        assert!(!m.is_sweeper_running());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use tagcache_core::TtlClass;

    #[derive(Debug, Clone)]
    enum Op {
        Set(u8, Vec<u8>),
        Delete(u8),
        InvalidateTag(u8),
        InvalidatePattern(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0u8..12, proptest::collection::vec(0u8..4, 0..3)).prop_map(|(k, t)| Op::Set(k, t)),
            1 => (0u8..12).prop_map(Op::Delete),
            1 => (0u8..4).prop_map(Op::InvalidateTag),
            1 => (0u8..3).prop_map(Op::InvalidatePattern),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Property: after any op sequence, buckets and entry tags agree.
        #[test]
        fn prop_tag_index_stays_consistent(ops in proptest::collection::vec(op_strategy(), 1..60)) {
            let m = CacheManager::new(CacheConfig::default().with_max_entries(5)).unwrap();
            for op in ops {
                match op {
                    Op::Set(k, tags) => {
                        let options = CacheOptions::new(TtlClass::FiveMinutes)
                            .with_tags(tags.iter().map(|t| format!("tag{t}")));
                        m.set(&format!("g{}:key{k}", k % 3), &k, &options);
                    }
                    Op::Delete(k) => {
                        m.delete(&format!("g{}:key{k}", k % 3));
                    }
                    Op::InvalidateTag(t) => {
                        m.invalidate_tag(&format!("tag{t}"));
                    }
                    Op::InvalidatePattern(g) => {
                        m.invalidate_pattern(&format!("g{g}:*"));
                    }
                }

                let buckets = m.tag_buckets();
                let entries = m.entry_tags();
                prop_assert!(entries.len() <= 5);
                for (tag, keys) in &buckets {
                    prop_assert!(!keys.is_empty());
                    for key in keys {
                        prop_assert!(entries.get(key).is_some_and(|t| t.contains(tag)));
                    }
                }
                for (key, tags) in &entries {
                    for tag in tags {
                        prop_assert!(buckets.get(tag).is_some_and(|b| b.contains(key)));
                    }
                }
            }
        }
    }
}
