//! tagcache Test Utilities
//!
//! Shared test infrastructure for the tagcache workspace:
//! - Proptest generators for keys, filters and TTL classes
//! - Fixtures for managers, tenants and sample payloads
//! - Counting loaders to observe cache-aside behaviour
//! - Assertions for the tag index invariant

pub use tagcache_core::{CacheKey, DataShape, Filters, TagCacheError, TagCacheResult, TtlClass};
pub use tagcache_storage::{CacheConfig, CacheManager, CacheOptions};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// TRACING
// ============================================================================

/// Route `tracing` output through the test harness.
///
/// Honors `RUST_LOG`, defaulting to `warn`. Safe to call from every test.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// A key segment that is valid everywhere, including the tenant slot.
    pub fn arb_segment() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}".prop_filter("reserved word", |s| s != "list" && s != "count")
    }

    /// A tenant id shaped like the ones services pass in.
    pub fn arb_tenant_id() -> impl Strategy<Value = String> {
        prop_oneof![
            arb_segment(),
            any::<u128>().prop_map(|n| uuid::Uuid::from_u128(n).to_string()),
        ]
    }

    pub fn arb_ttl_class() -> impl Strategy<Value = TtlClass> {
        proptest::sample::select(TtlClass::ALL.to_vec())
    }

    pub fn arb_data_shape() -> impl Strategy<Value = DataShape> {
        prop_oneof![
            Just(DataShape::List),
            Just(DataShape::Detail),
            Just(DataShape::Count),
            Just(DataShape::Static),
            Just(DataShape::Report),
            Just(DataShape::Dashboard),
            Just(DataShape::Search),
            Just(DataShape::Lookup),
        ]
    }

    /// A scalar, array or null filter value.
    pub fn arb_filter_value() -> impl Strategy<Value = Value> {
        let scalar = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9_ -]{0,10}".prop_map(Value::String),
        ];
        prop_oneof![
            4 => scalar,
            1 => proptest::collection::vec(any::<u16>().prop_map(Value::from), 0..4)
                .prop_map(Value::Array),
        ]
    }

    /// Filter pairs in an arbitrary order, with unique keys.
    pub fn arb_filter_pairs() -> impl Strategy<Value = Vec<(String, Value)>> {
        proptest::collection::btree_map("[a-z_]{1,8}", arb_filter_value(), 0..6)
            .prop_map(|m| m.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    /// A fresh tenant id, unique per call.
    pub fn tenant_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }

    /// A manager with the default configuration.
    pub fn manager() -> Arc<CacheManager> {
        Arc::new(CacheManager::default())
    }

    /// A manager whose store holds at most `max_entries`.
    pub fn manager_with_capacity(max_entries: usize) -> Arc<CacheManager> {
        let config = CacheConfig::default().with_max_entries(max_entries);
        Arc::new(CacheManager::new(config).expect("valid test config"))
    }

    /// Build a filter map from pairs.
    pub fn filters<I, K>(pairs: I) -> Filters
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
    }

    /// Loader error used by façade tests.
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum LoadError {
        #[error("Backend unavailable: {0}")]
        Backend(String),

        #[error(transparent)]
        Cache(#[from] TagCacheError),
    }

    /// Sample payload used across query tests.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Customer {
        pub id: String,
        pub name: String,
        pub status: String,
    }

    impl Customer {
        pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                name: name.into(),
                status: "active".to_string(),
            }
        }
    }

    /// `n` customers with ids `c1..=cn`.
    pub fn customers(n: usize) -> Vec<Customer> {
        (1..=n)
            .map(|i| Customer::new(format!("c{i}"), format!("Customer {i}")))
            .collect()
    }
}

// ============================================================================
// LOADERS
// ============================================================================

/// Fetcher factory that counts how often its fetchers run.
#[derive(Debug, Clone, Default)]
pub struct CountingLoader {
    calls: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fetchers run so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A fetcher that succeeds with `value`.
    pub fn returning<T, E>(&self, value: T) -> impl FnOnce() -> std::future::Ready<Result<T, E>> {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value))
        }
    }

    /// A fetcher that fails with `error`.
    pub fn failing<T, E>(&self, error: E) -> impl FnOnce() -> std::future::Ready<Result<T, E>> {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(error))
        }
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache-specific invariants.

    use super::*;

    /// Assert the tag index and the stored entries agree in both directions
    /// and that no bucket is empty.
    pub fn assert_tag_index_consistent(manager: &CacheManager) {
        let buckets = manager.tag_buckets();
        let entries = manager.entry_tags();

        for (tag, keys) in &buckets {
            assert!(!keys.is_empty(), "Tag bucket {tag} is empty");
            for key in keys {
                let tags = entries
                    .get(key)
                    .unwrap_or_else(|| panic!("Tag {tag} references missing key {key}"));
                assert!(tags.contains(tag), "Key {key} indexed under {tag} but does not carry it");
            }
        }

        for (key, tags) in &entries {
            for tag in tags {
                assert!(
                    buckets.get(tag).is_some_and(|b| b.contains(key)),
                    "Key {key} carries {tag} but is not indexed under it"
                );
            }
        }
    }

    /// Assert no stored key has `tenant_id` as its tenant segment.
    pub fn assert_no_keys_for_tenant(manager: &CacheManager, tenant_id: &str) {
        let needle = format!(":{tenant_id}:");
        let leaked: Vec<String> = manager
            .keys()
            .into_iter()
            .filter(|k| k.contains(&needle))
            .collect();
        assert!(leaked.is_empty(), "Keys left for tenant {tenant_id}: {leaked:?}");
    }
}
