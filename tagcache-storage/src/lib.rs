//! tagcache Storage - Cache Engine
//!
//! The in-process cache engine: a bounded insertion-order store, the tag
//! index kept consistent with it, and the [`CacheManager`] that combines
//! both with TTL expiry, pattern/tag/tenant invalidation, cache-aside reads
//! and a background expiry sweep.

pub mod config;
pub mod entry;
pub mod manager;
pub mod pattern;
pub mod stats;
pub mod store;
mod sweeper;
pub mod tag_index;

pub use config::{CacheConfig, DEFAULT_SWEEP_INTERVAL_SECS};
pub use entry::{CacheEntry, CacheOptions};
pub use manager::CacheManager;
pub use pattern::compile_pattern;
pub use stats::{CacheStats, StatsCounters};
pub use store::{CacheStore, InMemoryStore, StoreWrite, DEFAULT_MAX_ENTRIES};
pub use tag_index::TagIndex;
