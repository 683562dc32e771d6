//! Bounded key→entry store.
//!
//! The store knows nothing about TTLs or tags. It holds at most `capacity`
//! entries and evicts in insertion order (FIFO): writing a new key into a
//! full store removes the earliest-inserted key still present. Overwriting
//! an existing key keeps that key's original position. Reads never affect
//! eviction order, so this is not an LRU.

use std::collections::{BTreeMap, HashMap};

use crate::entry::CacheEntry;

/// Default capacity of the manager's store.
pub const DEFAULT_MAX_ENTRIES: usize = 2000;

/// What a write displaced.
#[derive(Debug)]
pub struct StoreWrite<T> {
    /// Previous entry under the same key.
    pub replaced: Option<CacheEntry<T>>,
    /// Oldest entry pushed out to make room.
    pub evicted: Option<CacheEntry<T>>,
}

/// Pluggable entry container.
///
/// Implementations must report every displaced entry from `set` so the
/// caller can keep secondary indexes consistent.
pub trait CacheStore<T>: Send {
    fn get(&self, key: &str) -> Option<&CacheEntry<T>>;

    fn set(&mut self, entry: CacheEntry<T>) -> StoreWrite<T>;

    /// Remove and return the entry, if present.
    fn delete(&mut self, key: &str) -> Option<CacheEntry<T>>;

    fn clear(&mut self);

    /// Keys in eviction order, oldest first.
    fn keys(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;
}

#[derive(Debug)]
struct Slot<T> {
    seq: u64,
    entry: CacheEntry<T>,
}

/// Hash map store with a sequence-ordered eviction queue.
#[derive(Debug)]
pub struct InMemoryStore<T> {
    entries: HashMap<String, Slot<T>>,
    /// Insertion sequence → key. The first element is the next victim.
    order: BTreeMap<u64, String>,
    next_seq: u64,
    capacity: usize,
}

impl<T> InMemoryStore<T> {
    /// Create a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            capacity: capacity.max(1),
        }
    }

    fn evict_oldest(&mut self) -> Option<CacheEntry<T>> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key).map(|slot| slot.entry)
    }
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl<T: Send> CacheStore<T> for InMemoryStore<T> {
    fn get(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key).map(|slot| &slot.entry)
    }

    fn set(&mut self, entry: CacheEntry<T>) -> StoreWrite<T> {
        if let Some(slot) = self.entries.get_mut(&entry.key) {
            let replaced = std::mem::replace(&mut slot.entry, entry);
            return StoreWrite {
                replaced: Some(replaced),
                evicted: None,
            };
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, entry.key.clone());
        self.entries.insert(entry.key.clone(), Slot { seq, entry });

        StoreWrite {
            replaced: None,
            evicted,
        }
    }

    fn delete(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.seq);
        Some(slot.entry)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn keys(&self) -> Vec<String> {
        self.order.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheOptions;
    use tagcache_core::TtlClass;

    fn entry(key: &str, value: i32) -> CacheEntry<i32> {
        CacheEntry::new(key, value, &CacheOptions::new(TtlClass::FiveMinutes))
    }

    #[test]
    fn test_set_get_delete() {
        let mut store = InMemoryStore::new(4);
        assert!(store.is_empty());

        store.set(entry("a", 1));
        assert_eq!(store.get("a").map(|e| e.data), Some(1));
        assert_eq!(store.len(), 1);

        assert_eq!(store.delete("a").map(|e| e.data), Some(1));
        assert!(store.delete("a").is_none());
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_evicts_earliest_inserted_at_capacity() {
        let mut store = InMemoryStore::new(3);
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            assert!(store.set(entry(key, i as i32)).evicted.is_none());
        }

        let write = store.set(entry("d", 3));
        assert_eq!(write.evicted.map(|e| e.key), Some("a".to_string()));
        assert_eq!(store.len(), 3);
        assert_eq!(store.keys(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_overwrite_keeps_eviction_position() {
        let mut store = InMemoryStore::new(3);
        store.set(entry("a", 1));
        store.set(entry("b", 2));
        store.set(entry("c", 3));

        let write = store.set(entry("a", 10));
        assert_eq!(write.replaced.map(|e| e.data), Some(1));
        assert!(write.evicted.is_none());

        // "a" was inserted first, so it is still the next victim.
        let write = store.set(entry("d", 4));
        assert_eq!(write.evicted.map(|e| e.key), Some("a".to_string()));
    }

    #[test]
    fn test_reads_do_not_affect_eviction_order() {
        let mut store = InMemoryStore::new(2);
        store.set(entry("a", 1));
        store.set(entry("b", 2));
        for _ in 0..5 {
            store.get("a");
        }

        let write = store.set(entry("c", 3));
        assert_eq!(write.evicted.map(|e| e.key), Some("a".to_string()));
    }

    #[test]
    fn test_delete_frees_a_slot_without_eviction() {
        let mut store = InMemoryStore::new(2);
        store.set(entry("a", 1));
        store.set(entry("b", 2));
        store.delete("a");

        assert!(store.set(entry("c", 3)).evicted.is_none());
        assert_eq!(store.keys(), vec!["b", "c"]);
    }

    #[test]
    fn test_clear() {
        let mut store = InMemoryStore::new(2);
        store.set(entry("a", 1));
        store.clear();
        assert!(store.is_empty());
        assert!(store.keys().is_empty());
        assert_eq!(store.capacity(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut store = InMemoryStore::new(0);
        store.set(entry("a", 1));
        assert_eq!(store.capacity(), 1);
        assert_eq!(store.len(), 1);
    }
}
