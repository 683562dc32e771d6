//! Tag → keys index.
//!
//! Invariant maintained together with the store: a key is in a tag's bucket
//! iff the stored entry for that key carries the tag. Buckets never stay
//! empty.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::entry::CacheEntry;

#[derive(Debug, Default)]
pub struct TagIndex {
    buckets: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tag: &str, key: &str) {
        self.buckets
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
    }

    /// Remove `key` from `tag`'s bucket, dropping the bucket once empty.
    pub fn remove(&mut self, tag: &str, key: &str) {
        if let Some(bucket) = self.buckets.get_mut(tag) {
            bucket.remove(key);
            if bucket.is_empty() {
                self.buckets.remove(tag);
            }
        }
    }

    /// Detach and return a whole bucket.
    pub fn take(&mut self, tag: &str) -> HashSet<String> {
        self.buckets.remove(tag).unwrap_or_default()
    }

    pub fn keys_for(&self, tag: &str) -> Option<&HashSet<String>> {
        self.buckets.get(tag)
    }

    pub fn index_entry<T>(&mut self, entry: &CacheEntry<T>) {
        for tag in &entry.tags {
            self.add(tag, &entry.key);
        }
    }

    pub fn unindex_entry<T>(&mut self, entry: &CacheEntry<T>) {
        for tag in &entry.tags {
            self.remove(tag, &entry.key);
        }
    }

    /// Sorted copy of every bucket.
    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.buckets
            .iter()
            .map(|(tag, keys)| (tag.clone(), keys.iter().cloned().collect()))
            .collect()
    }

    /// Number of non-empty buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }
}
