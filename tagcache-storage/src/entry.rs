//! Cache entries and per-write options.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;
use tagcache_core::{DataShape, TtlClass};
use tokio::time::Instant;

/// Per-write policy.
///
/// `tenant_id` and `company_id` are carried as metadata on the entry; the
/// manager never derives keys from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOptions {
    pub ttl: TtlClass,
    pub tags: Vec<String>,
    pub tenant_id: Option<String>,
    pub company_id: Option<String>,
}

impl CacheOptions {
    pub fn new(ttl: TtlClass) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    /// Options using the default TTL for a data shape.
    pub fn for_shape(shape: DataShape) -> Self {
        Self::new(shape.default_ttl())
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_company(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }
}

/// One cached value.
///
/// An entry is live while `now - created_at <= ttl`. Reads never extend
/// the lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: String,
    pub data: T,
    /// Monotonic creation time, used for expiry.
    pub created_at: Instant,
    /// Wall-clock creation time, for diagnostics only.
    pub cached_at: DateTime<Utc>,
    pub ttl: Duration,
    pub tags: BTreeSet<String>,
    pub tenant_id: Option<String>,
    pub company_id: Option<String>,
}

impl<T> CacheEntry<T> {
    /// Create an entry stamped with the current time.
    pub fn new(key: impl Into<String>, data: T, options: &CacheOptions) -> Self {
        Self {
            key: key.into(),
            data,
            created_at: Instant::now(),
            cached_at: Utc::now(),
            ttl: options.ttl.duration(),
            tags: options.tags.iter().cloned().collect(),
            tenant_id: options.tenant_id.clone(),
            company_id: options.company_id.clone(),
        }
    }

    /// Lifetime in milliseconds.
    pub fn ttl_millis(&self) -> u128 {
        self.ttl.as_millis()
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Time left before expiry, `None` once expired.
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.ttl
            .checked_sub(now.saturating_duration_since(self.created_at))
    }
}
