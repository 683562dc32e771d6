//! Cache manager configuration.

use std::time::Duration;
use tagcache_core::{ConfigError, TagCacheError, TagCacheResult, TtlClass};

use crate::store::DEFAULT_MAX_ENTRIES;

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Configuration for a [`CacheManager`](crate::CacheManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Store capacity (default: 2000)
    pub max_entries: usize,

    /// How often the background sweep removes expired entries
    /// (default: 5 minutes)
    pub sweep_interval: Duration,

    /// Whether reads and writes reach the store (default: true)
    pub enabled: bool,

    /// Emit per-operation debug events (default: false)
    pub debug: bool,

    /// TTL used by callers that do not pick one (default: 5m)
    pub default_ttl: TtlClass,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            enabled: true,
            debug: false,
            default_ttl: TtlClass::default(),
        }
    }
}

impl CacheConfig {
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_default_ttl(mut self, ttl: TtlClass) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Reject values the manager cannot run with.
    pub fn validate(&self) -> TagCacheResult<()> {
        if self.max_entries == 0 {
            return Err(TagCacheError::Config(ConfigError::InvalidValue {
                field: "max_entries".to_string(),
                value: self.max_entries.to_string(),
                reason: "max_entries must be greater than 0".to_string(),
            }));
        }

        if self.sweep_interval.is_zero() {
            return Err(TagCacheError::Config(ConfigError::InvalidValue {
                field: "sweep_interval".to_string(),
                value: format!("{:?}", self.sweep_interval),
                reason: "sweep_interval must be positive".to_string(),
            }));
        }

        Ok(())
    }

    /// Create CacheConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TAGCACHE_ENABLED`: Whether the cache is active (default: true)
    /// - `TAGCACHE_DEBUG`: Per-operation debug events (default: false)
    /// - `TAGCACHE_MAX_ENTRIES`: Store capacity (default: 2000)
    /// - `TAGCACHE_SWEEP_INTERVAL_SECS`: Sweep interval (default: 300)
    /// - `TAGCACHE_DEFAULT_TTL`: TTL class label such as `15m` (default: 5m)
    ///
    /// Values that fail to parse fall back to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let enabled = lookup("TAGCACHE_ENABLED")
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(defaults.enabled);

        let debug = lookup("TAGCACHE_DEBUG")
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(defaults.debug);

        let max_entries = lookup("TAGCACHE_MAX_ENTRIES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_entries);

        let sweep_interval = Duration::from_secs(
            lookup("TAGCACHE_SWEEP_INTERVAL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        );

        let default_ttl = lookup("TAGCACHE_DEFAULT_TTL")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.default_ttl);

        Self {
            max_entries,
            sweep_interval,
            enabled,
            debug,
            default_ttl,
        }
    }
}
