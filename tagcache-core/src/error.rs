//! Error types for tagcache configuration and key construction.
//!
//! Cache-internal conditions (miss, expiry, eviction) are never errors.
//! Everything in here indicates a programming or deployment mistake and is
//! meant to fail fast at the call site.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown TTL class: {label} (expected one of 1m, 5m, 15m, 30m, 1h, 6h, 12h, 24h)")]
    UnknownTtlClass { label: String },
}

/// Cache key construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Key segment {segment} must not be empty")]
    EmptySegment { segment: &'static str },

    #[error("Key segment {segment} contains reserved character {ch:?}: {value}")]
    ReservedCharacter {
        segment: &'static str,
        value: String,
        ch: char,
    },

    #[error("Key segment {segment} uses reserved word {value}")]
    ReservedSegment {
        segment: &'static str,
        value: String,
    },
}

/// Master error type for tagcache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TagCacheError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// Result type alias for tagcache operations that can fail fast.
pub type TagCacheResult<T> = Result<T, TagCacheError>;
