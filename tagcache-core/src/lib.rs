//! tagcache Core - Cache Policy Types
//!
//! Pure data and policy with no runtime state: TTL classes, per-shape
//! defaults, tag naming and taxonomy, typed tenant-scoped keys, and the
//! error taxonomy shared by the other crates.

pub mod error;
pub mod key;
pub mod tags;
pub mod ttl;

pub use error::{ConfigError, KeyError, TagCacheError, TagCacheResult};
pub use key::{
    create_key, filter_digest, validate_segment, validate_tenant_id, CacheKey, Filters, KeyKind,
    ALL_SUFFIX, SEPARATOR,
};
pub use tags::{
    count_tag, list_tag, module_tag, module_tags, owning_module, tenant_tag, TAXONOMY,
};
pub use ttl::{DataShape, TtlClass};
