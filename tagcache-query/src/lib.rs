//! tagcache Query - Cache Façades
//!
//! Stateless façades over a shared [`CacheManager`](tagcache_storage::CacheManager):
//!
//! - [`TenantCache`] namespaces keys by module, entity and tenant and tags
//!   every write for bulk invalidation.
//! - [`QueryCache`] serves one entity for one tenant: list, count, detail
//!   and paginated reads, plus invalidation after mutations.

pub mod mutation;
pub mod query;
pub mod tenant;

pub use mutation::{MutationId, NoId, WrappedMutation};
pub use query::{
    PaginatedResult, Pagination, QueryCache, QueryOptions, DEFAULT_PAGE, DEFAULT_PAGE_SIZE,
    PAGE_FILTER, PAGE_SIZE_FILTER,
};
pub use tenant::TenantCache;
