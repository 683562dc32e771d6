//! Service-facing query cache.
//!
//! One [`QueryCache`] per (tenant, company, module, entity). Reads go
//! through the tenant façade with per-shape default TTLs; mutations are
//! followed by [`QueryCache::invalidate`], either explicitly or through
//! [`QueryCache::wrap_mutation`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tagcache_core::{
    count_tag, list_tag, validate_segment, DataShape, Filters, TagCacheError, TagCacheResult,
    TtlClass,
};
use tagcache_storage::{CacheManager, CacheOptions};

use crate::mutation::{NoId, WrappedMutation};
use crate::tenant::TenantCache;

/// Filter key carrying the page number inside a paginated list key.
pub const PAGE_FILTER: &str = "_page";

/// Filter key carrying the page size inside a paginated list key.
pub const PAGE_SIZE_FILTER: &str = "_pageSize";

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Per-call cache policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Overrides the shape's default TTL.
    pub ttl: Option<TtlClass>,
    /// Extra tags on top of the standard scope tags.
    pub tags: Vec<String>,
    /// Call the fetcher directly; nothing is read or written.
    pub skip_cache: bool,
}

impl QueryOptions {
    pub fn with_ttl(mut self, ttl: TtlClass) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }
}

/// Requested page. Missing or zero values fall back to the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    pub fn page(&self) -> u64 {
        self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size.filter(|s| *s > 0).unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus navigation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> PaginatedResult<T> {
    pub fn new(data: Vec<T>, total: u64, page: u64, page_size: u64) -> Self {
        let total_pages = total.div_ceil(page_size.max(1));
        Self {
            data,
            total,
            page,
            page_size,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryCache {
    tenant: TenantCache,
    company_id: Option<String>,
    entity: String,
}

impl QueryCache {
    pub fn new(
        manager: Arc<CacheManager>,
        tenant_id: impl Into<String>,
        entity: impl Into<String>,
    ) -> TagCacheResult<Self> {
        let entity = entity.into();
        validate_segment("entity", &entity)?;
        Ok(Self {
            tenant: TenantCache::new(manager, tenant_id)?,
            company_id: None,
            entity,
        })
    }

    pub fn with_module(mut self, module: impl Into<String>) -> TagCacheResult<Self> {
        self.tenant = self.tenant.with_module(module)?;
        Ok(self)
    }

    /// Record `company_id` on every entry written by this cache.
    pub fn with_company(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn company_id(&self) -> Option<&str> {
        self.company_id.as_deref()
    }

    pub fn tenant(&self) -> &TenantCache {
        &self.tenant
    }

    fn cache_options(&self, shape: DataShape, options: &QueryOptions) -> CacheOptions {
        let mut cache_options = CacheOptions::new(options.ttl.unwrap_or(shape.default_ttl()))
            .with_tags(options.tags.iter().cloned())
            .with_tenant(self.tenant.tenant_id());
        cache_options.company_id = self.company_id.clone();
        cache_options
    }

    /// Cached filtered list.
    pub async fn find_many<T, E, F, Fut>(
        &self,
        filters: &Filters,
        fetcher: F,
        options: &QueryOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if options.skip_cache {
            return fetcher().await;
        }
        let cache_options = self.cache_options(DataShape::List, options);
        self.tenant
            .cache_list(&self.entity, filters, fetcher, &cache_options)
            .await
    }

    /// Cached filtered count.
    pub async fn count<E, F, Fut>(
        &self,
        filters: &Filters,
        fetcher: F,
        options: &QueryOptions,
    ) -> Result<u64, E>
    where
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, E>>,
    {
        if options.skip_cache {
            return fetcher().await;
        }
        let cache_options = self.cache_options(DataShape::Count, options);
        self.tenant
            .cache_count(&self.entity, filters, fetcher, &cache_options)
            .await
    }

    /// Cached single record. A fetcher returning `None` is not cached.
    pub async fn find_one<T, E, F, Fut>(
        &self,
        id: &str,
        fetcher: F,
        options: &QueryOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if options.skip_cache {
            return fetcher().await;
        }
        let cache_options = self.cache_options(DataShape::Detail, options);
        self.tenant
            .cache_detail(&self.entity, id, fetcher, &cache_options)
            .await
    }

    /// Cached page plus cached total, fetched concurrently.
    ///
    /// The page is cached under the filters extended with `_page` and
    /// `_pageSize`; the total is cached under the bare filters and so is
    /// shared by every page.
    pub async fn find_paginated<T, E, F, Fut, C, CFut>(
        &self,
        filters: &Filters,
        pagination: Pagination,
        fetcher: F,
        count_fetcher: C,
        options: &QueryOptions,
    ) -> Result<PaginatedResult<T>, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        C: FnOnce() -> CFut,
        CFut: Future<Output = Result<u64, E>>,
    {
        let page = pagination.page();
        let page_size = pagination.page_size();

        let mut paged = filters.clone();
        paged.insert(PAGE_FILTER.to_string(), Value::from(page));
        paged.insert(PAGE_SIZE_FILTER.to_string(), Value::from(page_size));

        let (data, total) = tokio::try_join!(
            self.find_many(&paged, fetcher, options),
            self.count(filters, count_fetcher, options),
        )?;

        Ok(PaginatedResult::new(data, total, page, page_size))
    }

    /// Drop cached state after a mutation.
    ///
    /// Deletes the detail entry for `id` when given, then every list and
    /// count of this entity. List and count tags are not tenant-scoped, so
    /// other tenants' lists of the same entity are dropped too.
    pub fn invalidate(&self, id: Option<&str>) -> TagCacheResult<usize> {
        let manager = self.tenant.manager();
        let mut removed: usize = 0;

        if let Some(id) = id {
            if self.tenant.delete(&self.entity, &[id])? {
                removed += 1;
            }
        }
        removed += manager.invalidate_tag(&list_tag(&self.entity));
        removed += manager.invalidate_tag(&count_tag(&self.entity));

        tracing::debug!(
            tenant_id = %self.tenant.tenant_id(),
            entity = %self.entity,
            id,
            count = removed,
            "Invalidated query cache"
        );
        Ok(removed)
    }

    /// Drop every cached entry of this entity for this tenant.
    pub fn invalidate_all(&self) -> TagCacheResult<usize> {
        self.tenant.invalidate_entity(&self.entity)
    }

    /// Wrap a mutation so a successful call invalidates this entity.
    ///
    /// Without [`WrappedMutation::with_id`] only lists and counts are
    /// dropped.
    pub fn wrap_mutation<M>(&self, mutation: M) -> WrappedMutation<'_, M, NoId> {
        WrappedMutation::new(self, mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tagcache_test_utils::fixtures::{self, Customer, LoadError};
    use tagcache_test_utils::CountingLoader;

    fn query(manager: &Arc<CacheManager>, tenant: &str) -> QueryCache {
        QueryCache::new(Arc::clone(manager), tenant, "customers")
            .and_then(|q| q.with_module("crm"))
            .unwrap()
            .with_company("acme")
    }

    #[test]
    fn test_pagination_defaults() {
        let p = Pagination::default();
        assert_eq!((p.page(), p.page_size()), (1, 20));
        let zero = Pagination::new(0, 0);
        assert_eq!((zero.page(), zero.page_size()), (1, 20));
    }

    #[test]
    fn test_paginated_result_math() {
        let r = PaginatedResult::new(vec![(); 10], 25, 2, 10);
        assert_eq!(r.total_pages, 3);
        assert!(r.has_next);
        assert!(r.has_prev);

        let last = PaginatedResult::<()>::new(vec![], 25, 3, 10);
        assert!(!last.has_next);

        let empty = PaginatedResult::<()>::new(vec![], 0, 1, 20);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }

    #[test]
    fn test_paginated_result_serializes_camel_case() {
        let r = PaginatedResult::new(vec![1], 1, 1, 20);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["pageSize"], json!(20));
        assert_eq!(v["totalPages"], json!(1));
        assert_eq!(v["hasNext"], json!(false));
    }

    #[test]
    fn test_new_rejects_bad_entity() {
        assert!(QueryCache::new(fixtures::manager(), "t1", "cust:omers").is_err());
    }

    #[tokio::test]
    async fn test_find_many_caches_with_list_ttl_and_metadata() {
        let m = fixtures::manager();
        let q = query(&m, "t1");
        let loader = CountingLoader::new();
        let f = fixtures::filters([("status", json!("active"))]);

        for _ in 0..2 {
            let rows: Result<Vec<Customer>, LoadError> = q
                .find_many(&f, loader.returning(fixtures::customers(3)), &QueryOptions::default())
                .await;
            assert_eq!(rows.unwrap().len(), 3);
        }
        assert_eq!(loader.calls(), 1);

        let key = "crm:customers:list:t1:status:active";
        assert!(m.ttl_remaining(key).unwrap() <= TtlClass::FiveMinutes.duration());
        assert!(m.ttl_remaining(key).unwrap() > TtlClass::OneMinute.duration());
    }

    #[tokio::test]
    async fn test_skip_cache_bypasses_store() {
        let m = fixtures::manager();
        let q = query(&m, "t1");
        let loader = CountingLoader::new();
        let opts = QueryOptions::default().skip_cache();

        for _ in 0..2 {
            let n: Result<u64, LoadError> = q.count(&Filters::new(), loader.returning(4), &opts).await;
            assert_eq!(n, Ok(4));
        }
        assert_eq!(loader.calls(), 2);
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn test_find_one_does_not_cache_missing_record() {
        let m = fixtures::manager();
        let q = query(&m, "t1");
        let loader = CountingLoader::new();

        for _ in 0..2 {
            let row: Result<Option<Customer>, LoadError> = q
                .find_one("c404", loader.returning(None), &QueryOptions::default())
                .await;
            assert_eq!(row, Ok(None));
        }
        assert_eq!(loader.calls(), 2);

        let row: Result<Option<Customer>, LoadError> = q
            .find_one("c1", loader.returning(Some(Customer::new("c1", "Ada"))), &QueryOptions::default())
            .await;
        assert!(row.unwrap().is_some());
        assert!(m.contains("crm:customers:t1:c1"));
    }

    #[tokio::test]
    async fn test_find_paginated_keys_and_metadata() {
        let m = fixtures::manager();
        let q = query(&m, "t1");
        let f = fixtures::filters([("status", json!("active"))]);

        let page: Result<PaginatedResult<Customer>, LoadError> = q
            .find_paginated(
                &f,
                Pagination::new(2, 10),
                || async { Ok(fixtures::customers(10)) },
                || async { Ok(25) },
                &QueryOptions::default(),
            )
            .await;
        let page = page.unwrap();
        assert_eq!((page.page, page.page_size, page.total, page.total_pages), (2, 10, 25, 3));
        assert!(page.has_next && page.has_prev);

        assert!(m.contains("crm:customers:list:t1:_page:2|_pageSize:10|status:active"));
        assert!(m.contains("crm:customers:count:t1:status:active"));
    }

    #[tokio::test]
    async fn test_find_paginated_propagates_count_failure() {
        let m = fixtures::manager();
        let q = query(&m, "t1");

        let page: Result<PaginatedResult<Customer>, LoadError> = q
            .find_paginated(
                &Filters::new(),
                Pagination::default(),
                || async { Ok(vec![]) },
                || async { Err(LoadError::Backend("count timed out".into())) },
                &QueryOptions::default(),
            )
            .await;
        assert_eq!(page, Err(LoadError::Backend("count timed out".into())));
        assert!(!m.contains("crm:customers:count:t1:all"));
    }

    #[tokio::test]
    async fn test_invalidate_drops_detail_lists_and_counts() {
        let m = fixtures::manager();
        let q = query(&m, "t1");
        let opts = QueryOptions::default();

        let _: Result<Vec<u8>, LoadError> = q.find_many(&Filters::new(), || async { Ok(vec![1]) }, &opts).await;
        let _: Result<u64, LoadError> = q.count(&Filters::new(), || async { Ok(1) }, &opts).await;
        let _: Result<u8, LoadError> = q.find_one("c1", || async { Ok(1) }, &opts).await;
        let _: Result<u8, LoadError> = q.find_one("c2", || async { Ok(2) }, &opts).await;

        assert_eq!(q.invalidate(Some("c1")).unwrap(), 3);
        assert_eq!(m.keys(), vec!["crm:customers:t1:c2"]);

        assert_eq!(q.invalidate(None).unwrap(), 0);
        assert_eq!(q.invalidate_all().unwrap(), 1);
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn test_company_recorded_as_metadata_only() {
        let m = fixtures::manager();
        let q = query(&m, "t1");
        let _: Result<u8, LoadError> = q.find_one("c1", || async { Ok(1) }, &QueryOptions::default()).await;
        assert_eq!(m.keys(), vec!["crm:customers:t1:c1"]);
        assert_eq!(q.company_id(), Some("acme"));
    }
}
