//! Tenant-scoped cache façade.
//!
//! A [`TenantCache`] namespaces every key under one tenant (and optionally
//! one module) and attaches the standard tags to every write:
//!
//! - `tenant:{tenant_id}`
//! - the bare entity name
//! - `module:{module}` when a module is configured
//! - `{entity}:list` / `{entity}:count` on list and count entries
//!
//! Methods that run a fetcher return the fetcher's error type `E`, which
//! must absorb [`TagCacheError`] for malformed entity names.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tagcache_core::{
    count_tag, create_key, filter_digest, list_tag, module_tag, tenant_tag, validate_segment,
    validate_tenant_id, CacheKey, Filters, TagCacheError, TagCacheResult,
};
use tagcache_core::tags::MODULE_TAG_PREFIX;
use tagcache_storage::{CacheManager, CacheOptions};

#[derive(Debug, Clone)]
pub struct TenantCache {
    manager: Arc<CacheManager>,
    tenant_id: String,
    module: Option<String>,
}

impl TenantCache {
    pub fn new(manager: Arc<CacheManager>, tenant_id: impl Into<String>) -> TagCacheResult<Self> {
        let tenant_id = tenant_id.into();
        validate_tenant_id(&tenant_id)?;
        Ok(Self {
            manager,
            tenant_id,
            module: None,
        })
    }

    /// Prefix every key with `module` and tag writes with `module:{module}`.
    pub fn with_module(mut self, module: impl Into<String>) -> TagCacheResult<Self> {
        let module = module.into();
        if module.is_empty() {
            self.module = None;
        } else {
            validate_segment("module", &module)?;
            self.module = Some(module);
        }
        Ok(self)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    // ------------------------------------------------------------------
    // Keys and tags
    // ------------------------------------------------------------------

    /// `{module}:{entity}:{tenant}:{id1}:{id2}...`, empty identifiers
    /// skipped. With no identifiers the suffix is `all`.
    pub fn create_key(&self, entity: &str, identifiers: &[&str]) -> TagCacheResult<CacheKey> {
        Ok(CacheKey::detail(
            self.module(),
            entity,
            &self.tenant_id,
            &create_key(identifiers),
        )?)
    }

    fn list_key(&self, entity: &str, filters: &Filters) -> TagCacheResult<CacheKey> {
        Ok(CacheKey::list(
            self.module(),
            entity,
            &self.tenant_id,
            &filter_digest(filters),
        )?)
    }

    fn count_key(&self, entity: &str, filters: &Filters) -> TagCacheResult<CacheKey> {
        Ok(CacheKey::count(
            self.module(),
            entity,
            &self.tenant_id,
            &filter_digest(filters),
        )?)
    }

    /// Standard tags for a write of `entity`.
    pub fn scope_tags(&self, entity: &str) -> Vec<String> {
        let mut tags = vec![tenant_tag(&self.tenant_id), entity.to_string()];
        if let Some(module) = &self.module {
            tags.push(module_tag(module));
        }
        tags
    }

    fn scoped_options(&self, entity: &str, options: &CacheOptions, extra: Option<String>) -> CacheOptions {
        let mut scoped = options.clone().with_tags(self.scope_tags(entity));
        scoped.tags.extend(extra);
        if scoped.tenant_id.is_none() {
            scoped.tenant_id = Some(self.tenant_id.clone());
        }
        scoped
    }

    // ------------------------------------------------------------------
    // Pass-throughs
    // ------------------------------------------------------------------

    pub fn get<T: DeserializeOwned>(
        &self,
        entity: &str,
        identifiers: &[&str],
    ) -> TagCacheResult<Option<T>> {
        let key = self.create_key(entity, identifiers)?;
        Ok(self.manager.get(&key.to_string()))
    }

    pub fn set<T: Serialize + ?Sized>(
        &self,
        entity: &str,
        identifiers: &[&str],
        data: &T,
        options: &CacheOptions,
    ) -> TagCacheResult<bool> {
        let key = self.create_key(entity, identifiers)?;
        let options = self.scoped_options(entity, options, None);
        Ok(self.manager.set(&key.to_string(), data, &options))
    }

    pub fn delete(&self, entity: &str, identifiers: &[&str]) -> TagCacheResult<bool> {
        let key = self.create_key(entity, identifiers)?;
        Ok(self.manager.delete(&key.to_string()))
    }

    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        entity: &str,
        identifiers: &[&str],
        fetcher: F,
        options: &CacheOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.create_key(entity, identifiers)?;
        let options = self.scoped_options(entity, options, None);
        self.manager
            .get_or_set(&key.to_string(), fetcher, &options)
            .await
    }

    // ------------------------------------------------------------------
    // Shape helpers
    // ------------------------------------------------------------------

    /// Cache a filtered list under its filter digest.
    pub async fn cache_list<T, E, F, Fut>(
        &self,
        entity: &str,
        filters: &Filters,
        fetcher: F,
        options: &CacheOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.list_key(entity, filters)?;
        let options = self.scoped_options(entity, options, Some(list_tag(entity)));
        self.manager
            .get_or_set(&key.to_string(), fetcher, &options)
            .await
    }

    /// Cache a filtered count under its filter digest.
    pub async fn cache_count<E, F, Fut>(
        &self,
        entity: &str,
        filters: &Filters,
        fetcher: F,
        options: &CacheOptions,
    ) -> Result<u64, E>
    where
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, E>>,
    {
        let key = self.count_key(entity, filters)?;
        let options = self.scoped_options(entity, options, Some(count_tag(entity)));
        self.manager
            .get_or_set(&key.to_string(), fetcher, &options)
            .await
    }

    /// Cache a single record by id.
    pub async fn cache_detail<T, E, F, Fut>(
        &self,
        entity: &str,
        id: &str,
        fetcher: F,
        options: &CacheOptions,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<TagCacheError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_set(entity, &[id], fetcher, options).await
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    /// Drop every detail, list and count entry of `entity` for this tenant.
    pub fn invalidate_entity(&self, entity: &str) -> TagCacheResult<usize> {
        validate_segment("entity", entity)?;
        let removed: usize = CacheKey::entity_patterns(self.module(), entity, &self.tenant_id)
            .iter()
            .map(|pattern| self.manager.invalidate_pattern(pattern))
            .sum();
        tracing::debug!(
            tenant_id = %self.tenant_id,
            entity,
            count = removed,
            "Invalidated tenant entity"
        );
        Ok(removed)
    }

    /// Drop every entry of this tenant, across all modules.
    pub fn invalidate_all(&self) -> usize {
        self.manager.invalidate_tenant(&self.tenant_id)
    }

    /// Parsed keys this façade's scope has stored, oldest first.
    ///
    /// Entries are selected by their scope tags rather than by key shape: a
    /// moduled key such as `crm:customers:t1:1` also parses as a
    /// module-less key of entity `crm`.
    pub fn cached_keys(&self) -> Vec<CacheKey> {
        let tenant = tenant_tag(&self.tenant_id);
        let module = self.module.as_deref().map(module_tag);
        let entry_tags = self.manager.entry_tags();
        self.manager
            .keys()
            .into_iter()
            .filter(|raw| {
                entry_tags.get(raw).is_some_and(|tags| {
                    tags.contains(&tenant)
                        && match &module {
                            Some(module) => tags.contains(module),
                            None => !tags.iter().any(|t| t.starts_with(MODULE_TAG_PREFIX)),
                        }
                })
            })
            .filter_map(|raw| CacheKey::parse(&raw, module.is_some()))
            .filter(|k| k.tenant_id() == self.tenant_id && k.module() == self.module())
            .collect()
    }
}
