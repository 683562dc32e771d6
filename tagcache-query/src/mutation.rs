//! Mutations that invalidate on success.

use std::future::Future;
use tagcache_core::TagCacheError;

use crate::query::QueryCache;

/// Extracts the id of the record a mutation touched.
pub trait MutationId<R> {
    fn mutation_id(&self, result: &R) -> Option<String>;
}

/// No id: only lists and counts are invalidated.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoId;

impl<R> MutationId<R> for NoId {
    fn mutation_id(&self, _result: &R) -> Option<String> {
        None
    }
}

impl<R, G> MutationId<R> for G
where
    G: Fn(&R) -> Option<String>,
{
    fn mutation_id(&self, result: &R) -> Option<String> {
        self(result)
    }
}

/// A mutation bound to a [`QueryCache`].
///
/// [`call`](Self::call) runs the mutation and, only if it succeeds,
/// invalidates the entity before handing back the result. Failed mutations
/// leave the cache untouched.
pub struct WrappedMutation<'q, M, G> {
    cache: &'q QueryCache,
    mutation: M,
    get_id: G,
}

impl<'q, M> WrappedMutation<'q, M, NoId> {
    pub(crate) fn new(cache: &'q QueryCache, mutation: M) -> Self {
        Self {
            cache,
            mutation,
            get_id: NoId,
        }
    }

    /// Also delete the detail entry of the id extracted from the result.
    pub fn with_id<G>(self, get_id: G) -> WrappedMutation<'q, M, G> {
        WrappedMutation {
            cache: self.cache,
            mutation: self.mutation,
            get_id,
        }
    }
}

impl<M, G> WrappedMutation<'_, M, G> {
    pub async fn call<A, R, E, Fut>(&self, args: A) -> Result<R, E>
    where
        M: Fn(A) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        G: MutationId<R>,
        E: From<TagCacheError>,
    {
        let result = (self.mutation)(args).await?;
        let id = self.get_id.mutation_id(&result);
        self.cache.invalidate(id.as_deref())?;
        Ok(result)
    }
}

impl<M, G> std::fmt::Debug for WrappedMutation<'_, M, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedMutation")
            .field("cache", self.cache)
            .finish_non_exhaustive()
    }
}
