//! Pattern invalidation for mutating routes.
//!
//! The handler runs first. Only when it answers with a 2xx status are the
//! configured patterns resolved and deleted, and the response is held until
//! every delete has finished, so a read issued right after the response
//! arrives cannot see the old entry.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::future::join_all;

use super::keys::{CacheRequest, InvalidationPattern};
use super::store::DynCacheStore;

/// Per-route invalidation configuration.
#[derive(Clone)]
pub struct CacheInvalidation {
    store: DynCacheStore,
    patterns: Arc<[InvalidationPattern]>,
}

impl CacheInvalidation {
    pub fn new<I, P>(store: DynCacheStore, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<InvalidationPattern>,
    {
        Self {
            store,
            patterns: patterns
                .into_iter()
                .map(Into::<InvalidationPattern>::into)
                .collect(),
        }
    }

    /// Concrete patterns for `req`, duplicates removed, declaration order kept.
    pub fn resolve(&self, req: &CacheRequest) -> Vec<String> {
        let mut resolved: Vec<String> = Vec::with_capacity(self.patterns.len());
        for pattern in self.patterns.iter() {
            let pattern = pattern.resolve(req);
            if !resolved.contains(&pattern) {
                resolved.push(pattern);
            }
        }
        resolved
    }

    /// Delete every resolved pattern. Returns the number of failed deletes.
    ///
    /// A failing pattern does not stop the others.
    pub async fn invalidate(&self, req: &CacheRequest) -> usize {
        let patterns = self.resolve(req);
        let results = join_all(
            patterns
                .iter()
                .map(|pattern| self.store.delete_pattern(pattern)),
        )
        .await;

        let mut failed = 0;
        for (pattern, ok) in patterns.iter().zip(results) {
            if !ok {
                failed += 1;
                tracing::warn!(pattern = %pattern, "cache invalidation failed");
            }
        }
        tracing::debug!(
            path = %req.path,
            patterns = patterns.len(),
            failed,
            "cache invalidated"
        );
        failed
    }
}

/// Invalidation middleware.
pub async fn invalidate_cache(
    State(invalidation): State<CacheInvalidation>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let cache_request = CacheRequest::from_parts(&mut parts).await;

    let response = next.run(Request::from_parts(parts, body)).await;

    if response.status().is_success() {
        invalidation.invalidate(&cache_request).await;
    }
    response
}
