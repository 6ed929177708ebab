//! Response caching and invalidation.
//!
//! ## Architecture
//!
//! ```text
//! GET  → cache_response ──hit──→ stored JSON
//!             │ miss
//!             ↓
//!          handler ──2xx JSON──→ store.set (background)
//!
//! POST/PUT/PATCH/DELETE → handler ──2xx──→ invalidate_cache → response
//! ```
//!
//! ## Graceful Degradation
//!
//! Every store failure is absorbed by the adapter. With Redis down, reads
//! miss and call the handler, writes and invalidations report `false`, and
//! responses are the same as without a cache.

pub mod invalidation;
pub mod keys;
pub mod memory;
pub mod redis;
pub mod response;
pub mod store;

pub use invalidation::{CacheInvalidation, invalidate_cache};
pub use keys::{CacheKey, CacheRequest, InvalidationPattern, KeyFn, prefix, ttl};
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use response::{ResponseCache, cache_response};
pub use store::{CacheStore, DynCacheStore, StoreMode, escape_glob};

use std::sync::Arc;

use crate::config::{CacheConfig, RedisConfig};

/// Build the configured store.
///
/// Falls back to the in-process store when Redis is disabled or the URL
/// cannot be parsed. An unreachable server is not a fallback reason: the
/// Redis store keeps reconnecting and passes requests through meanwhile.
pub fn create_cache_store(redis: &RedisConfig, cache: &CacheConfig) -> DynCacheStore {
    if !redis.enabled {
        tracing::info!("Redis disabled, using in-process cache");
        return Arc::new(MemoryStore::new(
            cache.local_cache_max_entries,
            cache.default_ttl(),
        ));
    }

    match RedisStore::connect(redis, cache.default_ttl()) {
        Ok(store) => {
            tracing::info!(url = %redacted_url(&redis.url), "Connecting to Redis");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Invalid Redis URL. Falling back to in-process cache."
            );
            Arc::new(MemoryStore::new(
                cache.local_cache_max_entries,
                cache.default_ttl(),
            ))
        }
    }
}

/// Connection string with any password masked, for logs.
fn redacted_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => raw.to_string(),
    }
}
