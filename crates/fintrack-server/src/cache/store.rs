//! Key-value store adapter contract shared by the Redis and in-process stores.
//!
//! Every operation is infallible from the caller's point of view: failures are
//! logged here and reported as a miss (`None`) or `false`. A cache problem must
//! never turn into a failed request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Shared handle to the configured store.
pub type DynCacheStore = Arc<dyn CacheStore>;

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch and deserialize the JSON stored under `key`.
    ///
    /// Misses, undecodable payloads and backend errors all return `None`.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Serialize `value` and store it under `key` for `ttl`.
    ///
    /// A zero `ttl` means the store's default TTL.
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> bool;

    /// Remove one entry. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> bool;

    /// Remove every entry whose key matches the Redis-style glob `pattern`.
    async fn delete_pattern(&self, pattern: &str) -> bool;

    /// Whether the backend is currently reachable (for readiness checks).
    async fn is_available(&self) -> bool;

    fn mode(&self) -> StoreMode;
}

/// Which backend a store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Memory,
    Redis,
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreMode::Memory => write!(f, "memory"),
            StoreMode::Redis => write!(f, "redis"),
        }
    }
}

/// Failures inside a store implementation. Never leaves the adapter.
#[derive(Debug, thiserror::Error)]
pub(crate) enum StoreError {
    #[error("store is not connected")]
    Unavailable,

    #[error("store command timed out")]
    Timeout,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("store is full ({0} entries)")]
    Capacity(usize),
}

/// Resolve the effective TTL for a write.
pub(crate) fn effective_ttl(ttl: Duration, default_ttl: Duration) -> Duration {
    if ttl.is_zero() { default_ttl } else { ttl }
}

/// Escape glob metacharacters so `value` only matches itself inside a pattern.
pub fn escape_glob(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\' | '{' | '}') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
