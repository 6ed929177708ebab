//! In-process cache for GET responses, keyed by URL.
//!
//! Each record is evicted by its own timer task. Storing a new record under
//! the same URL or clearing the cache aborts the old timer, and every record
//! carries a generation so a timer that fires late can only evict the
//! record it was started for.
//!
//! Clearing also advances a cache-wide epoch. A fetch that started before
//! the clear still returns its value to the caller but does not store it,
//! so a response fetched for one session never lands in the next.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::Result;

/// Options for a cached read.
#[derive(Debug, Clone, Copy)]
pub struct GetOptions {
    pub use_cache: bool,
    pub cache_duration: Duration,
    pub force_refresh: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_duration: Duration::from_secs(10),
            force_refresh: false,
        }
    }
}

impl GetOptions {
    pub fn ttl(cache_duration: Duration) -> Self {
        Self {
            cache_duration,
            ..Self::default()
        }
    }

    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }
}

struct Record {
    value: Value,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Records {
    entries: HashMap<String, Record>,
    next_generation: u64,
    epoch: u64,
}

#[derive(Clone, Default)]
pub struct ClientCache {
    inner: Arc<Mutex<Records>>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Value> {
        self.inner.lock().entries.get(url).map(|r| r.value.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `value` under `url` until `ttl` elapses.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn insert(&self, url: &str, value: Value, ttl: Duration) {
        let mut records = self.inner.lock();
        Self::insert_locked(&self.inner, &mut records, url, value, ttl);
    }

    fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    /// Insert only if nothing was cleared since `epoch` was read.
    fn insert_if_current(&self, epoch: u64, url: &str, value: Value, ttl: Duration) -> bool {
        let mut records = self.inner.lock();
        if records.epoch != epoch {
            return false;
        }
        Self::insert_locked(&self.inner, &mut records, url, value, ttl);
        true
    }

    fn insert_locked(
        inner: &Arc<Mutex<Records>>,
        records: &mut Records,
        url: &str,
        value: Value,
        ttl: Duration,
    ) {
        records.next_generation += 1;
        let generation = records.next_generation;
        let timer = spawn_eviction(Arc::downgrade(inner), url.to_string(), generation, ttl);
        let record = Record {
            value,
            generation,
            timer,
        };
        if let Some(old) = records.entries.insert(url.to_string(), record) {
            old.timer.abort();
        }
    }

    /// Drop one URL, or everything when `url` is `None`.
    ///
    /// Any clear also discards the results of fetches still in flight.
    pub fn clear(&self, url: Option<&str>) {
        let mut records = self.inner.lock();
        records.epoch += 1;
        match url {
            Some(url) => {
                if let Some(old) = records.entries.remove(url) {
                    old.timer.abort();
                }
            }
            None => {
                for (_, old) in records.entries.drain() {
                    old.timer.abort();
                }
            }
        }
    }

    /// Serve `url` from the cache, or run `fetch` and remember its result.
    ///
    /// Errors are never cached.
    pub async fn get_or_fetch<F, Fut>(&self, url: &str, options: GetOptions, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if options.use_cache && !options.force_refresh {
            if let Some(value) = self.get(url) {
                tracing::trace!(url, "client cache hit");
                return Ok(value);
            }
        }

        let epoch = self.epoch();
        let value = fetch().await.inspect_err(|e| {
            tracing::warn!(url, error = %e, "fetch failed");
        })?;
        if options.use_cache
            && !self.insert_if_current(epoch, url, value.clone(), options.cache_duration)
        {
            tracing::debug!(url, "cache cleared during fetch, result not stored");
        }
        Ok(value)
    }
}

fn spawn_eviction(
    records: Weak<Mutex<Records>>,
    url: String,
    generation: u64,
    ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let Some(records) = records.upgrade() else {
            return;
        };
        let mut records = records.lock();
        if records
            .entries
            .get(&url)
            .is_some_and(|r| r.generation == generation)
        {
            records.entries.remove(&url);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn records_expire_after_their_ttl() {
        let cache = ClientCache::new();
        cache.insert("/analytics/summary", json!(1), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(cache.get("/analytics/summary"), Some(json!(1)));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cache.get("/analytics/summary"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn old_timer_cannot_evict_a_newer_record() {
        let cache = ClientCache::new();
        cache.insert("/transactions", json!("old"), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(3)).await;
        cache.insert("/transactions", json!("new"), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.get("/transactions"), Some(json!("new")));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_then_reinsert_keeps_the_new_record() {
        let cache = ClientCache::new();
        cache.insert("/auth/profile", json!("alice"), Duration::from_secs(30));
        cache.clear(None);
        assert!(cache.is_empty());

        tokio::time::sleep(Duration::from_secs(20)).await;
        cache.insert("/auth/profile", json!("bob"), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(cache.get("/auth/profile"), Some(json!("bob")));
    }

    #[tokio::test]
    async fn clear_one_url() {
        let cache = ClientCache::new();
        cache.insert("/a", json!(1), Duration::from_secs(60));
        cache.insert("/b", json!(2), Duration::from_secs(60));
        cache.clear(Some("/a"));
        assert_eq!(cache.get("/a"), None);
        assert_eq!(cache.get("/b"), Some(json!(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_in_flight_during_clear_is_not_stored() {
        let cache = ClientCache::new();
        let fetching = cache.get_or_fetch("/auth/profile", GetOptions::default(), || async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(json!("alice"))
        });
        let clearing = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cache.clear(None);
        };
        let (fetched, ()) = tokio::join!(fetching, clearing);

        assert_eq!(fetched.unwrap(), json!("alice"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = ClientCache::new();
        let result = cache
            .get_or_fetch("/x", GetOptions::default(), || async {
                Err(crate::ClientError::NotAuthenticated)
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
