use serde_json::Value;

use crate::api::ApiClient;
use crate::cache::{ClientCache, GetOptions};
use crate::error::Result;

/// [`ApiClient`] with cached reads.
///
/// Writes pass straight through and do not touch the cache; callers clear
/// whatever they know to be stale.
#[derive(Clone)]
pub struct CachedApi {
    api: ApiClient,
    cache: ClientCache,
}

impl CachedApi {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: ClientCache::new(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    pub async fn get(&self, path: &str, options: GetOptions) -> Result<Value> {
        self.cache
            .get_or_fetch(path, options, || self.api.get(path))
            .await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.api.post(path, body).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.api.put(path, body).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.api.patch(path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.api.delete(path).await
    }

    pub fn clear_cache(&self, path: Option<&str>) {
        self.cache.clear(path);
    }
}
