//! Read-through response cache for GET routes.
//!
//! Attached per route with [`axum::middleware::from_fn_with_state`]:
//!
//! ```ignore
//! get(list_transactions).layer(from_fn_with_state(
//!     ResponseCache::new(store, prefix::TRANSACTIONS, ttl::TRANSACTIONS)
//!         .with_key(query_key(prefix::TRANSACTIONS)),
//!     cache_response,
//! ))
//! ```
//!
//! A hit is answered straight from the store without running the handler.
//! On a miss the handler's response is buffered, returned unchanged, and a
//! copy of a successful JSON body is written to the store in the background.

use std::time::Duration;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;

use super::keys::{CacheKey, CacheRequest, KeyFn, default_key};
use super::store::DynCacheStore;

/// Upper bound on bodies buffered for caching when not configured.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Per-route response cache configuration.
#[derive(Clone)]
pub struct ResponseCache {
    store: DynCacheStore,
    prefix: &'static str,
    ttl: Duration,
    key_fn: Option<KeyFn>,
    max_body_bytes: usize,
}

impl ResponseCache {
    pub fn new(store: DynCacheStore, prefix: &'static str, ttl: Duration) -> Self {
        Self {
            store,
            prefix,
            ttl,
            key_fn: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Derive keys with `key_fn` instead of `prefix:userId:fullPath`.
    pub fn with_key(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    /// Bodies larger than this are served but not cached.
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn key_for(&self, req: &CacheRequest) -> CacheKey {
        match &self.key_fn {
            Some(key_fn) => key_fn(req),
            None => default_key(self.prefix, req),
        }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// Response cache middleware.
pub async fn cache_response(
    State(cache): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let cache_request = CacheRequest::from_parts(&mut parts).await;
    let key = cache.key_for(&cache_request);

    if let Some(cached) = cache.store.get(key.as_str()).await {
        match serde_json::to_vec(&cached) {
            Ok(json) => {
                tracing::debug!(key = %key, "cache hit");
                return json_response(json);
            }
            // Unrenderable entry: treat as a miss
            Err(e) => tracing::warn!(key = %key, error = %e, "cached entry not renderable"),
        }
    }

    tracing::debug!(key = %key, "cache miss");
    let response = next.run(Request::from_parts(parts, body)).await;

    if !is_cacheable(&response, cache.max_body_bytes) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, cache.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "failed to buffer response body");
            return without_body(parts);
        }
    };

    store_in_background(&cache, key, &bytes);

    Response::from_parts(parts, Body::from(bytes))
}

/// Only successful JSON responses with a known, bounded length are cached.
fn is_cacheable(response: &Response, max_body_bytes: usize) -> bool {
    if !response.status().is_success() {
        return false;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return false;
    }
    matches!(
        response.body().size_hint().upper(),
        Some(len) if len as usize <= max_body_bytes
    )
}

fn store_in_background(cache: &ResponseCache, key: CacheKey, bytes: &Bytes) {
    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "response body is not JSON, not caching");
            return;
        }
    };
    let store = cache.store.clone();
    let ttl = cache.ttl;
    tokio::spawn(async move {
        if !store.set(key.as_str(), &value, ttl).await {
            tracing::debug!(key = %key, "response not cached");
        }
    });
}

/// The handler's status and headers with the unreadable body dropped.
fn without_body(mut parts: axum::http::response::Parts) -> Response {
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.remove(header::CONTENT_TYPE);
    Response::from_parts(parts, Body::empty())
}

fn json_response(json: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(json));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
