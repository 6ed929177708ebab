//! In-process store used when Redis is disabled, and in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use globset::{GlobBuilder, GlobMatcher};
use serde_json::Value;

use super::store::{CacheStore, StoreError, StoreMode, effective_ttl};

/// Entry holding the serialized JSON, mirroring what Redis would store.
#[derive(Clone, Debug)]
struct MemoryEntry {
    json: Arc<str>,
    expires_at: Instant,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// DashMap-backed store with per-entry TTL and glob deletion.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, MemoryEntry>>,
    max_entries: usize,
    default_ttl: Duration,
}

impl MemoryStore {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_entries,
            default_ttl,
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    fn purge_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    fn try_get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let json = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Arc::clone(&entry.json),
            Some(entry) => {
                drop(entry);
                // A set may have replaced the entry since the read
                self.entries.remove_if(key, |_, entry| entry.is_expired());
                return Ok(None);
            }
            None => return Ok(None),
        };
        match serde_json::from_str(&json) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.entries
                    .remove_if(key, |_, entry| Arc::ptr_eq(&entry.json, &json));
                Err(e.into())
            }
        }
    }

    fn try_set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), StoreError> {
        let json: Arc<str> = serde_json::to_string(value)?.into();
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                return Err(StoreError::Capacity(self.max_entries));
            }
        }
        let expires_at = Instant::now() + effective_ttl(ttl, self.default_ttl);
        self.entries
            .insert(key.to_string(), MemoryEntry { json, expires_at });
        Ok(())
    }

    fn try_delete_pattern(&self, pattern: &str) -> Result<usize, StoreError> {
        let matcher = compile_pattern(pattern)?;
        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| matcher.is_match(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &matching {
            self.entries.remove(key);
        }
        Ok(matching.len())
    }
}

/// Compile a Redis-style glob (`*`, `?`, `[...]`, backslash escapes).
///
/// Keys are not paths, so `*` also crosses `/`.
fn compile_pattern(pattern: &str) -> Result<GlobMatcher, globset::Error> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()?
        .compile_matcher())
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Value> {
        match self.try_get(key) {
            Ok(Some(value)) => {
                tracing::debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache GET failed");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        match self.try_set(key, value, ttl) {
            Ok(()) => {
                tracing::debug!(key = %key, ttl_secs = %effective_ttl(ttl, self.default_ttl).as_secs(), "cache set");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache SET failed");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.remove(key);
        tracing::debug!(key = %key, "cache invalidated");
        true
    }

    async fn delete_pattern(&self, pattern: &str) -> bool {
        match self.try_delete_pattern(pattern) {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(pattern = %pattern, removed, "cache pattern invalidated");
                }
                true
            }
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "cache pattern delete failed");
                false
            }
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn mode(&self) -> StoreMode {
        StoreMode::Memory
    }
}
