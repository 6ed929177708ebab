//! Redis-backed store.
//!
//! ## Connection lifecycle
//!
//! One long-lived [`ConnectionManager`] is shared by every request. A
//! supervisor task establishes it in the background, waiting
//! `step × attempt` (capped) between failed attempts, so the server starts
//! and serves uncached responses while Redis is still unreachable. Once
//! connected, the manager reconnects by itself with capped exponential
//! backoff.
//!
//! ## Failure handling
//!
//! Each operation gets at most `max_retries_per_request` attempts, each
//! bounded by the response timeout. Exhausted retries, timeouts and decode
//! errors are logged and surface only as a miss or `false`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, RedisResult};
use serde_json::Value;

use super::store::{CacheStore, StoreError, StoreMode, effective_ttl};
use crate::config::RedisConfig;

/// Keys requested per SCAN round-trip.
const SCAN_BATCH: usize = 500;

/// Keys removed per DEL command.
const DELETE_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisStore {
    conn: Arc<ArcSwapOption<ConnectionManager>>,
    max_attempts: usize,
    response_timeout: Duration,
    default_ttl: Duration,
}

impl RedisStore {
    /// Create the store and start connecting in the background.
    ///
    /// Only a malformed URL is an error; an unreachable server is retried
    /// until it comes up.
    pub fn connect(config: &RedisConfig, default_ttl: Duration) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(config.url.as_str())?;
        let store = Self {
            conn: Arc::new(ArcSwapOption::empty()),
            max_attempts: config.max_retries_per_request.max(1),
            response_timeout: config.response_timeout(),
            default_ttl,
        };
        store.spawn_supervisor(client, config.clone());
        Ok(store)
    }

    /// Whether the initial connection has been established.
    pub fn is_connected(&self) -> bool {
        self.conn.load().is_some()
    }

    fn spawn_supervisor(&self, client: redis::Client, config: RedisConfig) {
        let slot = Arc::clone(&self.conn);
        tokio::spawn(async move {
            let mut attempt: u32 = 1;
            loop {
                let connecting =
                    ConnectionManager::new_with_config(client.clone(), manager_config(&config));
                match tokio::time::timeout(config.connect_timeout(), connecting).await {
                    Ok(Ok(manager)) => {
                        slot.store(Some(Arc::new(manager)));
                        tracing::info!(attempt, "Redis connected");
                        return;
                    }
                    Ok(Err(e)) => {
                        let delay = config.reconnect_delay(attempt);
                        tracing::warn!(
                            error = %e,
                            attempt,
                            retry_in_ms = %delay.as_millis(),
                            "Redis connection failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(_) => {
                        let delay = config.reconnect_delay(attempt);
                        tracing::warn!(
                            attempt,
                            retry_in_ms = %delay.as_millis(),
                            "Redis connection timed out, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                attempt = attempt.saturating_add(1);
            }
        });
    }

    /// Run `op` against the shared connection with bounded retries.
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.conn.load_full().ok_or(StoreError::Unavailable)?;
        let mut last_error = StoreError::Unavailable;
        for attempt in 1..=self.max_attempts {
            match tokio::time::timeout(self.response_timeout, op((*conn).clone())).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if is_transient(&e) => {
                    tracing::debug!(attempt, error = %e, "Redis command failed, retrying");
                    last_error = StoreError::Redis(e);
                }
                Ok(Err(e)) => return Err(StoreError::Redis(e)),
                Err(_) => {
                    tracing::debug!(attempt, "Redis command timed out");
                    last_error = StoreError::Timeout;
                }
            }
        }
        Err(last_error)
    }

    async fn try_get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let raw = self
            .run(|mut conn| async move { conn.get::<_, Option<String>>(key).await })
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn try_set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        let json = json.as_str();
        let ttl_secs = effective_ttl(ttl, self.default_ttl).as_secs().max(1);
        self.run(|mut conn| async move { conn.set_ex::<_, _, ()>(key, json, ttl_secs).await })
            .await
    }

    async fn try_delete_pattern(&self, pattern: &str) -> Result<usize, StoreError> {
        let mut keys = self
            .run(|mut conn| async move {
                let mut cursor: u64 = 0;
                let mut found = Vec::new();
                loop {
                    let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await?;
                    found.extend(batch);
                    if next == 0 {
                        return Ok::<_, redis::RedisError>(found);
                    }
                    cursor = next;
                }
            })
            .await?;

        // SCAN may report a key more than once
        keys.sort_unstable();
        keys.dedup();

        for chunk in keys.chunks(DELETE_BATCH) {
            self.run(|mut conn| async move { conn.del::<_, ()>(chunk).await })
                .await?;
        }
        Ok(keys.len())
    }
}

/// Reconnect policy for an established connection: exponential, capped.
fn manager_config(config: &RedisConfig) -> ConnectionManagerConfig {
    ConnectionManagerConfig::new()
        .set_factor(config.reconnect_step_ms)
        .set_max_delay(config.reconnect_max_delay_ms)
        .set_number_of_retries(config.reconnect_retries)
        .set_connection_timeout(config.connect_timeout())
        .set_response_timeout(config.response_timeout())
}

/// Errors worth another attempt on the same operation.
fn is_transient(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Option<Value> {
        match self.try_get(key).await {
            Ok(Some(value)) => {
                tracing::debug!(key = %key, "cache hit");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                None
            }
            Err(StoreError::Unavailable) => {
                tracing::debug!(key = %key, "cache bypassed, Redis not connected");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET error");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        match self.try_set(key, value, ttl).await {
            Ok(()) => {
                tracing::debug!(key = %key, ttl_secs = %effective_ttl(ttl, self.default_ttl).as_secs(), "cache set");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis SET error");
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self
            .run(|mut conn| async move { conn.del::<_, ()>(key).await })
            .await
        {
            Ok(()) => {
                tracing::debug!(key = %key, "cache invalidated");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis DEL error");
                false
            }
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> bool {
        match self.try_delete_pattern(pattern).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(pattern = %pattern, removed, "cache pattern invalidated");
                }
                true
            }
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Redis pattern delete error");
                false
            }
        }
    }

    async fn is_available(&self) -> bool {
        self.run(|mut conn| async move {
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, redis::RedisError>(pong)
        })
        .await
        .is_ok()
    }

    fn mode(&self) -> StoreMode {
        StoreMode::Redis
    }
}
