#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use fintrack_server::auth::JwtService;
use fintrack_server::ledger::TransactionType;
use fintrack_server::{AppConfig, DynCacheStore, Ledger, MemoryStore, ServerBuilder};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.auth.jwt_secret = "integration-test-secret".into();
    cfg.redis.enabled = false;
    cfg
}

/// A running app over the real ledger, plus handles to inspect it.
pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<Ledger>,
    pub store: DynCacheStore,
    cfg: AppConfig,
}

impl TestApp {
    pub fn new(store: DynCacheStore) -> Self {
        let cfg = test_config();
        let ledger = Arc::new(Ledger::new());
        let server = ServerBuilder::new()
            .with_config(cfg.clone())
            .with_store(store.clone())
            .with_ledger(ledger.clone())
            .build();
        Self {
            router: server.router(),
            ledger,
            store,
            cfg,
        }
    }

    pub fn with_memory_store() -> (Self, MemoryStore) {
        let memory = MemoryStore::new(1_000, Duration::from_secs(600));
        (Self::new(Arc::new(memory.clone())), memory)
    }

    /// Create a user directly in the ledger and mint a token for them.
    ///
    /// These users never log in, so the stored hash is a placeholder.
    pub fn user(&self, email: &str) -> TestUser {
        let user = self
            .ledger
            .create_user("Test User", email, "unused".into())
            .unwrap();
        let jwt = JwtService::new(
            &self.cfg.auth.jwt_secret,
            self.cfg.auth.token_ttl(),
        );
        TestUser {
            id: user.id,
            token: jwt.issue(user.id).unwrap(),
        }
    }

    pub fn expense_category(&self, user: &TestUser) -> Uuid {
        self.ledger.categories(user.id, Some(TransactionType::Expense))[0].id
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri, token, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    /// Send `body` as written, without a round trip through `Value`.
    pub async fn send_text(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        body: String,
    ) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    pub async fn get(&self, uri: &str, user: &TestUser) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(&user.token), None).await
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

/// Cache writes happen in the background; wait until `key` lands.
pub async fn wait_for_key(memory: &MemoryStore, key: &str) {
    for _ in 0..100 {
        if memory.contains(key) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("cache key {key} was never written");
}
