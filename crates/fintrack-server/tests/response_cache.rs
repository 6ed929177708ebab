//! Read-path behaviour of `cache_response` around a counting handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::get,
};
use fintrack_server::auth::AuthUser;
use fintrack_server::cache::keys::query_key;
use fintrack_server::cache::{MemoryStore, ResponseCache, cache_response};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Clone, Default)]
struct Counter(Arc<AtomicUsize>);

impl Counter {
    fn hits(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn list(State(counter): State<Counter>) -> Response {
    let n = counter.0.fetch_add(1, Ordering::SeqCst) + 1;
    // Key order is deliberately not alphabetical
    Json(json!({ "zeta": n, "alpha": [1, 2, 3], "nested": { "b": true, "a": null } }))
        .into_response()
}

async fn missing(State(counter): State<Counter>) -> Response {
    counter.0.fetch_add(1, Ordering::SeqCst);
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Transaction not found" }))).into_response()
}

async fn plain(State(counter): State<Counter>) -> Response {
    counter.0.fetch_add(1, Ordering::SeqCst);
    "not json".into_response()
}

fn router(memory: &MemoryStore, counter: Counter) -> Router {
    let cache = ResponseCache::new(Arc::new(memory.clone()), "items", Duration::from_secs(60))
        .with_key(query_key("items"));
    Router::new()
        .route("/items", get(list))
        .route("/missing", get(missing))
        .route("/plain", get(plain))
        .route_layer(from_fn_with_state(cache, cache_response))
        .with_state(counter)
}

fn request(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    if let Some(id) = user {
        request.extensions_mut().insert(AuthUser { id });
    }
    request
}

async fn call(app: &Router, uri: &str, user: Option<Uuid>) -> (StatusCode, String, Vec<u8>) {
    let response = app.clone().oneshot(request(uri, user)).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    (status, content_type, body)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn hit_is_byte_identical_and_skips_handler() {
    let memory = MemoryStore::new(100, Duration::from_secs(60));
    let counter = Counter::default();
    let app = router(&memory, counter.clone());
    let user = Some(Uuid::new_v4());

    let (status, _, fresh) = call(&app, "/items?limit=5", user).await;
    assert_eq!(status, StatusCode::OK);
    settle().await;

    let (status, content_type, cached) = call(&app, "/items?limit=5", user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/json");
    assert_eq!(fresh, cached);
    assert_eq!(counter.hits(), 1);
}

#[tokio::test]
async fn query_order_shares_a_key() {
    let memory = MemoryStore::new(100, Duration::from_secs(60));
    let counter = Counter::default();
    let app = router(&memory, counter.clone());
    let user = Some(Uuid::new_v4());

    call(&app, "/items?b=2&a=1", user).await;
    settle().await;
    call(&app, "/items?a=1&b=2", user).await;
    assert_eq!(counter.hits(), 1);

    call(&app, "/items?a=1&b=3", user).await;
    assert_eq!(counter.hits(), 2);
}

#[tokio::test]
async fn users_and_queries_are_scoped() {
    let memory = MemoryStore::new(100, Duration::from_secs(60));
    let counter = Counter::default();
    let app = router(&memory, counter.clone());
    let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());

    call(&app, "/items?limit=5", Some(u1)).await;
    call(&app, "/items?limit=10", Some(u1)).await;
    call(&app, "/items?limit=5", Some(u2)).await;
    settle().await;

    assert_eq!(counter.hits(), 3);
    assert!(memory.contains(&format!("items:{u1}:limit=5")));
    assert!(memory.contains(&format!("items:{u1}:limit=10")));
    assert!(memory.contains(&format!("items:{u2}:limit=5")));
}

#[tokio::test]
async fn anonymous_requests_use_guest_scope() {
    let memory = MemoryStore::new(100, Duration::from_secs(60));
    let app = router(&memory, Counter::default());

    call(&app, "/items", None).await;
    settle().await;
    assert!(memory.contains("items:guest:default"));
}

#[tokio::test]
async fn error_responses_are_never_stored() {
    let memory = MemoryStore::new(100, Duration::from_secs(60));
    let counter = Counter::default();
    let app = router(&memory, counter.clone());
    let user = Some(Uuid::new_v4());

    for _ in 0..2 {
        let (status, _, _) = call(&app, "/missing", user).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        settle().await;
    }
    assert_eq!(counter.hits(), 2);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn non_json_bodies_pass_through() {
    let memory = MemoryStore::new(100, Duration::from_secs(60));
    let counter = Counter::default();
    let app = router(&memory, counter.clone());

    let (_, _, body) = call(&app, "/plain", None).await;
    settle().await;
    let (_, _, again) = call(&app, "/plain", None).await;
    assert_eq!(body, b"not json");
    assert_eq!(body, again);
    assert_eq!(counter.hits(), 2);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn mutating_methods_bypass_the_cache() {
    let memory = MemoryStore::new(100, Duration::from_secs(60));
    let counter = Counter::default();
    let cache = ResponseCache::new(Arc::new(memory.clone()), "items", Duration::from_secs(60));
    let app = Router::new()
        .route("/items", axum::routing::post(list))
        .route_layer(from_fn_with_state(cache, cache_response))
        .with_state(counter.clone());

    for _ in 0..2 {
        let request = Request::builder()
            .method("POST")
            .uri("/items")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap();
    }
    settle().await;
    assert_eq!(counter.hits(), 2);
    assert!(memory.is_empty());
}
