//! End-to-end cache coherence over the real router, ledger and memory store.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, wait_for_key};
use serde_json::json;

#[tokio::test]
async fn transaction_write_invalidates_cached_lists() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u1@fintrack.test");
    let category = app.expense_category(&user);
    let key = format!("transactions:{}:limit=5", user.id);

    let (status, first) = app.get("/api/transactions?limit=5", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["transactions"], json!([]));
    wait_for_key(&memory, &key).await;

    // Second read is served from the cache
    let (_, second) = app.get("/api/transactions?limit=5", &user).await;
    assert_eq!(first, second);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&user.token),
            Some(json!({
                "type": "expense",
                "amount": 42.0,
                "description": "Groceries",
                "category": category,
                "date": "2024-03-01",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!memory.contains(&key), "invalidation runs before the response");

    let (_, third) = app.get("/api/transactions?limit=5", &user).await;
    assert_eq!(third["transactions"].as_array().unwrap().len(), 1);
    assert_eq!(third["transactions"][0]["description"], "Groceries");
}

#[tokio::test]
async fn failed_writes_leave_the_cache_alone() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u2@fintrack.test");
    let key = format!("transactions:{}:default", user.id);

    app.get("/api/transactions", &user).await;
    wait_for_key(&memory, &key).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&user.token),
            Some(json!({ "type": "expense", "amount": -1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"].is_array());
    assert!(memory.contains(&key));
}

#[tokio::test]
async fn analytics_follow_transaction_writes() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u3@fintrack.test");
    let category = app.expense_category(&user);
    let key = format!("analytics:summary:{}:default", user.id);

    let (_, before) = app.get("/api/analytics/summary", &user).await;
    assert_eq!(before["summary"]["totalExpense"], json!(0.0));
    wait_for_key(&memory, &key).await;

    app.send(
        Method::POST,
        "/api/transactions",
        Some(&user.token),
        Some(json!({
            "type": "expense",
            "amount": 10.0,
            "description": "Coffee",
            "category": category,
            "date": "2024-03-02",
        })),
    )
    .await;

    let (_, after) = app.get("/api/analytics/summary", &user).await;
    assert_eq!(after["summary"]["totalExpense"], json!(10.0));
}

#[tokio::test]
async fn record_update_evicts_its_detail_entry() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u4@fintrack.test");
    let category = app.expense_category(&user);

    let (_, created) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&user.token),
            Some(json!({
                "type": "expense",
                "amount": 5.0,
                "description": "Bus",
                "category": category,
                "date": "2024-03-03",
            })),
        )
        .await;
    let id = created["transaction"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/transactions/{id}");
    let key = format!("transaction:detail:{}:{id}", user.id);

    app.get(&uri, &user).await;
    wait_for_key(&memory, &key).await;

    let (status, _) = app
        .send(
            Method::PUT,
            &uri,
            Some(&user.token),
            Some(json!({
                "type": "expense",
                "amount": 7.5,
                "description": "Taxi",
                "category": category,
                "date": "2024-03-03",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!memory.contains(&key));

    let (_, detail) = app.get(&uri, &user).await;
    assert_eq!(detail["transaction"]["description"], "Taxi");
}

#[tokio::test]
async fn profile_update_only_touches_the_acting_user() {
    let (app, memory) = TestApp::with_memory_store();
    let alice = app.user("alice@fintrack.test");
    let bob = app.user("bob@fintrack.test");
    let alice_key = format!("auth:profile:{}", alice.id);
    let bob_key = format!("auth:profile:{}", bob.id);

    app.get("/api/auth/profile", &alice).await;
    app.get("/api/auth/profile", &bob).await;
    wait_for_key(&memory, &alice_key).await;
    wait_for_key(&memory, &bob_key).await;

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/auth/profile",
            Some(&alice.token),
            Some(json!({ "name": "Alice" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!memory.contains(&alice_key));
    assert!(memory.contains(&bob_key));

    let (_, profile) = app.get("/api/auth/profile", &alice).await;
    assert_eq!(profile["user"]["name"], "Alice");
}

#[tokio::test]
async fn category_rename_reaches_transaction_views() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u5@fintrack.test");
    let category = app.expense_category(&user);

    app.send(
        Method::POST,
        "/api/transactions",
        Some(&user.token),
        Some(json!({
            "type": "expense",
            "amount": 3.0,
            "description": "Snack",
            "category": category,
            "date": "2024-03-04",
        })),
    )
    .await;
    app.get("/api/transactions", &user).await;
    wait_for_key(&memory, &format!("transactions:{}:default", user.id)).await;

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/categories/{category}"),
            Some(&user.token),
            Some(json!({ "name": "Treats", "type": "expense" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, list) = app.get("/api/transactions", &user).await;
    assert_eq!(list["transactions"][0]["category"]["name"], "Treats");
}

#[tokio::test]
async fn p2p_status_change_refreshes_lists_and_summary() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u6@fintrack.test");

    let (status, created) = app
        .send(
            Method::POST,
            "/api/transactions/p2p",
            Some(&user.token),
            Some(json!({
                "counterparty": "Sam",
                "direction": "lent",
                "amount": 20.0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["transaction"]["id"].as_str().unwrap().to_string();

    app.get("/api/transactions/p2p/summary", &user).await;
    let summary_key = format!(
        "p2p:summary:{}:/api/transactions/p2p/summary",
        user.id
    );
    wait_for_key(&memory, &summary_key).await;

    let (status, _) = app
        .send(
            Method::PATCH,
            &format!("/api/transactions/p2p/{id}/status"),
            Some(&user.token),
            Some(json!({ "status": "settled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!memory.contains(&summary_key));

    let (_, list) = app.get("/api/transactions/p2p?status=settled", &user).await;
    assert_eq!(list["transactions"].as_array().unwrap().len(), 1);
}

fn expense(category: uuid::Uuid, description: &str) -> serde_json::Value {
    json!({
        "type": "expense",
        "amount": 8.0,
        "description": description,
        "category": category,
        "date": "2024-03-10",
    })
}

async fn create_transaction(app: &TestApp, user: &common::TestUser, description: &str) -> String {
    let category = app.expense_category(user);
    let (status, created) = app
        .send(
            Method::POST,
            "/api/transactions",
            Some(&user.token),
            Some(expense(category, description)),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    created["transaction"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn cached_detail_replays_amounts_exactly() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u7@fintrack.test");
    let category = app.expense_category(&user);

    // More significant digits than an f64 holds
    let body = format!(
        r#"{{"type":"expense","amount":99574.06936622501926,"description":"Rent","category":"{category}","date":"2024-03-05"}}"#
    );
    let (status, created) = app
        .send_text(Method::POST, "/api/transactions", &user.token, body)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created: serde_json::Value = serde_json::from_slice(&created).unwrap();
    let id = created["transaction"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/transactions/{id}");

    let (status, fresh) = app
        .send_raw(Method::GET, &uri, Some(&user.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    wait_for_key(&memory, &format!("transaction:detail:{}:{id}", user.id)).await;

    let (status, hit) = app
        .send_raw(Method::GET, &uri, Some(&user.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(fresh).unwrap(), String::from_utf8(hit).unwrap());
}

#[tokio::test]
async fn transaction_delete_evicts_detail_and_lists() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u8@fintrack.test");
    let id = create_transaction(&app, &user, "Lunch").await;
    let uri = format!("/api/transactions/{id}");
    let detail_key = format!("transaction:detail:{}:{id}", user.id);
    let list_key = format!("transactions:{}:default", user.id);

    app.get(&uri, &user).await;
    app.get("/api/transactions", &user).await;
    wait_for_key(&memory, &detail_key).await;
    wait_for_key(&memory, &list_key).await;

    let (status, _) = app
        .send(Method::DELETE, &uri, Some(&user.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!memory.contains(&detail_key));
    assert!(!memory.contains(&list_key));

    let (status, _) = app.get(&uri, &user).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, list) = app.get("/api/transactions", &user).await;
    assert_eq!(list["transactions"], json!([]));
}

#[tokio::test]
async fn bulk_delete_evicts_every_detail_entry_of_the_user() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u9@fintrack.test");
    let other = app.user("u10@fintrack.test");
    let first = create_transaction(&app, &user, "Book").await;
    let second = create_transaction(&app, &user, "Pen").await;
    let foreign = create_transaction(&app, &other, "Lamp").await;

    let keys: Vec<String> = [&first, &second]
        .iter()
        .map(|id| format!("transaction:detail:{}:{id}", user.id))
        .collect();
    let foreign_key = format!("transaction:detail:{}:{foreign}", other.id);
    for id in [&first, &second] {
        app.get(&format!("/api/transactions/{id}"), &user).await;
    }
    app.get(&format!("/api/transactions/{foreign}"), &other).await;
    for key in &keys {
        wait_for_key(&memory, key).await;
    }
    wait_for_key(&memory, &foreign_key).await;

    let (status, body) = app
        .send(
            Method::DELETE,
            "/api/transactions/bulk",
            Some(&user.token),
            Some(json!({ "ids": [first, second] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCount"], 2);
    for key in &keys {
        assert!(!memory.contains(key));
    }
    assert!(memory.contains(&foreign_key));

    let (status, _) = app.get(&format!("/api/transactions/{first}"), &user).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn p2p_create_refreshes_the_lending_views() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u11@fintrack.test");
    let list_key = format!("p2p:{}:/api/transactions/p2p", user.id);
    let summary_key = format!("p2p:summary:{}:/api/transactions/p2p/summary", user.id);

    let (_, before) = app.get("/api/transactions/p2p", &user).await;
    assert_eq!(before["transactions"], json!([]));
    app.get("/api/transactions/p2p/summary", &user).await;
    wait_for_key(&memory, &list_key).await;
    wait_for_key(&memory, &summary_key).await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/transactions/p2p",
            Some(&user.token),
            Some(json!({
                "counterparty": "Kim",
                "direction": "borrowed",
                "amount": 15.0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!memory.contains(&list_key));
    assert!(!memory.contains(&summary_key));

    let (_, after) = app.get("/api/transactions/p2p", &user).await;
    assert_eq!(after["transactions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn category_delete_refreshes_the_category_list() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u12@fintrack.test");
    let key = format!("categories:{}:all", user.id);

    let (status, created) = app
        .send(
            Method::POST,
            "/api/categories",
            Some(&user.token),
            Some(json!({ "name": "Hobbies", "type": "expense" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["category"]["id"].as_str().unwrap().to_string();

    let (_, before) = app.get("/api/categories", &user).await;
    let count = before["categories"].as_array().unwrap().len();
    wait_for_key(&memory, &key).await;

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/api/categories/{id}"),
            Some(&user.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!memory.contains(&key));

    let (_, after) = app.get("/api/categories", &user).await;
    let names: Vec<&str> = after["categories"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names.len(), count - 1);
    assert!(!names.contains(&"Hobbies"));
}

#[tokio::test]
async fn logout_evicts_the_cached_profile() {
    let (app, memory) = TestApp::with_memory_store();
    let user = app.user("u13@fintrack.test");
    let key = format!("auth:profile:{}", user.id);

    app.get("/api/auth/profile", &user).await;
    wait_for_key(&memory, &key).await;

    let (status, body) = app
        .send(Method::POST, "/api/auth/logout", Some(&user.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logout successful");
    assert!(!memory.contains(&key));

    let (status, profile) = app.get("/api/auth/profile", &user).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["email"], "u13@fintrack.test");
}
