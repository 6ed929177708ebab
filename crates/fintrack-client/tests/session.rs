use fintrack_client::{ApiClient, CachedApi, ClientError, GetOptions, Session};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session(server: &MockServer) -> Session {
    let api = ApiClient::new(&format!("{}/api", server.uri())).unwrap();
    Session::new(CachedApi::new(api))
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "Login successful",
            "token": token,
            "user": { "email": "demo@fintrack.test" },
        })))
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer, token: &str, name: &str) {
    Mock::given(method("GET"))
        .and(path("/api/auth/profile"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": { "name": name } })))
        .mount(server)
        .await;
}

async fn profile_hits(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/api/auth/profile")
        .count()
}

#[tokio::test]
async fn login_installs_the_token() {
    let server = MockServer::start().await;
    mount_login(&server, "t1").await;
    let session = session(&server);

    let user = session.login("demo@fintrack.test", "pw").await.unwrap();
    assert_eq!(user["email"], "demo@fintrack.test");
    assert!(session.is_authenticated());
    assert_eq!(session.api().api().token().as_deref(), Some("t1"));
}

#[tokio::test]
async fn failed_login_reports_the_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid credentials" })))
        .mount(&server)
        .await;
    let session = session(&server);

    let err = session.login("demo@fintrack.test", "bad").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn profile_is_cached_until_forced() {
    let server = MockServer::start().await;
    mount_login(&server, "t1").await;
    mount_profile(&server, "t1", "Alice").await;
    let session = session(&server);
    session.login("demo@fintrack.test", "pw").await.unwrap();

    session.load_user(false).await.unwrap();
    let user = session.load_user(false).await.unwrap();
    assert_eq!(user["name"], "Alice");
    assert_eq!(profile_hits(&server).await, 1);

    session.load_user(true).await.unwrap();
    assert_eq!(profile_hits(&server).await, 2);
}

#[tokio::test]
async fn load_user_requires_a_token() {
    let server = MockServer::start().await;
    let session = session(&server);
    assert!(matches!(
        session.load_user(false).await,
        Err(ClientError::NotAuthenticated)
    ));
}

#[tokio::test]
async fn logout_clears_state_even_when_the_server_fails() {
    let server = MockServer::start().await;
    mount_login(&server, "t1").await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    let session = session(&server);
    session.login("demo@fintrack.test", "pw").await.unwrap();
    session
        .api()
        .cache()
        .insert("/analytics/summary", json!({}), std::time::Duration::from_secs(60));

    session.logout().await;
    assert!(!session.is_authenticated());
    assert!(session.api().cache().is_empty());
}

#[tokio::test]
async fn next_user_never_sees_the_previous_profile() {
    let server = MockServer::start().await;
    mount_login(&server, "alice-token").await;
    mount_profile(&server, "alice-token", "Alice").await;
    mount_profile(&server, "bob-token", "Bob").await;
    let session = session(&server);

    session.login("alice@fintrack.test", "pw").await.unwrap();
    assert_eq!(session.load_user(false).await.unwrap()["name"], "Alice");

    let bob = session.adopt_token("bob-token").await.unwrap();
    assert_eq!(bob["name"], "Bob");
    assert_eq!(
        session
            .api()
            .get("/auth/profile", GetOptions::default())
            .await
            .unwrap()["user"]["name"],
        "Bob"
    );
}

#[tokio::test]
async fn rejected_token_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/profile"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Token is not valid." })))
        .mount(&server)
        .await;
    let session = session(&server);

    let err = session.adopt_token("stale").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn profile_fetched_before_a_switch_is_not_served_to_the_next_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/auth/profile"))
        .and(header("authorization", "Bearer alice-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "user": { "name": "Alice" } }))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    mount_profile(&server, "bob-token", "Bob").await;
    let session = session(&server);
    let api = session.api().clone();
    api.api().set_token(Some("alice-token".into()));

    let slow = tokio::spawn({
        let api = api.clone();
        async move { api.get("/auth/profile", GetOptions::default()).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    api.clear_cache(None);
    api.api().set_token(Some("bob-token".into()));

    let alice = slow.await.unwrap().unwrap();
    assert_eq!(alice["user"]["name"], "Alice");

    let bob = api.get("/auth/profile", GetOptions::default()).await.unwrap();
    assert_eq!(bob["user"]["name"], "Bob");
}
