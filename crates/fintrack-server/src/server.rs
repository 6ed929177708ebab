use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Request, header},
    middleware,
    routing::get,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::auth::JwtService;
use crate::cache::{DynCacheStore, create_cache_store};
use crate::config::AppConfig;
use crate::handlers;
use crate::ledger::Ledger;
use crate::middleware::request_id;
use crate::routes;

/// Shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub jwt: Arc<JwtService>,
    pub store: DynCacheStore,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig, ledger: Arc<Ledger>, store: DynCacheStore) -> Self {
        let jwt = JwtService::new(&config.auth.jwt_secret, config.auth.token_ttl());
        Self {
            ledger,
            jwt: Arc::new(jwt),
            store,
            config: Arc::new(config),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    let cfg = state.config.clone();
    let body_limit = cfg.server.body_limit_bytes;

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .nest("/api", routes::api_routes(&state))
        .with_state(state)
        // Ensure every request has a request id, and propagate it to responses
        .layer(middleware::from_fn(request_id))
        .layer(cors_layer(&cfg.server.cors_origin))
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    let req_id = req
                        .extensions()
                        .get::<HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("-");
                    tracing::info_span!(
                        "http.request",
                        http.method = %method,
                        http.target = %uri,
                        http.status_code = tracing::field::Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record("http.status_code", res.status().as_u16());
                        tracing::info!(
                            status = res.status().as_u16(),
                            elapsed_ms = latency.as_millis() as u64,
                            "request handled"
                        );
                    },
                ),
        )
        .layer(DefaultBodyLimit::max(body_limit))
}

/// Credentialed CORS for the single-page front-end. An origin that does not
/// parse leaves cross-origin requests rejected.
fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);
    match HeaderValue::from_str(origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin, "Ignoring invalid CORS origin");
            layer
        }
    }
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    store: Option<DynCacheStore>,
    ledger: Option<Arc<Ledger>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let config = AppConfig::default();
        Self {
            addr: config.addr(),
            config,
            store: None,
            ledger: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Use this store instead of the one described by the configuration.
    pub fn with_store(mut self, store: DynCacheStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> FintrackServer {
        let store = self
            .store
            .unwrap_or_else(|| create_cache_store(&self.config.redis, &self.config.cache));
        let ledger = self.ledger.unwrap_or_default();
        let state = AppState::new(self.config, ledger, store);
        FintrackServer {
            addr: self.addr,
            app: build_app(state.clone()),
            state,
        }
    }
}

pub struct FintrackServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

impl FintrackServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!(
            addr = %self.addr,
            cache = %self.state.store.mode(),
            "FinTrack server listening"
        );
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
