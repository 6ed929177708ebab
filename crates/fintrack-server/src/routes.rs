//! `/api` route table.
//!
//! Each read route declares its cache prefix, TTL and key; each write route
//! declares the patterns it invalidates once it succeeds. Handlers stay
//! unaware of both.

use std::time::Duration;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{MethodRouter, delete, get, patch, post, put},
};

use crate::cache::{
    CacheInvalidation, InvalidationPattern, KeyFn, ResponseCache, cache_response, invalidate_cache,
    keys, prefix, ttl,
};
use crate::handlers::{analytics, auth, categories, p2p, transactions};
use crate::middleware::authentication_middleware;
use crate::server::AppState;

/// Category edits change names and colours embedded in transaction views.
const CATEGORY_WRITES: [&str; 4] = [
    "categories:*",
    "transactions:*",
    "transaction:detail:*",
    "analytics:*",
];
const TRANSACTION_WRITES: [&str; 2] = ["transactions:*", "analytics:*"];
const P2P_WRITES: [&str; 2] = ["transactions:*", "p2p:*"];
const PROFILE_WRITES: [&str; 1] = ["auth:profile:{userId}"];

pub fn api_routes(state: &AppState) -> Router<AppState> {
    let layers = Layers::new(state);

    let public = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/register", post(auth::register));

    let protected = Router::new()
        // Auth
        .route(
            "/auth/profile",
            layers
                .cached(get(auth::profile), prefix::AUTH_PROFILE, ttl::AUTH_PROFILE)
                .key(keys::user_key(prefix::AUTH_PROFILE))
                .finish()
                .merge(layers.invalidating(put(auth::update_profile), PROFILE_WRITES)),
        )
        .route(
            "/auth/logout",
            layers.invalidating(post(auth::logout), PROFILE_WRITES),
        )
        // Categories
        .route(
            "/categories",
            layers
                .cached(
                    get(categories::list_categories),
                    prefix::CATEGORIES,
                    ttl::CATEGORIES,
                )
                .key(keys::query_param_key(prefix::CATEGORIES, "type", "all"))
                .finish()
                .merge(layers.invalidating(post(categories::create_category), CATEGORY_WRITES)),
        )
        .route(
            "/categories/{id}",
            layers.invalidating(
                put(categories::update_category).delete(categories::delete_category),
                CATEGORY_WRITES,
            ),
        )
        // Transactions
        .route(
            "/transactions",
            layers
                .cached(
                    get(transactions::list_transactions),
                    prefix::TRANSACTIONS,
                    ttl::TRANSACTIONS,
                )
                .key(keys::query_key(prefix::TRANSACTIONS))
                .finish()
                .merge(layers.invalidating(
                    post(transactions::create_transaction),
                    TRANSACTION_WRITES,
                )),
        )
        .route(
            "/transactions/categories",
            layers
                .cached(
                    get(categories::list_categories),
                    prefix::CATEGORIES,
                    ttl::CATEGORIES,
                )
                .finish(),
        )
        .route(
            "/transactions/bulk",
            layers.invalidating(
                delete(transactions::bulk_delete_transactions),
                TRANSACTION_WRITES
                    .map(InvalidationPattern::from)
                    .into_iter()
                    .chain([InvalidationPattern::template(
                        "transaction:detail:{userId}:*",
                    )]),
            ),
        )
        // Lending
        .route(
            "/transactions/p2p",
            layers
                .cached(get(p2p::list_p2p), prefix::P2P, ttl::P2P)
                .finish()
                .merge(layers.invalidating(post(p2p::create_p2p), P2P_WRITES)),
        )
        .route(
            "/transactions/p2p/summary",
            layers
                .cached(get(p2p::p2p_summary), prefix::P2P_SUMMARY, ttl::P2P_SUMMARY)
                .finish(),
        )
        .route(
            "/transactions/p2p/{id}/status",
            layers.invalidating(
                patch(p2p::update_p2p_status),
                with_record(["p2p:*", "transactions:*"]),
            ),
        )
        .route(
            "/transactions/{id}",
            layers
                .cached(
                    get(transactions::get_transaction),
                    prefix::TRANSACTION_DETAIL,
                    ttl::TRANSACTION_DETAIL,
                )
                .key(keys::record_key(prefix::TRANSACTION_DETAIL, "id"))
                .finish()
                .merge(layers.invalidating(
                    put(transactions::update_transaction)
                        .delete(transactions::delete_transaction),
                    with_record(TRANSACTION_WRITES),
                )),
        )
        // Analytics
        .route(
            "/analytics/summary",
            layers.query_cached(
                get(analytics::summary),
                prefix::ANALYTICS_SUMMARY,
                ttl::ANALYTICS,
            ),
        )
        .route(
            "/analytics/by-category",
            layers.query_cached(
                get(analytics::by_category),
                prefix::ANALYTICS_BY_CATEGORY,
                ttl::ANALYTICS,
            ),
        )
        .route(
            "/analytics/by-date",
            layers.query_cached(
                get(analytics::by_date),
                prefix::ANALYTICS_BY_DATE,
                ttl::ANALYTICS,
            ),
        )
        .route(
            "/analytics/top-categories",
            layers.query_cached(
                get(analytics::top_categories),
                prefix::ANALYTICS_TOP_CATEGORIES,
                ttl::ANALYTICS_TOP_CATEGORIES,
            ),
        )
        .route(
            "/analytics/categories",
            layers.query_cached(
                get(analytics::categories),
                prefix::ANALYTICS_CATEGORIES,
                ttl::ANALYTICS_CATEGORIES,
            ),
        )
        .route("/analytics/export", get(analytics::export))
        // Route layers wrap the cache layers: the user is known before any lookup
        .route_layer(from_fn_with_state(state.clone(), authentication_middleware));

    public.merge(protected)
}

/// Family patterns plus the detail entry of the record named by `{id}`.
fn with_record<const N: usize>(patterns: [&'static str; N]) -> Vec<InvalidationPattern> {
    patterns
        .into_iter()
        .map(InvalidationPattern::from)
        .chain([InvalidationPattern::record(prefix::TRANSACTION_DETAIL, "id")])
        .collect()
}

/// Builds the cache layers for one router, sharing its store and limits.
struct Layers<'a> {
    state: &'a AppState,
}

impl<'a> Layers<'a> {
    fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    fn cached(
        &self,
        route: MethodRouter<AppState>,
        prefix: &'static str,
        ttl: Duration,
    ) -> CachedRoute {
        let cache = ResponseCache::new(self.state.store.clone(), prefix, ttl)
            .max_body_bytes(self.state.config.cache.max_cacheable_body_bytes);
        CachedRoute { route, cache }
    }

    fn query_cached(
        &self,
        route: MethodRouter<AppState>,
        prefix: &'static str,
        ttl: Duration,
    ) -> MethodRouter<AppState> {
        self.cached(route, prefix, ttl)
            .key(keys::query_key(prefix))
            .finish()
    }

    fn invalidating<I, P>(&self, route: MethodRouter<AppState>, patterns: I) -> MethodRouter<AppState>
    where
        I: IntoIterator<Item = P>,
        P: Into<InvalidationPattern>,
    {
        let invalidation = CacheInvalidation::new(self.state.store.clone(), patterns);
        route.layer(from_fn_with_state(invalidation, invalidate_cache))
    }
}

struct CachedRoute {
    route: MethodRouter<AppState>,
    cache: ResponseCache,
}

impl CachedRoute {
    fn key(mut self, key_fn: KeyFn) -> Self {
        self.cache = self.cache.with_key(key_fn);
        self
    }

    fn finish(self) -> MethodRouter<AppState> {
        self.route
            .layer(from_fn_with_state(self.cache, cache_response))
    }
}
