//! Cache key scheme shared by the read path and the invalidation layer.
//!
//! ## Key Format
//!
//! `{prefix}:{scope}:{qualifier}`, e.g. `transactions:6f1c…:limit=5`
//!
//! - `prefix` names the resource family (see [`prefix`]); it may itself
//!   contain colons (`analytics:summary`).
//! - `scope` is the acting user's id, or `guest` for anonymous requests.
//! - `qualifier` carries whatever distinguishes one result from another
//!   (canonical query string, record id, or the full request path).
//!
//! Invalidation patterns are written against the same format, so any change
//! here must be mirrored in the patterns declared in `routes`.

use std::fmt;
use std::sync::Arc;

use axum::extract::{FromRequestParts, OriginalUri, RawPathParams};
use axum::http::request::Parts;

use super::store::escape_glob;
use crate::auth::AuthUser;

/// Scope used when no authenticated user is attached to the request.
pub const GUEST_SCOPE: &str = "guest";

/// Qualifier for a request without query parameters.
pub const DEFAULT_QUALIFIER: &str = "default";

/// Placeholder replaced by the acting user's id in invalidation templates.
pub const USER_PLACEHOLDER: &str = "{userId}";

/// Resource family prefixes.
pub mod prefix {
    pub const AUTH_PROFILE: &str = "auth:profile";
    pub const CATEGORIES: &str = "categories";
    pub const TRANSACTIONS: &str = "transactions";
    pub const TRANSACTION_DETAIL: &str = "transaction:detail";
    pub const P2P: &str = "p2p";
    pub const P2P_SUMMARY: &str = "p2p:summary";
    pub const ANALYTICS_SUMMARY: &str = "analytics:summary";
    pub const ANALYTICS_BY_CATEGORY: &str = "analytics:by-category";
    pub const ANALYTICS_BY_DATE: &str = "analytics:by-date";
    pub const ANALYTICS_TOP_CATEGORIES: &str = "analytics:top-categories";
    pub const ANALYTICS_CATEGORIES: &str = "analytics:categories";
}

/// Time-to-live per resource family.
pub mod ttl {
    use std::time::Duration;

    const MINUTE: u64 = 60;

    pub const AUTH_PROFILE: Duration = Duration::from_secs(2 * MINUTE);
    pub const CATEGORIES: Duration = Duration::from_secs(60 * MINUTE);
    pub const TRANSACTIONS: Duration = Duration::from_secs(5 * MINUTE);
    pub const TRANSACTION_DETAIL: Duration = Duration::from_secs(5 * MINUTE);
    pub const P2P: Duration = Duration::from_secs(5 * MINUTE);
    pub const P2P_SUMMARY: Duration = Duration::from_secs(5 * MINUTE);
    pub const ANALYTICS: Duration = Duration::from_secs(5 * MINUTE);
    pub const ANALYTICS_TOP_CATEGORIES: Duration = Duration::from_secs(10 * MINUTE);
    pub const ANALYTICS_CATEGORIES: Duration = Duration::from_secs(60 * MINUTE);
}

/// A rendered cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// `prefix:scope:qualifier`
    pub fn new(prefix: &str, scope: &str, qualifier: &str) -> Self {
        Self(format!("{prefix}:{scope}:{qualifier}"))
    }

    /// `prefix:scope`, for resources with a single result per user.
    pub fn scoped(prefix: &str, scope: &str) -> Self {
        Self(format!("{prefix}:{scope}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of a query string.
///
/// Pairs are decoded, sorted and re-encoded so that `?b=2&a=1` and
/// `?a=1&b=2` share a key while any difference in names or values still
/// produces a different key. Empty queries map to [`DEFAULT_QUALIFIER`].
pub fn query_qualifier(query: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    if pairs.is_empty() {
        return DEFAULT_QUALIFIER.to_string();
    }
    pairs.sort();
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// What the cache layers know about a request.
#[derive(Debug, Clone, Default)]
pub struct CacheRequest {
    pub user_id: Option<String>,
    pub path: String,
    pub query: Option<String>,
    pub params: Vec<(String, String)>,
}

impl CacheRequest {
    /// Capture user, path, query and matched path parameters.
    ///
    /// Must run inside a matched route (a `MethodRouter` layer) for path
    /// parameters to be present.
    pub async fn from_parts(parts: &mut Parts) -> Self {
        let user_id = parts
            .extensions
            .get::<AuthUser>()
            .map(|user| user.id.to_string());
        let params = match RawPathParams::from_request_parts(parts, &()).await {
            Ok(raw) => raw
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            Err(_) => Vec::new(),
        };
        // Nested routers see a stripped URI; keys use the path the client sent
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or(&parts.uri);
        Self {
            user_id,
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            params,
        }
    }

    /// User id, or [`GUEST_SCOPE`].
    pub fn scope(&self) -> &str {
        self.user_id.as_deref().unwrap_or(GUEST_SCOPE)
    }

    /// Request path including the raw query string.
    pub fn full_path(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{q}", self.path),
            _ => self.path.clone(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First decoded value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn query_qualifier(&self) -> String {
        query_qualifier(self.query.as_deref())
    }
}

/// Derives a cache key from a request.
pub type KeyFn = Arc<dyn Fn(&CacheRequest) -> CacheKey + Send + Sync>;

/// `prefix:userId:canonicalQuery`, used by list and analytics endpoints.
pub fn query_key(prefix: &'static str) -> KeyFn {
    Arc::new(move |req: &CacheRequest| CacheKey::new(prefix, req.scope(), &req.query_qualifier()))
}

/// `prefix:userId:<path param>`, used by single-record endpoints.
pub fn record_key(prefix: &'static str, param: &'static str) -> KeyFn {
    Arc::new(move |req: &CacheRequest| {
        CacheKey::new(prefix, req.scope(), req.param(param).unwrap_or(DEFAULT_QUALIFIER))
    })
}

/// `prefix:userId`, used by per-user singletons such as the profile.
pub fn user_key(prefix: &'static str) -> KeyFn {
    Arc::new(move |req: &CacheRequest| CacheKey::scoped(prefix, req.scope()))
}

/// `prefix:userId:<query param or fallback>`.
pub fn query_param_key(prefix: &'static str, param: &'static str, fallback: &'static str) -> KeyFn {
    Arc::new(move |req: &CacheRequest| {
        let value = req
            .query_param(param)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        CacheKey::new(prefix, req.scope(), &value)
    })
}

/// Key used when a route declares no generator: `prefix:userId:fullPath`.
pub fn default_key(prefix: &str, req: &CacheRequest) -> CacheKey {
    CacheKey::new(prefix, req.scope(), &req.full_path())
}

/// A family of keys to delete after a successful mutation.
#[derive(Clone)]
pub enum InvalidationPattern {
    /// Glob template; [`USER_PLACEHOLDER`] is replaced with the acting user.
    Template(String),
    /// Pattern computed from the request at dispatch time, for targets
    /// such as a single record addressed by a path parameter.
    FromRequest(Arc<dyn Fn(&CacheRequest) -> String + Send + Sync>),
}

impl InvalidationPattern {
    pub fn template(pattern: impl Into<String>) -> Self {
        Self::Template(pattern.into())
    }

    pub fn from_request(f: impl Fn(&CacheRequest) -> String + Send + Sync + 'static) -> Self {
        Self::FromRequest(Arc::new(f))
    }

    /// `prefix:userId:<path param>` for the acting user, or every user's
    /// entries under `prefix` when the parameter is missing.
    pub fn record(prefix: &'static str, param: &'static str) -> Self {
        Self::from_request(move |req| match req.param(param) {
            Some(id) => format!(
                "{prefix}:{}:{}",
                escape_glob(req.scope()),
                escape_glob(id)
            ),
            None => format!("{prefix}:*"),
        })
    }

    /// Concrete glob for this request.
    ///
    /// Without an authenticated user the placeholder widens to `*`, so the
    /// pattern never covers less than intended.
    pub fn resolve(&self, req: &CacheRequest) -> String {
        match self {
            Self::Template(template) if template.contains(USER_PLACEHOLDER) => {
                let user = req
                    .user_id
                    .as_deref()
                    .map(escape_glob)
                    .unwrap_or_else(|| "*".to_string());
                template.replace(USER_PLACEHOLDER, &user)
            }
            Self::Template(template) => template.clone(),
            Self::FromRequest(f) => f(req),
        }
    }
}

impl fmt::Debug for InvalidationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::FromRequest(_) => f.write_str("FromRequest(<fn>)"),
        }
    }
}

impl From<&str> for InvalidationPattern {
    fn from(pattern: &str) -> Self {
        Self::template(pattern)
    }
}
