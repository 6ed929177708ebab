use axum::extract::State;
use axum::response::IntoResponse;
use axum::{
    Json,
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{AuthError, AuthUser};
use crate::server::AppState;

/// Cookie that carries the access token for browser sessions.
pub const AUTH_COOKIE: &str = "auth_token";

// =============================================================================
// Authentication Middleware
// =============================================================================

/// Validates the access token and injects [`AuthUser`].
///
/// The token is taken from `Authorization: Bearer <token>`, or from the
/// `auth_token` cookie when the header is absent. The user it names must
/// still exist. Any failure is answered with 401 and the handler never runs.
pub async fn authentication_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(&req) else {
        tracing::debug!(path = %req.uri().path(), "No access token");
        return unauthorized_response("Access denied. No token provided.");
    };

    let claims = match state.jwt.verify(&token) {
        Ok(claims) => claims,
        Err(AuthError::Expired) => return unauthorized_response("Token has expired."),
        Err(e) => {
            tracing::debug!(error = %e, "Token validation failed");
            return unauthorized_response("Token is not valid.");
        }
    };

    if state.ledger.user(claims.user_id).is_none() {
        return unauthorized_response("Token is not valid. User not found.");
    }

    req.extensions_mut().insert(AuthUser { id: claims.user_id });
    next.run(req).await
}

fn extract_token(req: &Request<Body>) -> Option<String> {
    if let Some(header) = req.headers().get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        return header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
    }
    CookieJar::from_headers(req.headers())
        .get(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [("WWW-Authenticate", "Bearer")],
        Json(json!({ "error": message })),
    )
        .into_response()
}

// =============================================================================
// Other Middleware
// =============================================================================

// Ensures each request has an X-Request-Id and mirrors it on the response
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = match req.headers().get(&header_name) {
        Some(value) => value.clone(),
        None => match HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            Ok(value) => value,
            Err(_) => return next.run(req).await,
        },
    };

    // Visible to the trace span and handlers
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}
