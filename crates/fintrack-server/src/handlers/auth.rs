use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use serde_json::{Value, json};

use super::Checks;
use crate::auth::{AuthUser, verify_password};
use crate::error::ApiError;
use crate::ledger::{Profile, ProfileUpdate};
use crate::middleware::AUTH_COOKIE;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    pub name: Option<String>,
    pub preferences: Option<PreferencesBody>,
}

#[derive(Debug, Deserialize)]
pub struct PreferencesBody {
    pub currency: Option<String>,
    pub timezone: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<(CookieJar, Json<Value>), ApiError> {
    let Json(body) = body?;

    let mut checks = Checks::default();
    let email = body.email.as_deref().map(str::trim).unwrap_or_default();
    if !looks_like_email(email) {
        checks.fail("email", "Please provide a valid email");
    }
    let password = body.password.as_deref().unwrap_or_default();
    if password.is_empty() {
        checks.fail("password", "Password is required");
    }
    checks.finish()?;

    let user = state
        .ledger
        .user_by_email(email)
        .filter(|user| verify_password(password, &user.password_hash))
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let token = state.jwt.issue(user.id)?;
    tracing::info!(user_id = %user.id, "User logged in");

    let cookie = Cookie::build((AUTH_COOKIE, token.clone()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build();

    Ok((
        jar.add(cookie),
        Json(json!({
            "message": "Login successful",
            "token": token,
            "user": Profile::from(&user),
        })),
    ))
}

/// Password sign-up is closed; accounts come from bootstrap configuration.
pub async fn register() -> ApiError {
    ApiError::forbidden("Direct registration is disabled.")
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let user = state
        .ledger
        .user(user.id)
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(json!({ "user": Profile::from(&user) })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<ProfileBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;

    let mut checks = Checks::default();
    let mut update = ProfileUpdate::default();
    if body.name.is_some() {
        update.name = checks.text("name", body.name.as_deref(), 1, 50);
    }
    if let Some(prefs) = body.preferences {
        if let Some(currency) = prefs.currency.map(|c| c.trim().to_ascii_uppercase()) {
            if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
                update.currency = Some(currency);
            } else {
                checks.fail("preferences.currency", "currency must be a 3-letter code");
            }
        }
        if let Some(timezone) = prefs.timezone.map(|t| t.trim().to_string()) {
            if timezone.is_empty() {
                checks.fail("preferences.timezone", "timezone must not be empty");
            } else {
                update.timezone = Some(timezone);
            }
        }
    }
    checks.finish()?;

    let profile = state.ledger.update_profile(user.id, update)?;
    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": profile,
    })))
}

/// Tokens are stateless: logging out clears the cookie, and the route's
/// invalidation layer drops the cached profile.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<Value>) {
    (
        jar.remove(Cookie::build(AUTH_COOKIE).path("/")),
        Json(json!({ "message": "Logout successful" })),
    )
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::looks_like_email;

    #[test]
    fn email_shape() {
        assert!(looks_like_email("asha@example.com"));
        assert!(!looks_like_email("asha@example"));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("asha example@x.com"));
    }
}
