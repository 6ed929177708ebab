//! Sign-in state on top of [`CachedApi`].
//!
//! Every change of identity clears the response cache first, so nothing
//! read by one user is served to the next.

use std::time::Duration;

use serde_json::{Value, json};

use crate::cache::GetOptions;
use crate::cached_api::CachedApi;
use crate::error::{ClientError, Result};

const PROFILE_PATH: &str = "/auth/profile";
const PROFILE_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct Session {
    api: CachedApi,
}

impl Session {
    pub fn new(api: CachedApi) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &CachedApi {
        &self.api
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.api().token().is_some()
    }

    /// Exchange credentials for a token. Returns the signed-in user.
    pub async fn login(&self, email: &str, password: &str) -> Result<Value> {
        self.api.clear_cache(None);
        let body = self
            .api
            .post("/auth/login", &json!({ "email": email, "password": password }))
            .await?;
        let token = body
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::UnexpectedResponse("login returned no token".into()))?;
        self.api.api().set_token(Some(token.to_string()));
        tracing::info!(email, "Logged in");
        Ok(body.get("user").cloned().unwrap_or(Value::Null))
    }

    /// The signed-in user's profile, cached for 30 seconds.
    pub async fn load_user(&self, force_refresh: bool) -> Result<Value> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }
        let body = self
            .api
            .get(
                PROFILE_PATH,
                GetOptions::ttl(PROFILE_TTL).force_refresh(force_refresh),
            )
            .await?;
        Ok(body.get("user").cloned().unwrap_or(Value::Null))
    }

    /// Install a token obtained elsewhere (an OAuth redirect) and load the
    /// user it belongs to. A token the server rejects is dropped again.
    pub async fn adopt_token(&self, token: &str) -> Result<Value> {
        self.api.clear_cache(None);
        self.api.api().set_token(Some(token.to_string()));
        match self.load_user(true).await {
            Ok(user) => Ok(user),
            Err(e) => {
                self.api.api().set_token(None);
                Err(e)
            }
        }
    }

    /// Always ends signed out, whether or not the server call succeeds.
    pub async fn logout(&self) {
        self.api.clear_cache(None);
        if self.is_authenticated() {
            if let Err(e) = self.api.post("/auth/logout", &Value::Null).await {
                tracing::warn!(error = %e, "Logout request failed");
            }
        }
        self.api.api().set_token(None);
    }
}
