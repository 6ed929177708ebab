use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Token signing configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Bootstrap configuration (users seeded on startup)
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be > 0".into()));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.body_limit_bytes must be > 0".into(),
            ));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "auth.jwt_secret must be set (FINTRACK__AUTH__JWT_SECRET or JWT_SECRET)".into(),
            ));
        }
        if self.redis.enabled {
            if self.redis.url.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "redis.url must not be empty when redis.enabled=true".into(),
                ));
            }
            if self.redis.max_retries_per_request == 0 {
                return Err(ConfigError::Invalid(
                    "redis.max_retries_per_request must be > 0".into(),
                ));
            }
            if self.redis.reconnect_step_ms > self.redis.reconnect_max_delay_ms {
                return Err(ConfigError::Invalid(
                    "redis.reconnect_step_ms must be <= redis.reconnect_max_delay_ms".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Origin allowed by CORS (the single-page front-end).
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    5000
}
fn default_body_limit() -> usize {
    10 * 1024 * 1024
}
fn default_cors_origin() -> String {
    "http://localhost:3000".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            cors_origin: default_cors_origin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Redis connection settings for the response cache store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Use Redis as the cache store. When false an in-process store is used.
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://:password@localhost:6379/0")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Timeout for establishing a connection, in milliseconds
    #[serde(default = "default_redis_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single command attempt, in milliseconds
    #[serde(default = "default_redis_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Attempts per operation before it is reported as failed
    #[serde(default = "default_redis_max_retries")]
    pub max_retries_per_request: usize,

    /// Reconnect delay grows by this step per attempt, in milliseconds
    #[serde(default = "default_redis_reconnect_step_ms")]
    pub reconnect_step_ms: u64,

    /// Upper bound for the reconnect delay, in milliseconds
    #[serde(default = "default_redis_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Reconnect attempts after an established connection drops
    #[serde(default = "default_redis_reconnect_retries")]
    pub reconnect_retries: usize,
}

fn default_redis_enabled() -> bool {
    true
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_connect_timeout_ms() -> u64 {
    5000
}

fn default_redis_response_timeout_ms() -> u64 {
    2000
}

fn default_redis_max_retries() -> usize {
    3
}

fn default_redis_reconnect_step_ms() -> u64 {
    1000
}

fn default_redis_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_redis_reconnect_retries() -> usize {
    6
}

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Delay before reconnect attempt `attempt` (1-based): step × attempt, capped.
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let delay = self
            .reconnect_step_ms
            .saturating_mul(u64::from(attempt.max(1)))
            .min(self.reconnect_max_delay_ms);
        Duration::from_millis(delay)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            connect_timeout_ms: default_redis_connect_timeout_ms(),
            response_timeout_ms: default_redis_response_timeout_ms(),
            max_retries_per_request: default_redis_max_retries(),
            reconnect_step_ms: default_redis_reconnect_step_ms(),
            reconnect_max_delay_ms: default_redis_reconnect_max_delay_ms(),
            reconnect_retries: default_redis_reconnect_retries(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Max entries held by the in-process store (Redis disabled)
    #[serde(default = "default_local_cache_max_entries")]
    pub local_cache_max_entries: usize,

    /// TTL applied by the store when a caller passes a zero TTL
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Responses larger than this are served but never cached
    #[serde(default = "default_max_cacheable_body_bytes")]
    pub max_cacheable_body_bytes: usize,
}

fn default_local_cache_max_entries() -> usize {
    10000
}

fn default_ttl_secs() -> u64 {
    600 // 10 minutes
}

fn default_max_cacheable_body_bytes() -> usize {
    1024 * 1024
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_cache_max_entries: default_local_cache_max_entries(),
            default_ttl_secs: default_ttl_secs(),
            max_cacheable_body_bytes: default_max_cacheable_body_bytes(),
        }
    }
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for HS256 access tokens
    #[serde(default)]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_token_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl AuthConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

/// Bootstrap configuration for initial server setup
///
/// Registration over HTTP is disabled, so accounts are seeded here:
///
/// ```toml
/// [[bootstrap.users]]
/// name = "Asha"
/// email = "asha@example.com"
/// password = "Secret123"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub users: Vec<BootstrapUser>,
}

/// An account created on startup if its email is not registered yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapUser {
    pub name: String,
    pub email: String,
    /// Plain text password (hashed before storage)
    pub password: String,
}

pub mod loader {
    use super::{AppConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("fintrack.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., FINTRACK__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("FINTRACK")
                .try_parsing(true)
                .separator("__"),
        );
        // Conventional single-variable overrides used by hosting platforms
        builder = builder
            .set_override_option("redis.url", non_empty_env("REDIS_URL"))?
            .set_override_option("auth.jwt_secret", non_empty_env("JWT_SECRET"))?
            .set_override_option("server.port", non_empty_env("PORT"))?;

        let merged: AppConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }

    fn non_empty_env(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}
