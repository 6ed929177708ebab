pub mod auth;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;

pub use cache::{CacheStore, DynCacheStore, MemoryStore, RedisStore, create_cache_store};
pub use config::{AppConfig, CacheConfig, RedisConfig, ServerConfig};
pub use error::ApiError;
pub use ledger::Ledger;
pub use observability::init_tracing;
pub use server::{AppState, FintrackServer, ServerBuilder, build_app};
