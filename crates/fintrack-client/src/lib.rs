//! Client for the FinTrack API.
//!
//! [`ApiClient`] is a thin `reqwest` wrapper. [`CachedApi`] puts a
//! short-lived per-URL cache in front of its reads.
//!
//! [`Session`] owns the access token and clears the cache whenever the
//! signed-in user changes.

pub mod api;
pub mod cache;
pub mod cached_api;
pub mod dashboard;
pub mod error;
pub mod session;

pub use api::ApiClient;
pub use cache::{ClientCache, GetOptions};
pub use cached_api::CachedApi;
pub use dashboard::Dashboard;
pub use error::{ClientError, Result};
pub use session::Session;
