//! HTTP surface of Storyloom: token and credential services, request
//! interceptors, and the route handlers that consult the access policy before
//! touching the repositories.

pub mod auth;
pub mod comments;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod interceptors;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod stories;
pub mod tokens;
pub mod validation;

mod convert;

#[cfg(test)]
mod test_support;

use tracing::error;

use crate::error::ApiError;

/// Run blocking work (SQLite, Argon2) off the async runtime.
pub(crate) async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::from(anyhow::Error::new(e))
    })?
}
