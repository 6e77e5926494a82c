use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::tokens::{KeyClass, TokenError};

/// Extract and validate the access token from the Authorization header and
/// attach its claims to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthenticated(
            "Authentication required. Please provide a valid token.",
        ))?;

    let claims = state.tokens.verify(token, KeyClass::Access).map_err(|e| {
        debug!("Rejected access token: {}", e);
        match e {
            TokenError::Expired => ApiError::Unauthenticated("Token expired. Please refresh your token."),
            TokenError::Invalid => ApiError::Unauthenticated("Invalid token. Please login again."),
        }
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
