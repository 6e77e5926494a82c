use std::convert::Infallible;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use storyloom_types::api::Claims;

use crate::error::{ApiError, FieldErrors};

/// `Json<T>` whose rejection is a validation error in the usual envelope
/// instead of axum's plain-text body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(body_error(rejection.body_text())),
        }
    }
}

/// Type a body taken as `ApiJson<Value>`. Story handlers call this after the
/// access check; a mismatch is reported on field `body`.
pub fn typed_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|e| body_error(e.to_string()))
}

fn body_error(message: String) -> ApiError {
    let mut errors = FieldErrors::new();
    errors.insert("body".to_string(), vec![message]);
    ApiError::Validation(errors)
}

/// The caller's user id, taken from claims verified by
/// [`require_auth`](crate::middleware::require_auth). `None` when the request
/// carries no verified claims; handlers pass it on explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal(pub Option<i64>);

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<Claims>().map(|claims| claims.sub)))
    }
}
