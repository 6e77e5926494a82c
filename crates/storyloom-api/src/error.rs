use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use storyloom_db::{ForeignKeyViolation, UniqueViolation};
use storyloom_policy::AccessError;
use storyloom_types::api::Envelope;

/// Field name -> messages, rendered under `errors` in the response body.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Every way a request can fail. Rendered as `{success: false, error, errors?}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Outcome of a story access check, already carrying its status mapping.
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("This {field} is already registered.")]
    Conflict { field: &'static str },

    #[error("{0}")]
    TooManyRequests(&'static str),

    #[error("An unexpected error occurred. Please try again later.")]
    Unexpected(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(violation) = err.downcast_ref::<UniqueViolation>() {
            return Self::Conflict {
                field: violation.field,
            };
        }
        if err.downcast_ref::<ForeignKeyViolation>().is_some() {
            return Self::InvalidInput(
                "Invalid reference. The referenced resource does not exist.",
            );
        }
        Self::Unexpected(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Access(err) => StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidInput(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Internal detail goes to the log only.
        match &self {
            Self::Unexpected(cause) => error!("Request failed: {:#}", cause),
            Self::Access(AccessError::Unexpected(cause)) => {
                error!("Authorization error: {:#}", cause)
            }
            _ => {}
        }

        let status = self.status();
        let mut body = Envelope::failure(self.to_string());
        if let Self::Validation(errors) = self {
            body.errors = Some(errors);
        }

        (status, Json(body)).into_response()
    }
}
