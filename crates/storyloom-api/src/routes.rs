use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};

use storyloom_types::api::HealthResponse;

use crate::auth::{self, AppState};
use crate::error::ApiError;
use crate::interceptors::{self, InterceptorConfig};
use crate::middleware::require_auth;
use crate::rate_limit::{self, RateLimiter};
use crate::{comments, stories};

/// The complete application: every route, the auth gate on protected routes,
/// and the interceptor chain around all of it.
pub fn router(state: AppState, config: &InterceptorConfig) -> Router {
    let auth_limiter = Arc::new(RateLimiter::auth());

    let credential_routes = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            auth_limiter,
            rate_limit::enforce,
        ));

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/auth/refresh", post(auth::refresh));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route(
            "/api/stories",
            get(stories::list_stories).post(stories::create_story),
        )
        .route(
            "/api/stories/{id}",
            get(stories::get_story)
                .put(stories::update_story)
                .patch(stories::update_story)
                .delete(stories::delete_story),
        )
        .route(
            "/api/stories/{id}/collaborators",
            post(stories::add_collaborator),
        )
        .route(
            "/api/stories/{id}/collaborators/{user_id}",
            delete(stories::remove_collaborator),
        )
        .route(
            "/api/stories/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route("/api/comments/{id}", delete(comments::delete_comment))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = Router::new()
        .merge(credential_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(fallback)
        .with_state(state);

    interceptors::wrap(app, config)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse::now())
}

async fn fallback() -> ApiError {
    ApiError::NotFound("Route not found")
}
