//! Layers wrapped around the whole router, outermost first: request tracing,
//! CORS, security headers, the general rate limiter, and the body size cap.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::rate_limit::{self, RateLimiter};

/// Maximum accepted request body, JSON or otherwise.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

const DEV_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; style-src 'self' 'unsafe-inline'; script-src 'self'; img-src 'self' data: https:";
const STRICT_TRANSPORT_SECURITY: &str = "max-age=31536000; includeSubDomains; preload";

#[derive(Debug, Clone)]
pub struct InterceptorConfig {
    /// Origins allowed to make credentialed cross-origin requests.
    pub allowed_origins: Vec<String>,
}

impl InterceptorConfig {
    /// The local dev origins plus the deployed frontend, if one is configured.
    pub fn new(frontend_url: Option<&str>) -> Self {
        let mut allowed_origins: Vec<String> = DEV_ORIGINS.iter().map(|o| o.to_string()).collect();
        if let Some(url) = frontend_url.map(|u| u.trim_end_matches('/')) {
            if !url.is_empty() && !allowed_origins.iter().any(|o| o == url) {
                allowed_origins.push(url.to_string());
            }
        }
        Self { allowed_origins }
    }
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unusable CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

fn security_headers() -> [(HeaderName, HeaderValue); 5] {
    [
        (
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ),
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(STRICT_TRANSPORT_SECURITY),
        ),
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
    ]
}

/// Apply the interceptor chain to a fully routed app.
pub fn wrap(app: Router, config: &InterceptorConfig) -> Router {
    let general = Arc::new(RateLimiter::general());

    let mut app = app
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(middleware::from_fn_with_state(general, rate_limit::enforce));

    for (name, value) in security_headers() {
        app = app.layer(SetResponseHeaderLayer::overriding(name, value));
    }

    app.layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}
