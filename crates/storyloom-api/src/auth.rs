use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, info};

use storyloom_db::Database;
use storyloom_types::api::{
    AuthResponse, Envelope, LoginRequest, RefreshResponse, RegisterRequest, UserResponse,
};
use storyloom_types::models::User;

use crate::error::ApiError;
use crate::extract::{ApiJson, Principal};
use crate::tokens::{KeyClass, TokenService};
use crate::{blocking, convert, credentials, validation};

pub const REFRESH_COOKIE: &str = "refreshToken";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    /// Mark the refresh cookie `Secure` (production deployments).
    pub secure_cookies: bool,
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_user = validation::register(req)?;

    let db = state.clone();
    let row = blocking(move || {
        let password_hash = credentials::hash_password(&new_user.password)?;
        Ok(db
            .db
            .create_user(&new_user.username, &new_user.email, &password_hash)?)
    })
    .await?;

    let user = convert::user(row);
    info!("Registered user {} ({})", user.id, user.username);

    let (jar, body) = start_session(&state, jar, user)?;
    Ok((
        StatusCode::CREATED,
        jar,
        Json(body.with_message("Registration successful")),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let creds = validation::login(req)?;

    let db = state.clone();
    let row = blocking(move || {
        let Some(row) = db.db.get_user_by_email(&creds.email)? else {
            return Ok(None);
        };
        if credentials::verify_password(&creds.password, &row.password_hash) {
            Ok(Some(row))
        } else {
            Ok(None)
        }
    })
    .await?
    .ok_or(ApiError::Unauthenticated("Invalid email or password"))?;

    let user = convert::user(row);
    debug!("User {} logged in", user.id);

    let (jar, body) = start_session(&state, jar, user)?;
    Ok((jar, Json(body.with_message("Login successful"))))
}

/// Trade the refresh cookie for a fresh access token.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or(ApiError::Unauthenticated("Refresh token not found"))?;

    let claims = state
        .tokens
        .verify(&token, KeyClass::Refresh)
        .map_err(|_| ApiError::Unauthenticated("Invalid or expired refresh token"))?;

    let access_token = state.tokens.issue_access_token(claims.sub, &claims.email)?;

    Ok(Json(
        Envelope::data(RefreshResponse { access_token }).with_message("Token refreshed successfully"),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    // Overwrite with an already-expired cookie; `CookieJar::remove` only emits
    // a removal for cookies the request itself carried.
    let expired = Cookie::build((REFRESH_COOKIE, ""))
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    (jar.add(expired), Json(Envelope::message("Logout successful")))
}

pub async fn me(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = principal.ok_or(ApiError::Unauthenticated("Authentication required."))?;

    let db = state.clone();
    let row = blocking(move || Ok(db.db.get_user_by_id(user_id)?))
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    Ok(Json(Envelope::data(UserResponse {
        user: convert::user(row),
    })))
}

/// Issue both tokens: the access token goes in the body, the refresh token
/// only ever in the cookie.
fn start_session(
    state: &AppStateInner,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Envelope<AuthResponse>), ApiError> {
    let access_token = state.tokens.issue_access_token(user.id, &user.email)?;
    let refresh_token = state.tokens.issue_refresh_token(user.id, &user.email)?;

    let cookie = Cookie::build((REFRESH_COOKIE, refresh_token))
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Strict)
        .path("/")
        .max_age(time::Duration::seconds(state.tokens.refresh_ttl().num_seconds()))
        .build();

    Ok((
        jar.add(cookie),
        Envelope::data(AuthResponse { user, access_token }),
    ))
}
