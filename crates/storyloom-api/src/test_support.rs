//! In-process harness for handler tests: a fresh in-memory database behind
//! the real router, driven with `oneshot`.

use std::sync::{Arc, OnceLock};

use axum::{
    Router,
    body::Body,
    http::{Method, Request, Response, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use storyloom_db::Database;

use crate::auth::{AppState, AppStateInner};
use crate::credentials;
use crate::interceptors::InterceptorConfig;
use crate::routes;
use crate::tokens::TokenService;

pub struct TestApp {
    router: Router,
    state: AppState,
}

pub struct TestUser {
    pub id: i64,
    pub token: String,
}

/// Hashing is slow in debug builds; every seeded user shares one digest.
fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| credentials::hash_password(TestApp::PASSWORD).unwrap())
}

impl TestApp {
    pub const PASSWORD: &'static str = "Passw0rdOk";

    pub fn new() -> Self {
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            tokens: TokenService::new(
                "test-access-secret",
                "test-refresh-secret",
                chrono::Duration::minutes(15),
                chrono::Duration::days(7),
            ),
            secure_cookies: false,
        });
        let router = routes::router(state.clone(), &InterceptorConfig::default());
        Self { router, state }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(req).await.unwrap()
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        self.request(Method::DELETE, uri, token, None).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn patch_json(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn post_with_cookie(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn get_with_origin(&self, uri: &str, origin: &str) -> Response<Body> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(header::ORIGIN, origin)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    /// Seed a user straight into the database and hand back an access token.
    /// Skips the auth limiter and the per-user password hash.
    pub async fn register(&self, username: &str, email: &str) -> TestUser {
        let row = self
            .state
            .db
            .create_user(username, email, password_hash())
            .unwrap();
        let token = self
            .state
            .tokens
            .issue_access_token(row.id, &row.email)
            .unwrap();
        TestUser { id: row.id, token }
    }

    /// A valid access token for a user id that need not exist.
    pub fn token_for(&self, user_id: i64, email: &str) -> String {
        self.state.tokens.issue_access_token(user_id, email).unwrap()
    }

    pub async fn create_story(&self, author: &TestUser, title: &str, is_public: bool) -> i64 {
        let res = self
            .post_json(
                "/api/stories",
                Some(&author.token),
                json!({"title": title, "content": "Once upon a time.", "isPublic": is_public}),
            )
            .await;
        assert_eq!(res.status(), 201);
        body_json(res).await["data"]["story"]["id"].as_i64().unwrap()
    }

    pub async fn add_collaborator(&self, owner: &TestUser, story: i64, user_id: i64, role: &str) {
        let res = self
            .post_json(
                &format!("/api/stories/{story}/collaborators"),
                Some(&owner.token),
                json!({"userId": user_id, "role": role}),
            )
            .await;
        assert_eq!(res.status(), 201);
    }
}

pub async fn body_json(res: Response<Body>) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
