use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Collaborator, Comment, Story, User};

// -- JWT Claims --

/// Claims carried by both access and refresh tokens. The two token classes are
/// told apart by the secret they are signed with, not by their payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub exp: usize,
}

// -- Envelope --

/// JSON envelope wrapped around every response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

impl<T> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            errors: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Envelope<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            error: None,
            errors: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
            errors: None,
        }
    }
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

// -- Stories --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStoryRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryResponse {
    pub story: Story,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoriesResponse {
    pub stories: Vec<Story>,
}

/// A story together with everyone it is shared with.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoryDetail {
    #[serde(flatten)]
    pub story: Story,
    pub collaborators: Vec<Collaborator>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryDetailResponse {
    pub story: StoryDetail,
}

// -- Collaborators --

/// `role` stays a raw string here so an out-of-set value is reported as a
/// field validation error rather than a body decode failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaboratorRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

// -- Comments --

#[derive(Debug, Default, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentsResponse {
    pub comments: Vec<Comment>,
}

// -- Health --

#[derive(Debug, Serialize, Deserialize)]
/// Liveness reply. Unlike the other replies the timestamp sits beside
/// `success` rather than under `data`.
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HealthResponse {
    pub fn now() -> Self {
        Self {
            success: true,
            message: "Server is running".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }
}
