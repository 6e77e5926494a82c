//! Database row types. These map directly to SQLite rows and are kept
//! separate from the `storyloom-types` API models.

use storyloom_types::models::Role;

#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct StoryRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: i64,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
    pub author_username: Option<String>,
    pub author_email: Option<String>,
}

pub struct CollaboratorRow {
    pub story_id: i64,
    pub user_id: i64,
    pub role: Role,
    pub added_at: String,
    pub username: String,
    pub email: String,
}

#[derive(Debug)]
pub struct CommentRow {
    pub id: i64,
    pub story_id: i64,
    pub user_id: i64,
    pub content: String,
    pub created_at: String,
    pub username: Option<String>,
    pub email: Option<String>,
}
