use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use storyloom_db::models::{CollaboratorRow, CommentRow, StoryRow, UserRow};
use storyloom_types::models::{Collaborator, Comment, Story, User};

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone; they
/// are UTC.
fn timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn user(row: UserRow) -> User {
    User {
        id: row.id,
        username: row.username,
        email: row.email,
        created_at: timestamp(&row.created_at),
    }
}

pub fn story(row: StoryRow) -> Story {
    Story {
        id: row.id,
        title: row.title,
        content: row.content,
        author_id: row.author_id,
        is_public: row.is_public,
        created_at: timestamp(&row.created_at),
        updated_at: timestamp(&row.updated_at),
        author_username: row.author_username,
        author_email: row.author_email,
    }
}

pub fn collaborator(row: CollaboratorRow) -> Collaborator {
    Collaborator {
        story_id: row.story_id,
        user_id: row.user_id,
        role: row.role,
        added_at: timestamp(&row.added_at),
        username: row.username,
        email: row.email,
    }
}

pub fn comment(row: CommentRow) -> Comment {
    Comment {
        id: row.id,
        story_id: row.story_id,
        user_id: row.user_id,
        content: row.content,
        created_at: timestamp(&row.created_at),
        username: row.username,
        email: row.email,
    }
}
