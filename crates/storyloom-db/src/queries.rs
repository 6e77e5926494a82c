use crate::Database;
use crate::models::{CollaboratorRow, CommentRow, StoryRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row, types::Type};
use storyloom_policy::{StoryAccess, StoryAccessSource};
use storyloom_types::models::Role;

/// A write hit a UNIQUE constraint. `field` names the colliding column.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unique constraint violated on {field}")]
pub struct UniqueViolation {
    pub field: &'static str,
}

/// A write referenced a row that does not exist (a vanished user or story).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("foreign key constraint violated")]
pub struct ForeignKeyViolation;

/// Partial story update; `None` leaves a column untouched.
#[derive(Debug, Default, Clone)]
pub struct StoryChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_public: Option<bool>,
}

const STORY_COLUMNS: &str = "s.id, s.title, s.content, s.author_id, s.is_public, s.created_at, s.updated_at,
     u.username, u.email";

impl Database {
    // -- Users --

    /// Insert a user. A duplicate username or email surfaces as a
    /// [`UniqueViolation`] inside the returned error.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password_hash) VALUES (?1, ?2, ?3)",
                (username, email, password_hash),
            )
            .map_err(classify_constraint)?;
            let id = conn.last_insert_rowid();
            query_user(conn, "id = ?1", id)?
                .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    // -- Stories --

    /// Stories the user wrote, collaborates on, or that are public. Newest
    /// update first.
    pub fn list_visible_stories(&self, user_id: i64) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {STORY_COLUMNS}
                 FROM stories s
                 JOIN users u ON s.author_id = u.id
                 WHERE s.author_id = ?1
                    OR s.is_public = 1
                    OR EXISTS (SELECT 1 FROM collaborators c WHERE c.story_id = s.id AND c.user_id = ?1)
                 ORDER BY s.updated_at DESC, s.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], story_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_story(&self, id: i64) -> Result<Option<StoryRow>> {
        self.with_conn(|conn| query_story(conn, id))
    }

    pub fn create_story(
        &self,
        author_id: i64,
        title: &str,
        content: &str,
        is_public: bool,
    ) -> Result<StoryRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO stories (title, content, author_id, is_public) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![title, content, author_id, is_public],
            )
            .map_err(classify_constraint)?;
            let id = conn.last_insert_rowid();
            query_story(conn, id)?.ok_or_else(|| anyhow::anyhow!("story {} vanished after insert", id))
        })
    }

    /// Apply `changes` and bump `updated_at`. Returns `None` if the story is gone.
    pub fn update_story(&self, id: i64, changes: &StoryChanges) -> Result<Option<StoryRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE stories
                 SET title = COALESCE(?1, title),
                     content = COALESCE(?2, content),
                     is_public = COALESCE(?3, is_public),
                     updated_at = datetime('now')
                 WHERE id = ?4",
                rusqlite::params![changes.title, changes.content, changes.is_public, id],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            let row = query_story(&tx, id)?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Delete a story; collaborators and comments go with it.
    pub fn delete_story(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM stories WHERE id = ?1", [id])? > 0))
    }

    // -- Collaborators --

    /// Add a collaborator, or change the role of an existing one. Never
    /// produces a second row for the same (story, user) pair.
    pub fn upsert_collaborator(&self, story_id: i64, user_id: i64, role: Role) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO collaborators (story_id, user_id, role) VALUES (?1, ?2, ?3)
                 ON CONFLICT (story_id, user_id) DO UPDATE SET role = excluded.role",
                rusqlite::params![story_id, user_id, role.as_str()],
            )
            .map_err(classify_constraint)?;
            Ok(())
        })
    }

    pub fn remove_collaborator(&self, story_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM collaborators WHERE story_id = ?1 AND user_id = ?2",
                [story_id, user_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn list_collaborators(&self, story_id: i64) -> Result<Vec<CollaboratorRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.story_id, c.user_id, c.role, c.added_at, u.username, u.email
                 FROM collaborators c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.story_id = ?1
                 ORDER BY c.added_at, c.user_id",
            )?;
            let rows = stmt
                .query_map([story_id], |row| {
                    Ok(CollaboratorRow {
                        story_id: row.get(0)?,
                        user_id: row.get(1)?,
                        role: role_from_column(row, 2)?,
                        added_at: row.get(3)?,
                        username: row.get(4)?,
                        email: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    pub fn list_comments(&self, story_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.story_id, c.user_id, c.content, c.created_at, u.username, u.email
                 FROM comments c
                 JOIN users u ON c.user_id = u.id
                 WHERE c.story_id = ?1
                 ORDER BY c.created_at DESC, c.id DESC",
            )?;
            let rows = stmt
                .query_map([story_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_comment(&self, story_id: i64, user_id: i64, content: &str) -> Result<CommentRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (story_id, user_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![story_id, user_id, content],
            )
            .map_err(classify_constraint)?;
            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                "SELECT c.id, c.story_id, c.user_id, c.content, c.created_at, u.username, u.email
                 FROM comments c
                 LEFT JOIN users u ON c.user_id = u.id
                 WHERE c.id = ?1",
                [id],
                comment_from_row,
            )?;
            Ok(row)
        })
    }

    /// Author of a comment, or `None` if no such comment exists.
    pub fn get_comment_author(&self, id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT user_id FROM comments WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM comments WHERE id = ?1", [id])? > 0))
    }
}

impl StoryAccessSource for Database {
    /// Story row plus the principal's role, in one LEFT JOIN.
    fn story_access(&self, story_id: i64, principal_id: i64) -> Result<Option<StoryAccess>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT s.id, s.author_id, s.is_public, c.role
                 FROM stories s
                 LEFT JOIN collaborators c ON s.id = c.story_id AND c.user_id = ?1
                 WHERE s.id = ?2",
                [principal_id, story_id],
                |row| {
                    let role = match row.get::<_, Option<String>>(3)? {
                        Some(_) => Some(role_from_column(row, 3)?),
                        None => None,
                    };
                    Ok(StoryAccess {
                        story_id: row.get(0)?,
                        author_id: row.get(1)?,
                        is_public: row.get(2)?,
                        role,
                    })
                },
            )
            .optional()
        })
    }
}

fn query_user<P: rusqlite::ToSql>(conn: &Connection, predicate: &str, value: P) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password_hash, created_at FROM users WHERE {predicate}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_story(conn: &Connection, id: i64) -> Result<Option<StoryRow>> {
    let sql = format!(
        "SELECT {STORY_COLUMNS}
         FROM stories s
         LEFT JOIN users u ON s.author_id = u.id
         WHERE s.id = ?1"
    );
    conn.query_row(&sql, [id], story_from_row).optional()
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    Ok(StoryRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        author_id: row.get(3)?,
        is_public: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        author_username: row.get(7)?,
        author_email: row.get(8)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        user_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        username: row.get(5)?,
        email: row.get(6)?,
    })
}

fn role_from_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Role> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Turn SQLite's UNIQUE and FOREIGN KEY failures into [`UniqueViolation`] and
/// [`ForeignKeyViolation`]; anything else passes through untouched.
fn classify_constraint(err: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(ffi_err, msg) = &err {
        match ffi_err.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                let field = if msg.as_deref().is_some_and(|m| m.contains("email")) {
                    "email"
                } else {
                    "username"
                };
                return UniqueViolation { field }.into();
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return ForeignKeyViolation.into(),
            _ => {}
        }
    }
    err.into()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
