use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;
use tracing::info;

use storyloom_policy::{AccessError, Verb, authorize_comment_delete};
use storyloom_types::api::{CommentResponse, CommentsResponse, CreateCommentRequest, Envelope};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, Principal, typed_body};
use crate::stories::authorize_story;
use crate::{blocking, convert, validation};

/// GET /api/stories/{id}/comments: newest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let access = authorize_story(&state, principal, id, Verb::Get).await?;

    let db = state.clone();
    let rows = blocking(move || Ok(db.db.list_comments(access.story_id)?)).await?;

    Ok(Json(Envelope::data(CommentsResponse {
        comments: rows.into_iter().map(convert::comment).collect(),
    })))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let access = authorize_story(&state, principal, id, Verb::Post).await?;
    let user_id = principal.ok_or(AccessError::Unauthenticated)?;
    let content = validation::comment(typed_body::<CreateCommentRequest>(body)?)?;

    let db = state.clone();
    let row =
        blocking(move || Ok(db.db.create_comment(access.story_id, user_id, &content)?)).await?;

    info!("Comment {} added to story {}", row.id, row.story_id);

    Ok((
        StatusCode::CREATED,
        Json(
            Envelope::data(CommentResponse {
                comment: convert::comment(row),
            })
            .with_message("Comment added successfully"),
        ),
    ))
}

/// DELETE /api/comments/{id}: only the comment's own author, whatever their
/// standing on the story.
pub async fn delete_comment(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = principal.ok_or(AccessError::Unauthenticated)?;
    let comment_id =
        validation::path_id(&id).ok_or(ApiError::InvalidInput("Invalid comment ID."))?;

    let db = state.clone();
    blocking(move || {
        let author_id = db
            .db
            .get_comment_author(comment_id)?
            .ok_or(ApiError::NotFound("Comment not found"))?;

        if !authorize_comment_delete(user_id, author_id).is_allowed() {
            return Err(ApiError::Forbidden("You can only delete your own comments"));
        }

        db.db.delete_comment(comment_id)?;
        Ok(())
    })
    .await?;

    Ok(Json(Envelope::message("Comment deleted successfully")))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::test_support::{TestApp, body_json};

    #[tokio::test]
    async fn editor_comments_and_everyone_with_access_reads() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let editor = app.register("editor", "editor@example.com").await;
        let viewer = app.register("viewer", "viewer@example.com").await;
        let story = app.create_story(&author, "Shared", false).await;
        app.add_collaborator(&author, story, editor.id, "editor").await;
        app.add_collaborator(&author, story, viewer.id, "viewer").await;

        let path = format!("/api/stories/{story}/comments");
        let res = app
            .post_json(&path, Some(&editor.token), json!({"content": "  Love chapter two. "}))
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = body_json(res).await;
        assert_eq!(body["message"], "Comment added successfully");
        assert_eq!(body["data"]["comment"]["content"], "Love chapter two.");
        assert_eq!(body["data"]["comment"]["userId"], editor.id);

        let res = app.get(&path, Some(&viewer.token)).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        let comments = body["data"]["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["username"], "editor");
    }

    #[tokio::test]
    async fn comments_on_unknown_story() {
        let app = TestApp::new();
        let ana = app.register("ana", "ana@example.com").await;
        let res = app.get("/api/stories/9999/comments", Some(&ana.token)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"], "Story not found.");
    }

    #[tokio::test]
    async fn story_author_cannot_delete_someone_elses_comment() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let editor = app.register("editor", "editor@example.com").await;
        let story = app.create_story(&author, "Shared", false).await;
        app.add_collaborator(&author, story, editor.id, "editor").await;

        let res = app
            .post_json(
                &format!("/api/stories/{story}/comments"),
                Some(&editor.token),
                json!({"content": "Mine"}),
            )
            .await;
        let comment = body_json(res).await["data"]["comment"]["id"].as_i64().unwrap();
        let path = format!("/api/comments/{comment}");

        let res = app.delete(&path, Some(&author.token)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(res).await["error"], "You can only delete your own comments");

        let res = app.delete(&path, Some(&editor.token)).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["message"], "Comment deleted successfully");

        let res = app.delete(&path, Some(&editor.token)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"], "Comment not found");
    }

    #[tokio::test]
    async fn bad_comment_id() {
        let app = TestApp::new();
        let ana = app.register("ana", "ana@example.com").await;
        let res = app.delete("/api/comments/nope", Some(&ana.token)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Invalid comment ID.");
    }

    #[tokio::test]
    async fn deleting_story_removes_its_comments() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let story = app.create_story(&author, "Short-lived", true).await;
        let res = app
            .post_json(
                &format!("/api/stories/{story}/comments"),
                Some(&author.token),
                json!({"content": "first"}),
            )
            .await;
        let comment = body_json(res).await["data"]["comment"]["id"].as_i64().unwrap();

        app.delete(&format!("/api/stories/{story}"), Some(&author.token)).await;

        let res = app.delete(&format!("/api/comments/{comment}"), Some(&author.token)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stranger_with_mistyped_comment_is_forbidden() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let stranger = app.register("stranger", "stranger@example.com").await;
        let story = app.create_story(&author, "Secret", false).await;

        let res = app
            .post_json(
                &format!("/api/stories/{story}/comments"),
                Some(&stranger.token),
                json!({"content": 5}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
