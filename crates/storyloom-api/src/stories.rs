use axum::{
    Json,
    extract::{Path, State},
    http::{Method, StatusCode},
    response::IntoResponse,
};
use serde_json::Value;
use tracing::info;

use storyloom_policy::{AccessError, StoryAccess, Verb, authorize};
use storyloom_types::api::{
    AddCollaboratorRequest, CreateStoryRequest, Envelope, StoriesResponse, StoryDetail,
    StoryDetailResponse, StoryResponse, UpdateStoryRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::extract::{ApiJson, Principal, typed_body};
use crate::{blocking, convert, validation};

/// Run the access policy for `verb` on the story at `raw_story_id`. Evaluated
/// fresh on every call.
pub(crate) async fn authorize_story(
    state: &AppState,
    principal: Option<i64>,
    raw_story_id: String,
    verb: Verb,
) -> Result<StoryAccess, ApiError> {
    let db = state.clone();
    blocking(move || Ok(authorize(&db.db, principal, &raw_story_id, verb)?)).await
}

/// GET /api/stories: everything the caller may read, newest first.
pub async fn list_stories(
    State(state): State<AppState>,
    Principal(principal): Principal,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = principal.ok_or(AccessError::Unauthenticated)?;

    let db = state.clone();
    let rows = blocking(move || Ok(db.db.list_visible_stories(user_id)?)).await?;

    Ok(Json(Envelope::data(StoriesResponse {
        stories: rows.into_iter().map(convert::story).collect(),
    })))
}

/// POST /api/stories: the caller becomes the author.
pub async fn create_story(
    State(state): State<AppState>,
    Principal(principal): Principal,
    ApiJson(req): ApiJson<CreateStoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author_id = principal.ok_or(AccessError::Unauthenticated)?;
    let new_story = validation::new_story(req)?;

    let db = state.clone();
    let row = blocking(move || {
        Ok(db.db.create_story(
            author_id,
            &new_story.title,
            &new_story.content,
            new_story.is_public,
        )?)
    })
    .await?;

    info!("Story {} created by user {}", row.id, author_id);

    Ok((
        StatusCode::CREATED,
        Json(
            Envelope::data(StoryResponse {
                story: convert::story(row),
            })
            .with_message("Story created successfully"),
        ),
    ))
}

pub async fn get_story(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let access = authorize_story(&state, principal, id, Verb::Get).await?;

    let db = state.clone();
    let (row, collaborators) = blocking(move || {
        let row = db
            .db
            .get_story(access.story_id)?
            .ok_or(AccessError::NotFound)?;
        let collaborators = db.db.list_collaborators(access.story_id)?;
        Ok((row, collaborators))
    })
    .await?;

    Ok(Json(Envelope::data(StoryDetailResponse {
        story: StoryDetail {
            story: convert::story(row),
            collaborators: collaborators.into_iter().map(convert::collaborator).collect(),
        },
    })))
}

/// PUT or PATCH /api/stories/{id}: partial update by the author or an editor.
pub async fn update_story(
    State(state): State<AppState>,
    Principal(principal): Principal,
    method: Method,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let verb = Verb::from_method(method.as_str()).unwrap_or(Verb::Put);
    let access = authorize_story(&state, principal, id, verb).await?;
    let changes = validation::story_changes(typed_body::<UpdateStoryRequest>(body)?)?;

    let db = state.clone();
    let row = blocking(move || {
        Ok(db
            .db
            .update_story(access.story_id, &changes)?
            .ok_or(AccessError::NotFound)?)
    })
    .await?;

    Ok(Json(
        Envelope::data(StoryResponse {
            story: convert::story(row),
        })
        .with_message("Story updated successfully"),
    ))
}

pub async fn delete_story(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let access = authorize_story(&state, principal, id, Verb::Delete).await?;

    let db = state.clone();
    blocking(move || Ok(db.db.delete_story(access.story_id)?)).await?;

    info!("Story {} deleted", access.story_id);
    Ok(Json(Envelope::message("Story deleted successfully")))
}

/// POST /api/stories/{id}/collaborators: add a collaborator or change the
/// role of an existing one.
pub async fn add_collaborator(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let access = authorize_story(&state, principal, id, Verb::Post).await?;
    let (user_id, role) = validation::collaborator(typed_body::<AddCollaboratorRequest>(body)?)?;

    let db = state.clone();
    blocking(move || {
        if db.db.get_user_by_id(user_id)?.is_none() {
            return Err(ApiError::NotFound("User not found"));
        }
        Ok(db.db.upsert_collaborator(access.story_id, user_id, role)?)
    })
    .await?;

    info!("User {} is now {} on story {}", user_id, role, access.story_id);

    Ok((
        StatusCode::CREATED,
        Json(Envelope::message("Collaborator added successfully")),
    ))
}

pub async fn remove_collaborator(
    State(state): State<AppState>,
    Principal(principal): Principal,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let access = authorize_story(&state, principal, id, Verb::Delete).await?;
    let user_id = validation::path_id(&user_id).ok_or(ApiError::InvalidInput("Invalid user ID."))?;

    let db = state.clone();
    blocking(move || Ok(db.db.remove_collaborator(access.story_id, user_id)?)).await?;

    Ok(Json(Envelope::message("Collaborator removed successfully")))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::test_support::{TestApp, body_json};

    #[tokio::test]
    async fn stranger_gets_forbidden_not_not_found_on_private_story() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let stranger = app.register("stranger", "stranger@example.com").await;
        let story = app.create_story(&author, "Secret", false).await;

        let res = app.get(&format!("/api/stories/{story}"), Some(&stranger.token)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "You do not have permission to perform this action.");

        let res = app.get(&format!("/api/stories/{}", story + 1000), Some(&stranger.token)).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"], "Story not found.");
    }

    #[tokio::test]
    async fn malformed_story_id_is_bad_request() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let res = app.get("/api/stories/abc", Some(&author.token)).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"], "Invalid story ID.");
    }

    #[tokio::test]
    async fn unauthenticated_beats_bad_id() {
        let app = TestApp::new();
        let res = app.get("/api/stories/abc", None).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn editor_updates_but_cannot_delete() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let editor = app.register("editor", "editor@example.com").await;
        let story = app.create_story(&author, "Draft", false).await;
        app.add_collaborator(&author, story, editor.id, "editor").await;

        let res = app
            .put_json(
                &format!("/api/stories/{story}"),
                Some(&editor.token),
                json!({"content": "A better opening line."}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["data"]["story"]["content"], "A better opening line.");

        let res = app
            .patch_json(
                &format!("/api/stories/{story}"),
                Some(&editor.token),
                json!({"title": "Final"}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = app.delete(&format!("/api/stories/{story}"), Some(&editor.token)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        // still there, author unchanged
        let res = app.get(&format!("/api/stories/{story}"), Some(&author.token)).await;
        let body = body_json(res).await;
        assert_eq!(body["data"]["story"]["authorId"], author.id);
        assert_eq!(body["data"]["story"]["title"], "Final");
    }

    #[tokio::test]
    async fn viewer_reads_only() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let viewer = app.register("viewer", "viewer@example.com").await;
        let story = app.create_story(&author, "Draft", false).await;
        app.add_collaborator(&author, story, viewer.id, "viewer").await;

        let path = format!("/api/stories/{story}");
        assert_eq!(app.get(&path, Some(&viewer.token)).await.status(), StatusCode::OK);
        assert_eq!(
            app.put_json(&path, Some(&viewer.token), json!({"title": "Mine now"}))
                .await
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            app.post_json(
                &format!("{path}/comments"),
                Some(&viewer.token),
                json!({"content": "hi"})
            )
            .await
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(app.delete(&path, Some(&viewer.token)).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn public_story_is_read_only_for_others() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let reader = app.register("reader", "reader@example.com").await;
        let story = app.create_story(&author, "Open", true).await;

        let path = format!("/api/stories/{story}");
        assert_eq!(app.get(&path, Some(&reader.token)).await.status(), StatusCode::OK);
        assert_eq!(
            app.put_json(&path, Some(&reader.token), json!({"title": "x"}))
                .await
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(app.delete(&path, Some(&reader.token)).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn author_deletes_story() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let story = app.create_story(&author, "Doomed", false).await;
        let path = format!("/api/stories/{story}");

        assert_eq!(app.delete(&path, Some(&author.token)).await.status(), StatusCode::OK);
        assert_eq!(app.get(&path, Some(&author.token)).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn re_adding_collaborator_updates_role() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let friend = app.register("friend", "friend@example.com").await;
        let story = app.create_story(&author, "Shared", false).await;

        app.add_collaborator(&author, story, friend.id, "viewer").await;
        app.add_collaborator(&author, story, friend.id, "editor").await;

        let res = app.get(&format!("/api/stories/{story}"), Some(&author.token)).await;
        let body = body_json(res).await;
        let collaborators = body["data"]["story"]["collaborators"].as_array().unwrap();
        assert_eq!(collaborators.len(), 1);
        assert_eq!(collaborators[0]["role"], "editor");
        assert_eq!(collaborators[0]["userId"], friend.id);
    }

    #[tokio::test]
    async fn collaborator_input_is_checked() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let story = app.create_story(&author, "Shared", false).await;
        let path = format!("/api/stories/{story}/collaborators");

        let res = app
            .post_json(&path, Some(&author.token), json!({"userId": 999, "role": "viewer"}))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"], "User not found");

        let res = app
            .post_json(&path, Some(&author.token), json!({"userId": author.id, "role": "owner"}))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(res).await["errors"]["role"].is_array());
    }

    #[tokio::test]
    async fn only_author_removes_collaborators() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let editor = app.register("editor", "editor@example.com").await;
        let viewer = app.register("viewer", "viewer@example.com").await;
        let story = app.create_story(&author, "Shared", false).await;
        app.add_collaborator(&author, story, editor.id, "editor").await;
        app.add_collaborator(&author, story, viewer.id, "viewer").await;

        let path = format!("/api/stories/{story}/collaborators/{}", viewer.id);
        assert_eq!(app.delete(&path, Some(&editor.token)).await.status(), StatusCode::FORBIDDEN);
        assert_eq!(app.delete(&path, Some(&author.token)).await.status(), StatusCode::OK);

        let res = app.get(&format!("/api/stories/{story}"), Some(&viewer.token)).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn listing_shows_own_shared_and_public() {
        let app = TestApp::new();
        let ana = app.register("ana", "ana@example.com").await;
        let ben = app.register("ben", "ben@example.com").await;
        app.create_story(&ana, "Ana private", false).await;
        app.create_story(&ben, "Ben private", false).await;
        app.create_story(&ben, "Ben public", true).await;

        let res = app.get("/api/stories", Some(&ana.token)).await;
        let body = body_json(res).await;
        let titles: Vec<&str> = body["data"]["stories"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"Ana private"));
        assert!(titles.contains(&"Ben public"));
    }

    #[tokio::test]
    async fn create_story_validates() {
        let app = TestApp::new();
        let ana = app.register("ana", "ana@example.com").await;
        let res = app
            .post_json("/api/stories", Some(&ana.token), json!({"title": "  ", "content": "x"}))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["errors"]["title"][0], "Title is required");
    }

    #[tokio::test]
    async fn access_is_decided_before_the_body_is_typed() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let stranger = app.register("stranger", "stranger@example.com").await;
        let story = app.create_story(&author, "Secret", false).await;
        let path = format!("/api/stories/{story}");

        let res = app.put_json(&path, Some(&stranger.token), json!({"title": 5})).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app
            .put_json("/api/stories/99999", Some(&stranger.token), json!({"isPublic": "yes"}))
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await["error"], "Story not found.");

        let res = app
            .post_json(
                &format!("{path}/collaborators"),
                Some(&stranger.token),
                json!({"userId": "nobody"}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app.put_json(&path, Some(&author.token), json!({"title": 5})).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["error"], "Validation failed");
        assert!(body["errors"]["body"][0].is_string());
    }

    #[tokio::test]
    async fn story_for_vanished_user_is_a_bad_reference() {
        let app = TestApp::new();
        let token = app.token_for(4242, "ghost@example.com");
        let res = app
            .post_json("/api/stories", Some(&token), json!({"title": "Orphan", "content": "x"}))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(res).await["error"],
            "Invalid reference. The referenced resource does not exist."
        );
    }

    #[tokio::test]
    async fn unknown_update_keys_are_ignored() {
        let app = TestApp::new();
        let author = app.register("author", "author@example.com").await;
        let story = app.create_story(&author, "Draft", false).await;
        let res = app
            .put_json(
                &format!("/api/stories/{story}"),
                Some(&author.token),
                json!({"title": "Renamed", "authorId": 77}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["data"]["story"]["title"], "Renamed");
        assert_eq!(body["data"]["story"]["authorId"], author.id);
    }
}
