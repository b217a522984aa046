//! Status feed, creation, reactions and deletion

use std::collections::BTreeSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::{parse_id, JsonBody, QueryParams};
use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{
    CreateStatusRequest, FeedQuery, LikeResponse, MessageResponse, NotificationType, StatusItem,
    StatusRecord, UserInfo, Visibility,
};
use crate::state::{AppState, SharedState};

/// Load a status the caller may see; invisible statuses look missing
async fn visible_status(state: &AppState, user_id: i64, raw_id: &str) -> AppResult<StatusRecord> {
    let status_id = parse_id(raw_id, "status")?;

    let status = db::statuses::find_status(&state.db, status_id)
        .await?
        .ok_or_else(|| AppError::not_found("Status not found"))?;

    if !db::statuses::can_view(&state.db, user_id, status.id).await? {
        return Err(AppError::not_found("Status not found"));
    }

    Ok(status)
}

/// Load a status and require the caller to own it
async fn owned_status(
    state: &AppState,
    user_id: i64,
    raw_id: &str,
    denied: &str,
) -> AppResult<StatusRecord> {
    let status_id = parse_id(raw_id, "status")?;

    let status = db::statuses::find_status(&state.db, status_id)
        .await?
        .ok_or_else(|| AppError::not_found("Status not found"))?;

    if status.owner_id != user_id {
        return Err(AppError::forbidden(denied));
    }

    Ok(status)
}

/// Statuses visible to the caller, newest first
pub async fn get_feed(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    QueryParams(query): QueryParams<FeedQuery>,
) -> AppResult<Json<Vec<StatusItem>>> {
    let feed =
        db::statuses::visible_feed(&state.db, user.user_id, query.limit(), query.offset()).await?;
    Ok(Json(feed))
}

pub async fn create_status(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(req): JsonBody<CreateStatusRequest>,
) -> AppResult<(StatusCode, Json<StatusItem>)> {
    if req.content_url.trim().is_empty() || req.visibility.trim().is_empty() {
        return Err(AppError::bad_request("Content and visibility are required"));
    }

    let visibility: Visibility = req
        .visibility
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request("Invalid visibility value"))?;

    let viewer_ids: Vec<i64> = match visibility {
        Visibility::SpecificUsers => {
            let ids: BTreeSet<i64> = req.user_ids.iter().copied().collect();
            if ids.is_empty() {
                return Err(AppError::bad_request(
                    "Select at least one user for specific_users visibility",
                ));
            }

            let ids: Vec<i64> = ids.into_iter().collect();
            let existing = db::users::count_existing(&state.db, &ids).await?;
            if existing != ids.len() as i64 {
                return Err(AppError::bad_request(
                    "One or more selected user IDs are invalid",
                ));
            }
            ids
        }
        Visibility::Public | Visibility::Contacts => Vec::new(),
    };

    let record = db::statuses::create_status(
        &state.db,
        user.user_id,
        &req.content_url,
        visibility,
        &viewer_ids,
    )
    .await?;

    let item = db::statuses::find_status_item(&state.db, record.id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Status {} vanished after insert", record.id)))?;

    let recipients: Vec<i64> = match visibility {
        Visibility::SpecificUsers => viewer_ids
            .into_iter()
            .filter(|id| *id != user.user_id)
            .collect(),
        Visibility::Contacts => db::contacts::contact_ids(&state.db, user.user_id).await?,
        Visibility::Public => Vec::new(),
    };

    let owner_label = if item.owner.name.trim().is_empty() {
        user.email.clone()
    } else {
        item.owner.name.clone()
    };

    tracing::info!(
        "User {} created {} status {}",
        user.user_id,
        visibility,
        item.id
    );
    state.notifier.status_created(&item, &owner_label, &recipients);

    Ok((StatusCode::CREATED, Json(item)))
}

/// Toggle the caller's like on a status
pub async fn like_status(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(raw_id): Path<String>,
) -> AppResult<(StatusCode, Json<LikeResponse>)> {
    let status = visible_status(&state, user.user_id, &raw_id).await?;

    let (code, message) = if db::statuses::has_liked(&state.db, status.id, user.user_id).await? {
        db::statuses::delete_like(&state.db, status.id, user.user_id).await?;
        (StatusCode::OK, "Status unliked")
    } else {
        // A concurrent duplicate loses at the unique index and stays quiet
        if db::statuses::insert_like(&state.db, status.id, user.user_id).await? {
            state
                .notifier
                .status_reaction(NotificationType::Like, &status, user.user_id)
                .await?;
        }
        (StatusCode::CREATED, "Status liked")
    };

    let like_count = db::statuses::count_likes(&state.db, status.id).await?;
    state.notifier.like_count_changed(status.id, like_count);

    Ok((
        code,
        Json(LikeResponse {
            message: message.to_string(),
            like_count,
        }),
    ))
}

/// Record that the caller has seen a status
pub async fn record_view(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(raw_id): Path<String>,
) -> AppResult<(StatusCode, Json<MessageResponse>)> {
    let status = visible_status(&state, user.user_id, &raw_id).await?;

    if status.owner_id == user.user_id {
        return Ok((
            StatusCode::OK,
            Json(MessageResponse::new("Owner views are not recorded")),
        ));
    }

    if db::statuses::has_viewed(&state.db, status.id, user.user_id).await?
        || !db::statuses::insert_view(&state.db, status.id, user.user_id).await?
    {
        return Ok((StatusCode::OK, Json(MessageResponse::new("Already viewed"))));
    }

    state
        .notifier
        .status_reaction(NotificationType::View, &status, user.user_id)
        .await?;

    let view_count = db::statuses::count_views(&state.db, status.id).await?;
    state.notifier.view_count_changed(status.id, view_count);

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Status view recorded")),
    ))
}

/// Who has seen the caller's status, most recent first
pub async fn list_viewers(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<Vec<UserInfo>>> {
    let status = owned_status(
        &state,
        user.user_id,
        &raw_id,
        "Only the owner can see who viewed this status",
    )
    .await?;

    let viewers = db::statuses::list_viewers(&state.db, status.id).await?;
    Ok(Json(viewers))
}

pub async fn delete_status(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let status = owned_status(
        &state,
        user.user_id,
        &raw_id,
        "You can only delete your own statuses",
    )
    .await?;

    db::statuses::delete_status(&state.db, status.id).await?;
    tracing::info!("User {} deleted status {}", user.user_id, status.id);
    state.notifier.status_deleted(status.id);

    Ok(Json(MessageResponse::new("Status deleted")))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use tokio::time::timeout;

    use crate::db;
    use crate::notify::EventName;
    use crate::test_support::{seed_user, TestApp};

    async fn post_status(app: &TestApp, token: &str, body: Value) -> i64 {
        let (status, created) = app.post("/api/statuses", token, body).await;
        assert_eq!(status, StatusCode::CREATED, "{created}");
        created["id"].as_i64().unwrap()
    }

    fn feed_ids(body: &Value) -> Vec<i64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_create_status_response_shape() {
        let app = TestApp::new().await;
        let (owner_id, owner) = seed_user(&app.state, "Owner").await;

        let (status, body) = app
            .post(
                "/api/statuses",
                &owner,
                json!({ "content_url": "https://cdn.example.com/a.jpg", "visibility": "public" }),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["content_url"], "https://cdn.example.com/a.jpg");
        assert_eq!(body["visibility"], "public");
        assert_eq!(body["ownerId"], owner_id);
        assert_eq!(body["owner"]["name"], "Owner");
        assert_eq!(body["_count"], json!({ "likes": 0, "views": 0 }));
    }

    #[tokio::test]
    async fn test_create_status_validation() {
        let app = TestApp::new().await;
        let (_, owner) = seed_user(&app.state, "Owner").await;

        let cases = [
            json!({ "visibility": "public" }),
            json!({ "content_url": "x", "visibility": "" }),
            json!({ "content_url": "x", "visibility": "friends" }),
            json!({ "content_url": "x", "visibility": "specific_users", "user_ids": [] }),
            json!({ "content_url": "x", "visibility": "specific_users", "user_ids": [424242] }),
        ];

        for body in cases {
            let (status, _) = app.post("/api/statuses", &owner, body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        }

        let (_, feed) = app.get("/api/statuses", &owner).await;
        assert!(feed.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_respects_visibility() {
        let app = TestApp::new().await;
        let (owner_id, owner) = seed_user(&app.state, "Owner").await;
        let (_, friend) = seed_user(&app.state, "Friend").await;
        let (chosen_id, chosen) = seed_user(&app.state, "Chosen").await;
        let (_, stranger) = seed_user(&app.state, "Stranger").await;

        app.post("/api/contacts", &friend, json!({ "contact_id": owner_id }))
            .await;

        let public = post_status(&app, &owner, json!({ "content_url": "p", "visibility": "public" })).await;
        let contacts =
            post_status(&app, &owner, json!({ "content_url": "c", "visibility": "contacts" })).await;
        let specific = post_status(
            &app,
            &owner,
            json!({ "content_url": "s", "visibility": "specific_users", "user_ids": [chosen_id.to_string()] }),
        )
        .await;

        let (_, body) = app.get("/api/statuses", &owner).await;
        assert_eq!(feed_ids(&body), vec![specific, contacts, public]);

        // Friend listed the owner as a contact
        let (_, body) = app.get("/api/statuses", &friend).await;
        assert_eq!(feed_ids(&body), vec![contacts, public]);

        let (_, body) = app.get("/api/statuses", &chosen).await;
        assert_eq!(feed_ids(&body), vec![specific, public]);

        let (_, body) = app.get("/api/statuses", &stranger).await;
        assert_eq!(feed_ids(&body), vec![public]);

        let (_, body) = app.get("/api/statuses?limit=1&offset=1", &owner).await;
        assert_eq!(feed_ids(&body), vec![contacts]);
    }

    #[tokio::test]
    async fn test_contacts_status_pushes_to_owner_contacts() {
        let app = TestApp::new().await;
        let (owner_id, owner) = seed_user(&app.state, "Owner").await;
        let (friend_id, _) = seed_user(&app.state, "Friend").await;
        app.post("/api/contacts", &owner, json!({ "contact_id": friend_id }))
            .await;
        db::push_tokens::upsert_token(&app.state.db, "friend-phone", friend_id)
            .await
            .unwrap();
        db::push_tokens::upsert_token(&app.state.db, "owner-phone", owner_id)
            .await
            .unwrap();
        let mut events = app.state.hub().subscribe();

        post_status(&app, &owner, json!({ "content_url": "hello", "visibility": "contacts" })).await;

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.name, EventName::NewStatus);
        assert!(envelope.is_for(&[friend_id].into_iter().collect()));
        assert!(!envelope.is_for(&[owner_id].into_iter().collect()));

        let (token, message) = timeout(Duration::from_secs(2), app.push.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token, "friend-phone");
        assert_eq!(message.title, "New status from Owner");
        assert_eq!(message.body, "hello");
    }

    #[tokio::test]
    async fn test_specific_recipients_skip_owner_and_duplicates() {
        let app = TestApp::new().await;
        let (owner_id, owner) = seed_user(&app.state, "Owner").await;
        let (a_id, _) = seed_user(&app.state, "A").await;
        db::push_tokens::upsert_token(&app.state.db, "a-phone", a_id)
            .await
            .unwrap();
        db::push_tokens::upsert_token(&app.state.db, "owner-phone", owner_id)
            .await
            .unwrap();
        let mut events = app.state.hub().subscribe();

        post_status(
            &app,
            &owner,
            json!({
                "content_url": "just for a",
                "visibility": "specific_users",
                "user_ids": [a_id, a_id.to_string(), owner_id],
            }),
        )
        .await;

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.name, EventName::NewStatus);
        assert!(envelope.is_for(&[a_id].into_iter().collect()));
        assert!(!envelope.is_for(&[owner_id].into_iter().collect()));
        assert!(events.try_recv().is_err());

        let (token, _) = timeout(Duration::from_secs(2), app.push.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token, "a-phone");
        tokio::task::yield_now().await;
        assert_eq!(app.push.sent_tokens(), vec!["a-phone"]);
    }

    #[tokio::test]
    async fn test_like_toggle_and_notification() {
        let app = TestApp::new().await;
        let (owner_id, owner) = seed_user(&app.state, "Owner").await;
        let (_, fan) = seed_user(&app.state, "Fan").await;
        let id = post_status(&app, &owner, json!({ "content_url": "x", "visibility": "public" })).await;
        let uri = format!("/api/statuses/{id}/like");

        let (status, body) = app.post(&uri, &fan, json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({ "message": "Status liked", "likeCount": 1 }));

        let (_, notifications) = app.get("/api/notifications", &owner).await;
        let unread = notifications["unread"].as_array().unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0]["type"], "LIKE");
        assert_eq!(unread[0]["userId"], owner_id);
        assert_eq!(unread[0]["data"]["message"], "Fan liked your status.");

        let (status, body) = app.post(&uri, &fan, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Status unliked", "likeCount": 0 }));

        // Liking your own status counts but notifies nobody
        let (status, _) = app.post(&uri, &owner, json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, notifications) = app.get("/api/notifications", &owner).await;
        assert_eq!(notifications["unread"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_like_broadcasts_new_count() {
        let app = TestApp::new().await;
        let (_, owner) = seed_user(&app.state, "Owner").await;
        let id = post_status(&app, &owner, json!({ "content_url": "x", "visibility": "public" })).await;
        let mut events = app.state.hub().subscribe();

        app.post(&format!("/api/statuses/{id}/like"), &owner, json!({}))
            .await;

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.name, EventName::StatusLikeUpdated);
        let frame: Value = serde_json::from_str(&envelope.frame).unwrap();
        assert_eq!(
            frame,
            json!({ "event": "status_like_updated", "data": { "statusId": id, "newCount": 1 } })
        );
    }

    #[tokio::test]
    async fn test_invisible_status_looks_missing() {
        let app = TestApp::new().await;
        let (_, owner) = seed_user(&app.state, "Owner").await;
        let (_, stranger) = seed_user(&app.state, "Stranger").await;
        let id = post_status(&app, &owner, json!({ "content_url": "x", "visibility": "contacts" })).await;

        let (status, _) = app
            .post(&format!("/api/statuses/{id}/like"), &stranger, json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app
            .post(&format!("/api/statuses/{id}/view"), &stranger, json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.post("/api/statuses/9999/like", &owner, json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.post("/api/statuses/abc/like", &owner, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_views_are_recorded_once() {
        let app = TestApp::new().await;
        let (_, owner) = seed_user(&app.state, "Owner").await;
        let (viewer_id, viewer) = seed_user(&app.state, "Viewer").await;
        let id = post_status(&app, &owner, json!({ "content_url": "x", "visibility": "public" })).await;
        let uri = format!("/api/statuses/{id}/view");

        let (status, _) = app.post(&uri, &owner, json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.post(&uri, &viewer, json!({})).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = app.post(&uri, &viewer, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Already viewed");

        let (status, body) = app.get(&format!("/api/statuses/{id}/viewers"), &owner).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(feed_ids(&body), vec![viewer_id]);

        let (status, _) = app.get(&format!("/api/statuses/{id}/viewers"), &viewer).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, feed) = app.get("/api/statuses", &owner).await;
        assert_eq!(feed[0]["_count"], json!({ "likes": 0, "views": 1 }));

        let (_, notifications) = app.get("/api/notifications", &owner).await;
        let unread = notifications["unread"].as_array().unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0]["type"], "VIEW");
    }

    #[tokio::test]
    async fn test_delete_is_owner_only_and_cascades() {
        let app = TestApp::new().await;
        let (_, owner) = seed_user(&app.state, "Owner").await;
        let (_, other) = seed_user(&app.state, "Other").await;
        let id = post_status(&app, &owner, json!({ "content_url": "x", "visibility": "public" })).await;
        app.post(&format!("/api/statuses/{id}/like"), &other, json!({}))
            .await;

        let (status, _) = app.delete(&format!("/api/statuses/{id}"), &other).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut events = app.state.hub().subscribe();
        let (status, _) = app.delete(&format!("/api/statuses/{id}"), &owner).await;
        assert_eq!(status, StatusCode::OK);

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.name, EventName::StatusDeleted);

        let (_, notifications) = app.get("/api/notifications", &owner).await;
        assert!(notifications["unread"].as_array().unwrap().is_empty());

        let (status, _) = app.delete(&format!("/api/statuses/{id}"), &owner).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
