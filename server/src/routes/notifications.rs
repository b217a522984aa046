//! Notification inbox and push token registration

use axum::{body::Bytes, extract::State, Extension, Json};
use serde_json::{json, Value};

use super::JsonBody;
use crate::auth::AuthUser;
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{NotificationFeed, RegisterTokenRequest, TestNotificationRequest};
use crate::notify::{push::token_fingerprint, PushMessage};
use crate::state::SharedState;

/// Number of notifications returned by the inbox
pub const INBOX_SIZE: i64 = 50;

const TEST_TITLE: &str = "Test notification";
const TEST_BODY: &str = "This is a test push notification from the timeline server";

/// The caller's most recent notifications, split by read state
pub async fn list_notifications(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<NotificationFeed>> {
    let recent = db::notifications::recent_for_user(&state.db, user.user_id, INBOX_SIZE).await?;
    Ok(Json(recent.into_iter().collect()))
}

pub async fn mark_all_read(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let count = db::notifications::mark_all_read(&state.db, user.user_id).await?;
    tracing::debug!("Marked {} notification(s) read for user {}", count, user.user_id);

    Ok(Json(json!({
        "message": "All notifications marked as read",
        "count": count,
    })))
}

/// Bind a device token to the caller
pub async fn register_token(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    JsonBody(req): JsonBody<RegisterTokenRequest>,
) -> AppResult<Json<Value>> {
    let token = req.token.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("Push token is required"));
    }

    let record = db::push_tokens::upsert_token(&state.db, token, user.user_id).await?;
    tracing::info!(
        "Registered push token {} for user {}",
        token_fingerprint(token),
        user.user_id
    );

    Ok(Json(json!({
        "message": "Push token registered successfully",
        "pushToken": record,
    })))
}

/// Push a test message to every registered device
pub async fn send_test_notification(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    // The body is optional
    let req: TestNotificationRequest = if body.is_empty() {
        TestNotificationRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("Malformed request body: {e}")))?
    };

    let tokens = db::push_tokens::all_tokens(&state.db).await?;
    if tokens.is_empty() {
        return Err(AppError::bad_request("No push tokens are registered"));
    }

    let message = PushMessage::new(
        req.title.unwrap_or_else(|| TEST_TITLE.to_string()),
        req.body.unwrap_or_else(|| TEST_BODY.to_string()),
    )
    .with_data("type", "TEST");

    tracing::info!("User {} triggered a test push", user.user_id);
    let report = state.notifier.push_to_tokens(&tokens, &message).await?;

    Ok(Json(json!({
        "message": "Test notification sent",
        "successCount": report.success_count,
        "failureCount": report.failure_count,
    })))
}
