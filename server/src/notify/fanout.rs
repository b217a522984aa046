//! Notification fan-out
//!
//! After a mutation the affected users are told in up to three ways:
//! a persisted notification row, a push message to each of their devices,
//! and a real-time event in their room (or to everyone).
//!
//! Push delivery runs on a spawned task so a slow provider never holds up
//! the request that triggered it.

use std::sync::Arc;

use serde_json::json;
use sqlx::SqlitePool;

use super::push::{send_to_tokens, PushMessage, PushReport, PushSender};
use super::realtime::{EventName, RealtimeHub};
use crate::db;
use crate::error::AppResult;
use crate::models::{CountUpdate, Notification, NotificationType, StatusItem, StatusRecord, Visibility};

/// Maximum number of characters of content quoted in a push body
pub const PUSH_PREVIEW_CHARS: usize = 100;

#[derive(Clone)]
pub struct Notifier {
    db: SqlitePool,
    hub: RealtimeHub,
    push: Arc<dyn PushSender>,
}

impl Notifier {
    pub fn new(db: SqlitePool, hub: RealtimeHub, push: Arc<dyn PushSender>) -> Self {
        Self { db, hub, push }
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    // ========================================================================
    // Push
    // ========================================================================

    /// Push to every device of the given users, forgetting dead tokens
    pub async fn push_to_users(&self, user_ids: &[i64], message: &PushMessage) -> AppResult<PushReport> {
        let tokens = db::push_tokens::tokens_for_users(&self.db, user_ids).await?;

        if tokens.is_empty() {
            tracing::info!("No push tokens registered for {} user(s)", user_ids.len());
            return Ok(PushReport::default());
        }

        self.push_to_tokens(&tokens, message).await
    }

    /// Push to the given device tokens, forgetting dead ones
    pub async fn push_to_tokens(&self, tokens: &[String], message: &PushMessage) -> AppResult<PushReport> {
        tracing::info!("Sending push \"{}\" to {} device(s)", message.title, tokens.len());

        let report = send_to_tokens(self.push.as_ref(), tokens, message).await;

        if report.failure_count > 0 {
            tracing::warn!("Push failed for {} device(s)", report.failure_count);
        }

        if !report.invalid_tokens.is_empty() {
            let removed = db::push_tokens::delete_tokens(&self.db, &report.invalid_tokens).await?;
            tracing::info!("Removed {} invalid push token(s)", removed);
        }

        Ok(report)
    }

    /// Fire-and-forget variant of `push_to_users`
    pub fn spawn_push(&self, user_ids: Vec<i64>, message: PushMessage) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.push_to_users(&user_ids, &message).await {
                tracing::error!("Push fan-out failed: {}", e);
            }
        });
    }

    // ========================================================================
    // Status events
    // ========================================================================

    /// Announce a freshly created status
    ///
    /// Recipients get a push; the real-time event goes to everyone for public
    /// statuses and to the recipients' rooms otherwise.
    pub fn status_created(&self, status: &StatusItem, owner_label: &str, recipients: &[i64]) {
        if !recipients.is_empty() {
            let message = PushMessage::new(
                format!("New status from {owner_label}"),
                preview(&status.content_url, PUSH_PREVIEW_CHARS),
            )
            .with_data("statusId", status.id.to_string())
            .with_data("type", "NEW_STATUS");

            self.spawn_push(recipients.to_vec(), message);
        }

        if status.visibility == Visibility::Public {
            self.hub.emit_to_all(EventName::NewStatus, status);
            tracing::info!("Announced public status {} to everyone", status.id);
        } else {
            for user_id in recipients {
                self.hub.emit_to_user(*user_id, EventName::NewStatus, status);
            }
            tracing::info!(
                "Sent status {} to {} recipient room(s)",
                status.id,
                recipients.len()
            );
        }
    }

    /// Notify the owner that `actor_id` liked or viewed their status
    ///
    /// Returns `None` without side effects when the actor is the owner.
    pub async fn status_reaction(
        &self,
        kind: NotificationType,
        status: &StatusRecord,
        actor_id: i64,
    ) -> AppResult<Option<Notification>> {
        if status.owner_id == actor_id {
            return Ok(None);
        }

        let notification =
            db::notifications::create_notification(&self.db, kind, status.owner_id, actor_id, status.id)
                .await?;

        let message = PushMessage::new(kind.push_title(), notification.data.message.clone())
            .with_data("statusId", status.id.to_string());
        self.spawn_push(vec![status.owner_id], message);

        self.hub
            .emit_to_user(status.owner_id, EventName::NewNotification, &notification);
        tracing::info!(
            "Sent {:?} notification for status {} to room {}",
            kind,
            status.id,
            status.owner_id
        );

        Ok(Some(notification))
    }

    pub fn like_count_changed(&self, status_id: i64, new_count: i64) {
        self.hub.emit_to_all(
            EventName::StatusLikeUpdated,
            &CountUpdate {
                status_id,
                new_count,
            },
        );
        tracing::info!("Announced like count {} for status {}", new_count, status_id);
    }

    pub fn view_count_changed(&self, status_id: i64, new_count: i64) {
        self.hub.emit_to_all(
            EventName::StatusViewUpdated,
            &CountUpdate {
                status_id,
                new_count,
            },
        );
        tracing::info!("Announced view count {} for status {}", new_count, status_id);
    }

    pub fn status_deleted(&self, status_id: i64) {
        self.hub
            .emit_to_all(EventName::StatusDeleted, &json!({ "id": status_id }));
        tracing::info!("Announced deletion of status {}", status_id);
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").field("hub", &self.hub).finish_non_exhaustive()
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
