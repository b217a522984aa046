//! Notification queries

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{Notification, NotificationRow, NotificationType};

const NOTIFICATION_COLUMNS: &str = r#"
    n.id, n.type, n.user_id, n.actor_id, n.status_id, n.is_read, n.created_at,
    a.name AS actor_name,
    s.content_url AS status_content_url
"#;

/// Persist a notification for `recipient_id` and return it with actor details
pub async fn create_notification(
    pool: &SqlitePool,
    kind: NotificationType,
    recipient_id: i64,
    actor_id: i64,
    status_id: i64,
) -> AppResult<Notification> {
    let id = sqlx::query(
        r#"
        INSERT INTO notifications (type, user_id, actor_id, status_id, is_read, created_at)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(kind)
    .bind(recipient_id)
    .bind(actor_id)
    .bind(status_id)
    .bind(Utc::now())
    .execute(pool)
    .await?
    .last_insert_rowid();

    find_notification(pool, id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Notification {id} vanished after insert")))
}

pub async fn find_notification(pool: &SqlitePool, id: i64) -> AppResult<Option<Notification>> {
    let sql = format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS}
        FROM notifications n
        JOIN users a ON a.id = n.actor_id
        JOIN statuses s ON s.id = n.status_id
        WHERE n.id = ?
        "#
    );

    let row = sqlx::query_as::<_, NotificationRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Notification::from))
}

/// Most recent notifications addressed to the user
pub async fn recent_for_user(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
) -> AppResult<Vec<Notification>> {
    let sql = format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS}
        FROM notifications n
        JOIN users a ON a.id = n.actor_id
        JOIN statuses s ON s.id = n.status_id
        WHERE n.user_id = ?
        ORDER BY n.created_at DESC, n.id DESC
        LIMIT ?
        "#
    );

    let rows = sqlx::query_as::<_, NotificationRow>(&sql)
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Notification::from).collect())
}

/// Mark every unread notification of the user as read
pub async fn mark_all_read(pool: &SqlitePool, user_id: i64) -> AppResult<u64> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{pool::memory_pool, statuses, users};
    use crate::models::Visibility;

    #[tokio::test]
    async fn test_notification_round_trip_and_read_marking() {
        let pool = memory_pool().await;
        let owner = users::create_user(&pool, "Owner", "o@example.com", "h").await.unwrap();
        let fan = users::create_user(&pool, "Fan", "f@example.com", "h").await.unwrap();
        let status = statuses::create_status(&pool, owner, "pic.jpg", Visibility::Public, &[])
            .await
            .unwrap();

        let like = create_notification(&pool, NotificationType::Like, owner, fan, status.id)
            .await
            .unwrap();
        assert_eq!(like.actor.name, "Fan");
        assert_eq!(like.status.content_url, "pic.jpg");
        assert_eq!(like.data.message, "Fan liked your status.");
        assert!(!like.is_read);

        create_notification(&pool, NotificationType::View, owner, fan, status.id)
            .await
            .unwrap();

        let recent = recent_for_user(&pool, owner, 50).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, NotificationType::View);
        assert!(recent_for_user(&pool, fan, 50).await.unwrap().is_empty());

        assert_eq!(mark_all_read(&pool, owner).await.unwrap(), 2);
        assert_eq!(mark_all_read(&pool, owner).await.unwrap(), 0);
        assert!(recent_for_user(&pool, owner, 50)
            .await
            .unwrap()
            .iter()
            .all(|n| n.is_read));
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let pool = memory_pool().await;
        let owner = users::create_user(&pool, "Owner", "o@example.com", "h").await.unwrap();
        let fan = users::create_user(&pool, "Fan", "f@example.com", "h").await.unwrap();
        let status = statuses::create_status(&pool, owner, "x", Visibility::Public, &[])
            .await
            .unwrap();

        for _ in 0..3 {
            create_notification(&pool, NotificationType::View, owner, fan, status.id)
                .await
                .unwrap();
        }

        assert_eq!(recent_for_user(&pool, owner, 2).await.unwrap().len(), 2);
    }
}
