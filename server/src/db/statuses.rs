//! Status, like and view queries
//!
//! # Visibility
//!
//! A status is visible to a requester when any of these holds:
//!
//! 1. the requester owns it (any visibility)
//! 2. it is `public`
//! 3. it is `contacts` and its owner is in the requester's contact list
//! 4. it is `specific_users` and the requester is on its viewer list
//!
//! The same predicate backs both the feed and the per-status access check,
//! so a status a user can like or view is always one their feed shows.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::is_foreign_key_violation;
use crate::error::{AppError, AppResult};
use crate::models::{StatusCounts, StatusItem, StatusRecord, UserInfo, UserSummary, Visibility};

/// Visibility predicate over alias `s`; binds the requester id three times
const VISIBLE_TO_REQUESTER: &str = r#"
    (
        s.owner_id = ?
        OR s.visibility = 'public'
        OR (
            s.visibility = 'contacts'
            AND EXISTS (
                SELECT 1 FROM contacts c
                WHERE c.user_id = ? AND c.contact_user_id = s.owner_id
            )
        )
        OR (
            s.visibility = 'specific_users'
            AND EXISTS (
                SELECT 1 FROM status_viewers sv
                WHERE sv.status_id = s.id AND sv.user_id = ?
            )
        )
    )
"#;

/// Status joined with its owner name and counts
const STATUS_ITEM_COLUMNS: &str = r#"
    s.id, s.owner_id, s.content_url, s.visibility, s.created_at,
    u.name AS owner_name,
    (SELECT COUNT(*) FROM status_likes l WHERE l.status_id = s.id) AS like_count,
    (SELECT COUNT(*) FROM status_views v WHERE v.status_id = s.id) AS view_count
"#;

#[derive(sqlx::FromRow)]
struct StatusItemRow {
    id: i64,
    owner_id: i64,
    content_url: String,
    visibility: Visibility,
    created_at: DateTime<Utc>,
    owner_name: String,
    like_count: i64,
    view_count: i64,
}

impl From<StatusItemRow> for StatusItem {
    fn from(row: StatusItemRow) -> Self {
        Self {
            id: row.id,
            content_url: row.content_url,
            visibility: row.visibility,
            owner_id: row.owner_id,
            created_at: row.created_at,
            owner: UserSummary {
                id: row.owner_id,
                name: row.owner_name,
            },
            counts: StatusCounts {
                likes: row.like_count,
                views: row.view_count,
            },
        }
    }
}

// ============================================================================
// Status Queries
// ============================================================================

/// Insert a status together with its explicit viewer list
///
/// Viewer ids must name existing users; an unknown id rolls the whole
/// insert back and yields `BadRequest`.
pub async fn create_status(
    pool: &SqlitePool,
    owner_id: i64,
    content_url: &str,
    visibility: Visibility,
    viewer_ids: &[i64],
) -> AppResult<StatusRecord> {
    let mut tx = pool.begin().await?;

    let status = sqlx::query_as::<_, StatusRecord>(
        r#"
        INSERT INTO statuses (owner_id, content_url, visibility, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, owner_id, content_url, visibility, created_at
        "#,
    )
    .bind(owner_id)
    .bind(content_url)
    .bind(visibility)
    .bind(Utc::now())
    .fetch_one(&mut *tx)
    .await?;

    for viewer_id in viewer_ids {
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO status_viewers (status_id, user_id) VALUES (?, ?)",
        )
        .bind(status.id)
        .bind(viewer_id)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if is_foreign_key_violation(&e) {
                return Err(AppError::bad_request(
                    "One or more selected user IDs are invalid",
                ));
            }
            return Err(e.into());
        }
    }

    tx.commit().await?;
    Ok(status)
}

pub async fn find_status(pool: &SqlitePool, status_id: i64) -> AppResult<Option<StatusRecord>> {
    let status = sqlx::query_as::<_, StatusRecord>(
        "SELECT id, owner_id, content_url, visibility, created_at FROM statuses WHERE id = ?",
    )
    .bind(status_id)
    .fetch_optional(pool)
    .await?;

    Ok(status)
}

/// Status with owner and counts, regardless of visibility
pub async fn find_status_item(pool: &SqlitePool, status_id: i64) -> AppResult<Option<StatusItem>> {
    let sql = format!(
        r#"
        SELECT {STATUS_ITEM_COLUMNS}
        FROM statuses s
        JOIN users u ON u.id = s.owner_id
        WHERE s.id = ?
        "#
    );

    let row = sqlx::query_as::<_, StatusItemRow>(&sql)
        .bind(status_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(StatusItem::from))
}

/// Whether `user_id` may see the status
pub async fn can_view(pool: &SqlitePool, user_id: i64, status_id: i64) -> AppResult<bool> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM statuses s WHERE s.id = ? AND {VISIBLE_TO_REQUESTER})"
    );

    let visible = sqlx::query_scalar::<_, bool>(&sql)
        .bind(status_id)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(visible)
}

/// Feed of every status visible to `user_id`, newest first
pub async fn visible_feed(
    pool: &SqlitePool,
    user_id: i64,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<StatusItem>> {
    let sql = format!(
        r#"
        SELECT {STATUS_ITEM_COLUMNS}
        FROM statuses s
        JOIN users u ON u.id = s.owner_id
        WHERE {VISIBLE_TO_REQUESTER}
        ORDER BY s.created_at DESC, s.id DESC
        LIMIT ? OFFSET ?
        "#
    );

    let rows = sqlx::query_as::<_, StatusItemRow>(&sql)
        .bind(user_id)
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(StatusItem::from).collect())
}

/// Delete a status; likes, views, viewers and notifications cascade
pub async fn delete_status(pool: &SqlitePool, status_id: i64) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM statuses WHERE id = ?")
        .bind(status_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

// ============================================================================
// Like Queries
// ============================================================================

pub async fn has_liked(pool: &SqlitePool, status_id: i64, user_id: i64) -> AppResult<bool> {
    let liked = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM status_likes WHERE status_id = ? AND user_id = ?)",
    )
    .bind(status_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(liked)
}

/// Record a like; false when the user had already liked the status
pub async fn insert_like(pool: &SqlitePool, status_id: i64, user_id: i64) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO status_likes (status_id, user_id, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT (status_id, user_id) DO NOTHING
        "#,
    )
    .bind(status_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Remove a like; false when there was none
pub async fn delete_like(pool: &SqlitePool, status_id: i64, user_id: i64) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM status_likes WHERE status_id = ? AND user_id = ?")
        .bind(status_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn count_likes(pool: &SqlitePool, status_id: i64) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM status_likes WHERE status_id = ?")
        .bind(status_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

// ============================================================================
// View Queries
// ============================================================================

pub async fn has_viewed(pool: &SqlitePool, status_id: i64, user_id: i64) -> AppResult<bool> {
    let viewed = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM status_views WHERE status_id = ? AND user_id = ?)",
    )
    .bind(status_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(viewed)
}

/// Record a view; false when the user had already viewed the status
pub async fn insert_view(pool: &SqlitePool, status_id: i64, user_id: i64) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO status_views (status_id, user_id, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT (status_id, user_id) DO NOTHING
        "#,
    )
    .bind(status_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn count_views(pool: &SqlitePool, status_id: i64) -> AppResult<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM status_views WHERE status_id = ?")
        .bind(status_id)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Users who viewed the status, most recent view first
pub async fn list_viewers(pool: &SqlitePool, status_id: i64) -> AppResult<Vec<UserInfo>> {
    let viewers = sqlx::query_as::<_, UserInfo>(
        r#"
        SELECT u.id, u.name, u.email
        FROM status_views v
        JOIN users u ON u.id = v.user_id
        WHERE v.status_id = ?
        ORDER BY v.created_at DESC, v.id DESC
        "#,
    )
    .bind(status_id)
    .fetch_all(pool)
    .await?;

    Ok(viewers)
}
