//! User queries

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::is_unique_violation;
use crate::error::{AppError, AppResult};
use crate::models::{UserInfo, UserRecord};

/// Insert a new user, returning its id
pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> AppResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password_hash, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(Utc::now())
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::conflict("Email is already registered"))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> AppResult<Option<UserRecord>> {
    let user = sqlx::query_as::<_, UserRecord>(
        "SELECT id, name, email, password_hash, created_at FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<UserInfo>> {
    let user = sqlx::query_as::<_, UserInfo>("SELECT id, name, email FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

/// Number of distinct ids in `ids` that name an existing user
pub async fn count_existing(pool: &SqlitePool, ids: &[i64]) -> AppResult<i64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT COUNT(*) FROM users WHERE id IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let (count,): (i64,) = builder.build_query_as::<(i64,)>().fetch_one(pool).await?;
    Ok(count)
}

/// Every user except `user_id` and the users already in their contact list
pub async fn list_potential_contacts(pool: &SqlitePool, user_id: i64) -> AppResult<Vec<UserInfo>> {
    let users = sqlx::query_as::<_, UserInfo>(
        r#"
        SELECT u.id, u.name, u.email
        FROM users u
        WHERE u.id != ?
          AND NOT EXISTS (
              SELECT 1 FROM contacts c
              WHERE c.user_id = ? AND c.contact_user_id = u.id
          )
        ORDER BY u.name ASC, u.id ASC
        "#,
    )
    .bind(user_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(users)
}
