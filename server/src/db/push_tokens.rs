//! Push token queries

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::error::AppResult;
use crate::models::PushTokenRecord;

/// Bind a device token to a user, taking it over if another user held it
pub async fn upsert_token(pool: &SqlitePool, token: &str, user_id: i64) -> AppResult<PushTokenRecord> {
    let now = Utc::now();

    let record = sqlx::query_as::<_, PushTokenRecord>(
        r#"
        INSERT INTO push_tokens (token, user_id, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (token) DO UPDATE SET
            user_id = excluded.user_id,
            updated_at = excluded.updated_at
        RETURNING id, token, user_id, created_at, updated_at
        "#,
    )
    .bind(token)
    .bind(user_id)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Every token registered by any of the given users
pub async fn tokens_for_users(pool: &SqlitePool, user_ids: &[i64]) -> AppResult<Vec<String>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT token FROM push_tokens WHERE user_id IN (");
    let mut separated = builder.separated(", ");
    for id in user_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");

    let tokens = builder.build_query_scalar::<String>().fetch_all(pool).await?;
    Ok(tokens)
}

pub async fn all_tokens(pool: &SqlitePool) -> AppResult<Vec<String>> {
    let tokens = sqlx::query_scalar::<_, String>("SELECT token FROM push_tokens ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(tokens)
}

/// Forget tokens the push provider reported as dead
pub async fn delete_tokens(pool: &SqlitePool, tokens: &[String]) -> AppResult<u64> {
    if tokens.is_empty() {
        return Ok(0);
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM push_tokens WHERE token IN (");
    let mut separated = builder.separated(", ");
    for token in tokens {
        separated.push_bind(token.as_str());
    }
    separated.push_unseparated(")");

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}
