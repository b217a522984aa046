//! Contact queries
//!
//! Contacts are directed edges: `user_id` has `contact_user_id` in their list.

use chrono::Utc;
use sqlx::SqlitePool;

use super::is_unique_violation;
use crate::error::{AppError, AppResult};
use crate::models::ContactInfo;

/// The user's contacts, ordered by name
pub async fn list_contacts(pool: &SqlitePool, user_id: i64) -> AppResult<Vec<ContactInfo>> {
    let contacts = sqlx::query_as::<_, ContactInfo>(
        r#"
        SELECT u.id, u.name, u.email, c.id AS contact_record_id
        FROM contacts c
        JOIN users u ON u.id = c.contact_user_id
        WHERE c.user_id = ?
        ORDER BY u.name ASC, u.id ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(contacts)
}

/// Ids of every user in the user's contact list
pub async fn contact_ids(pool: &SqlitePool, user_id: i64) -> AppResult<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT contact_user_id FROM contacts WHERE user_id = ? ORDER BY contact_user_id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

pub async fn contact_exists(pool: &SqlitePool, user_id: i64, contact_user_id: i64) -> AppResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM contacts WHERE user_id = ? AND contact_user_id = ?)",
    )
    .bind(user_id)
    .bind(contact_user_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Add a contact edge, returning its id
pub async fn add_contact(pool: &SqlitePool, user_id: i64, contact_user_id: i64) -> AppResult<i64> {
    let result = sqlx::query(
        "INSERT INTO contacts (user_id, contact_user_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(user_id)
    .bind(contact_user_id)
    .bind(Utc::now())
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(AppError::conflict(
            "This user is already in your contact list",
        )),
        Err(e) => Err(e.into()),
    }
}

/// Remove a contact edge, returning the number of rows deleted
pub async fn remove_contact(pool: &SqlitePool, user_id: i64, contact_user_id: i64) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM contacts WHERE user_id = ? AND contact_user_id = ?")
        .bind(user_id)
        .bind(contact_user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{pool::memory_pool, users};

    #[tokio::test]
    async fn test_contacts_are_directed() {
        let pool = memory_pool().await;
        let a = users::create_user(&pool, "A", "a@example.com", "h").await.unwrap();
        let b = users::create_user(&pool, "B", "b@example.com", "h").await.unwrap();

        add_contact(&pool, a, b).await.unwrap();

        assert!(contact_exists(&pool, a, b).await.unwrap());
        assert!(!contact_exists(&pool, b, a).await.unwrap());
        assert_eq!(contact_ids(&pool, a).await.unwrap(), vec![b]);
        assert!(contact_ids(&pool, b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_contact_is_conflict() {
        let pool = memory_pool().await;
        let a = users::create_user(&pool, "A", "a@example.com", "h").await.unwrap();
        let b = users::create_user(&pool, "B", "b@example.com", "h").await.unwrap();

        add_contact(&pool, a, b).await.unwrap();
        let err = add_contact(&pool, a, b).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_and_remove_contacts() {
        let pool = memory_pool().await;
        let me = users::create_user(&pool, "Me", "me@example.com", "h").await.unwrap();
        let zoe = users::create_user(&pool, "Zoe", "zoe@example.com", "h").await.unwrap();
        let abe = users::create_user(&pool, "Abe", "abe@example.com", "h").await.unwrap();
        let edge = add_contact(&pool, me, zoe).await.unwrap();
        add_contact(&pool, me, abe).await.unwrap();

        let listed = list_contacts(&pool, me).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Abe");
        assert_eq!(listed[1].id, zoe);
        assert_eq!(listed[1].contact_record_id, edge);

        assert_eq!(remove_contact(&pool, me, zoe).await.unwrap(), 1);
        assert_eq!(remove_contact(&pool, me, zoe).await.unwrap(), 0);
    }
}
