//! Database pool setup

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};

use crate::error::AppResult;

/// Open the SQLite pool with WAL mode for concurrent access
pub async fn connect(database_url: &str) -> AppResult<SqlitePool> {
    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;

    tracing::info!("Database connected with WAL mode at: {}", database_url);
    Ok(pool)
}

/// Apply pending schema migrations
pub async fn migrate(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("../migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Single-connection in-memory database with the schema applied
#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    use sqlx::sqlite::SqlitePoolOptions;

    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    // One connection that never recycles, otherwise the database vanishes
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();

    migrate(&pool).await.unwrap();
    pool
}
