//! Database access
//!
//! Every query the server issues lives in one of these modules, grouped by
//! the table it mainly touches.

pub mod contacts;
pub mod notifications;
pub mod pool;
pub mod push_tokens;
pub mod statuses;
pub mod users;

pub use pool::{connect, migrate};

/// True when the error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

/// True when the error is a FOREIGN KEY constraint violation
pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|e| e.is_foreign_key_violation())
        .unwrap_or(false)
}
