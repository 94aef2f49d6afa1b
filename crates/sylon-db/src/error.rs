//! Database error types

use sylon_types::TypesError;
use thiserror::Error;

/// Store operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate arena id: {0}")]
    DuplicateArenaId(String),

    #[error("Arena {0} is already resolved")]
    AlreadyResolved(String),

    #[error("Duplicate prediction for {username} on {arena_id}")]
    DuplicatePrediction { arena_id: String, username: String },

    #[error("Stats already applied for arena {0}")]
    StatsAlreadyApplied(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl From<TypesError> for DbError {
    fn from(e: TypesError) -> Self {
        DbError::InvalidData(e.to_string())
    }
}

impl DbError {
    /// Whether a sqlx error is a UNIQUE / PRIMARY KEY violation
    pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
        matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
    }

    /// Whether a sqlx error is a FOREIGN KEY violation
    pub(crate) fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
        matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
