//! Error types for Sylon domain values

use thiserror::Error;

/// Errors raised while building or converting domain values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("Invalid arena id: {0}")]
    InvalidArenaId(String),

    #[error("Unknown arena type: {0}")]
    UnknownArenaType(String),

    #[error("Unknown arena status: {0}")]
    UnknownStatus(String),

    #[error("Invalid outcome: {0} (expected YES or NO)")]
    InvalidOutcome(String),

    #[error("Inconsistent {arena_type} condition: {detail}")]
    InconsistentCondition { arena_type: String, detail: String },
}
