//! Arena engine error types

use std::time::Duration;

use sylon_db::DbError;
use sylon_types::ArenaType;
use thiserror::Error;

/// Errors raised by a price oracle
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("price request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OracleError::Http(format!("timeout: {e}"))
        } else if e.is_decode() {
            OracleError::Malformed(e.to_string())
        } else {
            OracleError::Http(e.to_string())
        }
    }
}

/// Arena lifecycle errors
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("Invalid prediction: {0:?} (expected YES or NO)")]
    InvalidPrediction(String),

    #[error("Invalid outcome: {0:?} (expected YES or NO)")]
    InvalidOutcome(String),

    #[error("Invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("Arena not found: {0}")]
    ArenaNotFound(String),

    #[error("Arena {0} is closed for predictions")]
    ArenaClosed(String),

    #[error("Duplicate prediction for {username} on {arena_id}")]
    DuplicatePrediction { arena_id: String, username: String },

    #[error("Arena {0} is already resolved")]
    AlreadyResolved(String),

    #[error("Arena {0} has not reached its deadline")]
    DeadlineNotReached(String),

    #[error("Arena {arena_id} of type {arena_type} cannot be resolved manually")]
    ManualResolutionNotAllowed { arena_id: String, arena_type: ArenaType },

    #[error("No oracle registered for arena type {0}")]
    NoOracle(ArenaType),

    #[error("Price oracle unavailable: {0}")]
    PriceOracleUnavailable(String),

    #[error("Invalid arena: {0}")]
    InvalidArena(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler is not running")]
    SchedulerUnavailable,

    #[error("Storage error: {0}")]
    Storage(DbError),
}

impl ArenaError {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPrediction(_) => "InvalidPrediction",
            Self::InvalidOutcome(_) => "InvalidOutcome",
            Self::InvalidUsername(_) => "InvalidUsername",
            Self::ArenaNotFound(_) => "ArenaNotFound",
            Self::ArenaClosed(_) => "ArenaClosed",
            Self::DuplicatePrediction { .. } => "DuplicatePrediction",
            Self::AlreadyResolved(_) => "AlreadyResolved",
            Self::DeadlineNotReached(_) => "DeadlineNotReached",
            Self::ManualResolutionNotAllowed { .. } => "ManualResolutionNotAllowed",
            Self::NoOracle(_) => "NoOracle",
            Self::PriceOracleUnavailable(_) => "PriceOracleUnavailable",
            Self::InvalidArena(_) => "InvalidArena",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::SchedulerUnavailable => "SchedulerUnavailable",
            Self::Storage(_) => "Storage",
        }
    }

    /// Resolution failed for a transient reason; retry on the next tick
    pub fn is_deferrable(&self) -> bool {
        matches!(self, Self::PriceOracleUnavailable(_) | Self::NoOracle(_))
    }
}

impl From<DbError> for ArenaError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(id) => ArenaError::ArenaNotFound(id),
            DbError::AlreadyResolved(id) => ArenaError::AlreadyResolved(id),
            DbError::DuplicatePrediction { arena_id, username } => {
                ArenaError::DuplicatePrediction { arena_id, username }
            }
            other => ArenaError::Storage(other),
        }
    }
}

impl From<OracleError> for ArenaError {
    fn from(e: OracleError) -> Self {
        ArenaError::PriceOracleUnavailable(e.to_string())
    }
}

/// Result type for arena operations
pub type ArenaResult<T> = Result<T, ArenaError>;
