//! Database models - mapped from SQLite tables
//!
//! Rows are decoded into these structs first and then converted into the
//! domain types, so a row that violates an arena invariant surfaces as
//! `DbError::InvalidData` instead of a half-valid `Arena`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use sylon_types::{
    Arena, ArenaCondition, ArenaId, ArenaStatus, ArenaType, LeaderboardEntry, Outcome, Prediction,
    UserStats,
};

use crate::{DbError, DbResult};

// ============================================================================
// Arena Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbArena {
    pub arena_id: String,
    pub arena_type: String,
    pub asset: Option<String>,
    pub question: String,
    pub target: Option<String>,
    pub floor: Option<String>,
    pub deadline: DateTime<Utc>,
    pub rules: String,
    pub status: String,
    pub outcome: Option<String>,
    pub resolved_price: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbArena> for Arena {
    type Error = DbError;

    fn try_from(row: DbArena) -> DbResult<Self> {
        let arena_type = ArenaType::from_str(&row.arena_type)?;
        let condition = ArenaCondition::from_parts(
            arena_type,
            parse_decimal(row.target.as_deref())?,
            parse_decimal(row.floor.as_deref())?,
        )?;
        let status = ArenaStatus::from_str(&row.status)?;
        let outcome = row.outcome.as_deref().map(Outcome::from_str).transpose()?;

        if (status == ArenaStatus::Resolved) != row.resolved_at.is_some() {
            return Err(DbError::InvalidData(format!(
                "arena {} has status {} but resolved_at {:?}",
                row.arena_id, status, row.resolved_at
            )));
        }

        Ok(Arena {
            arena_id: ArenaId::parse(&row.arena_id)?,
            condition,
            asset: row.asset,
            question: row.question,
            rules: row.rules,
            deadline: row.deadline,
            status,
            outcome,
            resolved_price: parse_decimal(row.resolved_price.as_deref())?,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

// ============================================================================
// Prediction Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbPrediction {
    pub arena_id: String,
    pub username: String,
    pub prediction: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbPrediction> for Prediction {
    type Error = DbError;

    fn try_from(row: DbPrediction) -> DbResult<Self> {
        Ok(Prediction {
            arena_id: ArenaId::parse(&row.arena_id)?,
            username: row.username,
            prediction: Outcome::from_str(&row.prediction)?,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Stats Models
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbUserStats {
    pub username: String,
    pub total_predictions: i64,
    pub wins: i64,
    pub losses: i64,
    pub current_streak: i64,
    pub max_streak: i64,
}

impl TryFrom<DbUserStats> for UserStats {
    type Error = DbError;

    fn try_from(row: DbUserStats) -> DbResult<Self> {
        Ok(UserStats {
            total_predictions: to_count(row.total_predictions, "total_predictions")?,
            wins: to_count(row.wins, "wins")?,
            losses: to_count(row.losses, "losses")?,
            current_streak: to_count(row.current_streak, "current_streak")?,
            max_streak: to_count(row.max_streak, "max_streak")?,
            username: row.username,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLeaderboardRow {
    pub username: String,
    pub total_predictions: i64,
    pub wins: i64,
    pub losses: i64,
    pub accuracy: f64,
    pub current_streak: i64,
    pub max_streak: i64,
}

impl DbLeaderboardRow {
    pub fn into_entry(self, rank: u32) -> DbResult<LeaderboardEntry> {
        Ok(LeaderboardEntry {
            rank,
            total_predictions: to_count(self.total_predictions, "total_predictions")?,
            wins: to_count(self.wins, "wins")?,
            losses: to_count(self.losses, "losses")?,
            accuracy: self.accuracy,
            current_streak: to_count(self.current_streak, "current_streak")?,
            max_streak: to_count(self.max_streak, "max_streak")?,
            username: self.username,
        })
    }
}

// ============================================================================
// Column helpers
// ============================================================================

fn parse_decimal(value: Option<&str>) -> DbResult<Option<Decimal>> {
    value
        .map(|s| Decimal::from_str(s).map_err(|e| DbError::InvalidData(format!("decimal {s:?}: {e}"))))
        .transpose()
}

fn to_count(value: i64, column: &str) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::InvalidData(format!("{column} out of range: {value}")))
}
