//! Transactional view of the store

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Sqlite, Transaction};
use sylon_types::{Arena, ArenaId, Outcome, Prediction, UserStats};

use crate::{repos, DbError, DbResult};

/// A store transaction. Dropping it without `commit` rolls back.
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }

    pub async fn count_arenas_for_day(&mut self, day: NaiveDate) -> DbResult<u32> {
        repos::arena::count_for_day(&mut self.tx, day).await
    }

    pub async fn create_arena(&mut self, arena: &Arena) -> DbResult<()> {
        repos::arena::insert(&mut self.tx, arena).await
    }

    pub async fn get_arena(&mut self, arena_id: &ArenaId) -> DbResult<Option<Arena>> {
        repos::arena::find(&mut self.tx, arena_id).await
    }

    /// OPEN → RESOLVED, returning the arena as stored afterwards
    pub async fn transition_to_resolved(
        &mut self,
        arena_id: &ArenaId,
        outcome: Outcome,
        resolved_price: Option<Decimal>,
        resolved_at: DateTime<Utc>,
    ) -> DbResult<Arena> {
        repos::arena::mark_resolved(&mut self.tx, arena_id, outcome, resolved_price, resolved_at).await?;
        self.get_arena(arena_id)
            .await?
            .ok_or_else(|| DbError::NotFound(arena_id.to_string()))
    }

    pub async fn predictions_for_arena(&mut self, arena_id: &ArenaId) -> DbResult<Vec<Prediction>> {
        repos::prediction::list_for_arena(&mut self.tx, arena_id).await
    }

    /// See `repos::prediction::settled_history`
    pub async fn settled_history(&mut self, username: &str, settling: &ArenaId) -> DbResult<Vec<bool>> {
        repos::prediction::settled_history(&mut self.tx, username, settling).await
    }

    pub async fn user_stats(&mut self, username: &str) -> DbResult<Option<UserStats>> {
        repos::user_stats::find(&mut self.tx, username).await
    }

    pub async fn upsert_user_stats(&mut self, stats: &UserStats) -> DbResult<()> {
        repos::user_stats::upsert(&mut self.tx, stats).await
    }

    pub async fn stats_already_applied(&mut self, arena_id: &ArenaId) -> DbResult<bool> {
        repos::user_stats::is_applied(&mut self.tx, arena_id).await
    }

    pub async fn mark_stats_applied(&mut self, arena_id: &ArenaId, applied_at: DateTime<Utc>) -> DbResult<()> {
        repos::user_stats::mark_applied(&mut self.tx, arena_id, applied_at).await
    }
}
