//! Stats aggregation
//!
//! Folds the predictions of a resolved arena into per-user stats exactly
//! once. The `stats_applied` marker written in the same transaction is what
//! makes a retry or a restart safe.
//!
//! Streaks follow arena deadline order rather than resolution order, so an
//! arena whose oracle was deferred, or a MACRO arena confirmed late, slots
//! into the user's history where it belongs.

use chrono::{DateTime, Utc};
use sylon_db::{ArenaStore, StoreTx};
use sylon_types::{Arena, UserStats};
use tracing::{debug, info, warn};

use crate::error::{ArenaError, ArenaResult};

/// Result of applying an arena's outcome to user stats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsApplication {
    /// Stats updated for this many users
    Applied { users: usize },
    /// The arena's marker was already present; nothing written
    AlreadyApplied,
}

#[derive(Clone)]
pub struct StatsAggregator {
    store: ArenaStore,
}

impl StatsAggregator {
    pub fn new(store: ArenaStore) -> Self {
        Self { store }
    }

    /// Apply `arena`'s outcome inside an open transaction.
    ///
    /// Used by resolution so the status change and the stats land together.
    pub async fn apply_within(
        tx: &mut StoreTx,
        arena: &Arena,
        now: DateTime<Utc>,
    ) -> ArenaResult<StatsApplication> {
        let outcome = arena
            .outcome
            .filter(|_| !arena.is_open())
            .ok_or_else(|| ArenaError::InvalidArena(format!("{} is not resolved", arena.arena_id)))?;

        if tx.stats_already_applied(&arena.arena_id).await? {
            debug!(arena_id = %arena.arena_id, "Stats already applied");
            return Ok(StatsApplication::AlreadyApplied);
        }

        let predictions = tx.predictions_for_arena(&arena.arena_id).await?;
        for prediction in &predictions {
            let mut stats = tx
                .user_stats(&prediction.username)
                .await?
                .unwrap_or_else(|| UserStats::new(prediction.username.clone()));
            let history = tx.settled_history(&prediction.username, &arena.arena_id).await?;
            stats.settle(prediction.is_correct(outcome), &history);
            tx.upsert_user_stats(&stats).await?;
        }

        tx.mark_stats_applied(&arena.arena_id, now).await?;

        Ok(StatsApplication::Applied {
            users: predictions.len(),
        })
    }

    /// Apply in a transaction of its own; a no-op if already applied
    pub async fn apply_resolution(&self, arena: &Arena, now: DateTime<Utc>) -> ArenaResult<StatsApplication> {
        let mut tx = self.store.begin().await?;
        let applied = Self::apply_within(&mut tx, arena, now).await?;
        tx.commit().await?;

        if let StatsApplication::Applied { users } = applied {
            info!(arena_id = %arena.arena_id, users, "Stats applied");
        }
        Ok(applied)
    }

    /// Apply stats for every resolved arena that has no marker yet.
    ///
    /// Returns the number of arenas repaired. Resolution writes stats in the
    /// same transaction, so this only finds work after an external write or
    /// an interrupted run.
    pub async fn repair_pending(&self, now: DateTime<Utc>) -> ArenaResult<usize> {
        let pending = self.store.list_resolved_pending_stats().await?;
        let mut repaired = 0;

        for arena in &pending {
            warn!(arena_id = %arena.arena_id, "Resolved arena missing stats, applying");
            if let StatsApplication::Applied { .. } = self.apply_resolution(arena, now).await? {
                repaired += 1;
            }
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use sylon_types::{ArenaCondition, ArenaId, ArenaStatus, Outcome, Prediction};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    async fn arena_with_predictions(store: &ArenaStore, seq: u32, calls: &[(&str, Outcome)]) -> ArenaId {
        let arena = Arena {
            arena_id: ArenaId::for_slot(now().date_naive(), seq),
            condition: ArenaCondition::StayAbove { floor: dec!(85000) },
            asset: Some("BTC".to_string()),
            question: "q".to_string(),
            rules: "r".to_string(),
            deadline: now() + Duration::days(2),
            status: ArenaStatus::Open,
            outcome: None,
            resolved_price: None,
            created_at: now(),
            resolved_at: None,
        };
        store.create_arena(&arena).await.unwrap();
        for (username, call) in calls {
            store
                .record_prediction(&Prediction {
                    arena_id: arena.arena_id.clone(),
                    username: username.to_string(),
                    prediction: *call,
                    created_at: now(),
                })
                .await
                .unwrap();
        }
        arena.arena_id
    }

    #[tokio::test]
    async fn test_apply_resolution_once() {
        let store = ArenaStore::in_memory().await.unwrap();
        let aggregator = StatsAggregator::new(store.clone());
        let id = arena_with_predictions(&store, 1, &[("alice", Outcome::Yes), ("bob", Outcome::No)]).await;

        let arena = store
            .transition_to_resolved(&id, Outcome::Yes, Some(dec!(86000)), now())
            .await
            .unwrap();

        assert_eq!(
            aggregator.apply_resolution(&arena, now()).await.unwrap(),
            StatsApplication::Applied { users: 2 }
        );
        assert_eq!(
            aggregator.apply_resolution(&arena, now()).await.unwrap(),
            StatsApplication::AlreadyApplied
        );

        let alice = store.get_user_stats("alice").await.unwrap().unwrap();
        assert_eq!((alice.total_predictions, alice.wins, alice.current_streak), (1, 1, 1));
        let bob = store.get_user_stats("bob").await.unwrap().unwrap();
        assert_eq!((bob.total_predictions, bob.losses, bob.current_streak), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_open_arena_is_rejected() {
        let store = ArenaStore::in_memory().await.unwrap();
        let aggregator = StatsAggregator::new(store.clone());
        let id = arena_with_predictions(&store, 1, &[("alice", Outcome::Yes)]).await;
        let arena = store.get_arena(&id).await.unwrap().unwrap();

        let err = aggregator.apply_resolution(&arena, now()).await.unwrap_err();
        assert!(matches!(err, ArenaError::InvalidArena(_)));
        assert!(store.get_user_stats("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repair_pending_applies_missing_stats() {
        let store = ArenaStore::in_memory().await.unwrap();
        let aggregator = StatsAggregator::new(store.clone());
        let first = arena_with_predictions(&store, 1, &[("carol", Outcome::No)]).await;
        let second = arena_with_predictions(&store, 2, &[("carol", Outcome::No)]).await;

        // Resolved without stats, as after an interrupted run
        store.transition_to_resolved(&first, Outcome::No, None, now()).await.unwrap();
        store.transition_to_resolved(&second, Outcome::No, None, now()).await.unwrap();

        assert_eq!(aggregator.repair_pending(now()).await.unwrap(), 2);
        assert_eq!(aggregator.repair_pending(now()).await.unwrap(), 0);

        let carol = store.get_user_stats("carol").await.unwrap().unwrap();
        assert_eq!(carol.total_predictions, 2);
        assert_eq!(carol.wins, 2);
        assert_eq!(carol.max_streak, 2);
    }
}
