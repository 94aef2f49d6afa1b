//! Prediction ledger: one immutable YES/NO call per user per arena

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sylon_db::ArenaStore;
use sylon_types::{normalize_username, ArenaId, Outcome, Prediction};
use tracing::{debug, info};

use crate::error::{ArenaError, ArenaResult};

/// Accepts predictions while an arena is open
#[derive(Clone)]
pub struct PredictionLedger {
    store: ArenaStore,
}

impl PredictionLedger {
    pub fn new(store: ArenaStore) -> Self {
        Self { store }
    }

    /// Record `username`'s call on `arena_id`.
    ///
    /// `value` is case-insensitive (`yes`, ` No `). Rejected once the arena
    /// is resolved or `now` has reached its deadline. The (arena, user)
    /// uniqueness is enforced by the store, so concurrent duplicates lose
    /// with `DuplicatePrediction`.
    pub async fn submit(
        &self,
        arena_id: &str,
        username: &str,
        value: &str,
        now: DateTime<Utc>,
    ) -> ArenaResult<Prediction> {
        let prediction = parse_prediction(value)?;

        let username_norm = normalize_username(username);
        if username_norm.is_empty() {
            return Err(ArenaError::InvalidUsername(username.to_string()));
        }

        let arena_id =
            ArenaId::parse(arena_id.trim()).map_err(|_| ArenaError::ArenaNotFound(arena_id.to_string()))?;
        let arena = self
            .store
            .get_arena(&arena_id)
            .await?
            .ok_or_else(|| ArenaError::ArenaNotFound(arena_id.to_string()))?;

        if !arena.accepts_predictions(now) {
            debug!(arena_id = %arena_id, username = %username_norm, status = %arena.status, "Late prediction rejected");
            return Err(ArenaError::ArenaClosed(arena_id.to_string()));
        }

        let record = Prediction {
            arena_id,
            username: username_norm,
            prediction,
            created_at: now,
        };
        self.store.record_prediction(&record).await?;

        info!(
            arena_id = %record.arena_id,
            username = %record.username,
            prediction = %record.prediction,
            "Prediction recorded"
        );
        Ok(record)
    }
}

/// `yes` / `NO` / ` Yes ` → Outcome
pub fn parse_prediction(value: &str) -> ArenaResult<Outcome> {
    Outcome::from_str(&value.trim().to_uppercase())
        .map_err(|_| ArenaError::InvalidPrediction(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use sylon_types::{Arena, ArenaCondition, ArenaStatus};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    async fn setup() -> (PredictionLedger, ArenaStore, ArenaId) {
        let store = ArenaStore::in_memory().await.unwrap();
        let arena = Arena {
            arena_id: ArenaId::for_slot(now().date_naive(), 1),
            condition: ArenaCondition::HitTarget { target: dec!(90000) },
            asset: Some("BTC".to_string()),
            question: "q".to_string(),
            rules: "r".to_string(),
            deadline: now() + Duration::days(3),
            status: ArenaStatus::Open,
            outcome: None,
            resolved_price: None,
            created_at: now(),
            resolved_at: None,
        };
        store.create_arena(&arena).await.unwrap();
        (PredictionLedger::new(store.clone()), store, arena.arena_id)
    }

    #[test]
    fn test_parse_prediction() {
        assert_eq!(parse_prediction("yes").unwrap(), Outcome::Yes);
        assert_eq!(parse_prediction(" No ").unwrap(), Outcome::No);
        assert!(matches!(parse_prediction("maybe"), Err(ArenaError::InvalidPrediction(_))));
        assert!(matches!(parse_prediction(""), Err(ArenaError::InvalidPrediction(_))));
    }

    #[tokio::test]
    async fn test_submit_normalizes() {
        let (ledger, store, id) = setup().await;

        let p = ledger.submit(id.as_str(), "@Alice", "yes", now()).await.unwrap();
        assert_eq!(p.username, "alice");
        assert_eq!(p.prediction, Outcome::Yes);

        let stored = store.get_prediction(&id, "alice").await.unwrap().unwrap();
        assert_eq!(stored, p);
    }

    #[tokio::test]
    async fn test_duplicate_is_rejected_and_first_kept() {
        let (ledger, store, id) = setup().await;

        ledger.submit(id.as_str(), "alice", "YES", now()).await.unwrap();
        let err = ledger.submit(id.as_str(), "ALICE", "NO", now()).await.unwrap_err();
        assert!(matches!(err, ArenaError::DuplicatePrediction { .. }));

        let stored = store.get_prediction(&id, "alice").await.unwrap().unwrap();
        assert_eq!(stored.prediction, Outcome::Yes);
    }

    #[tokio::test]
    async fn test_rejections() {
        let (ledger, _store, id) = setup().await;

        let err = ledger.submit(id.as_str(), "alice", "maybe", now()).await.unwrap_err();
        assert!(matches!(err, ArenaError::InvalidPrediction(_)));

        let err = ledger.submit(id.as_str(), " @ ", "YES", now()).await.unwrap_err();
        assert!(matches!(err, ArenaError::InvalidUsername(_)));

        let err = ledger.submit("SYLON-20261019-009", "alice", "YES", now()).await.unwrap_err();
        assert!(matches!(err, ArenaError::ArenaNotFound(_)));

        let err = ledger.submit("not-an-id", "alice", "YES", now()).await.unwrap_err();
        assert!(matches!(err, ArenaError::ArenaNotFound(_)));
    }

    #[tokio::test]
    async fn test_closed_at_deadline() {
        let (ledger, _store, id) = setup().await;
        let deadline = now() + Duration::days(3);

        ledger
            .submit(id.as_str(), "early", "NO", deadline - Duration::seconds(1))
            .await
            .unwrap();
        let err = ledger.submit(id.as_str(), "late", "NO", deadline).await.unwrap_err();
        assert!(matches!(err, ArenaError::ArenaClosed(_)));
    }
}
