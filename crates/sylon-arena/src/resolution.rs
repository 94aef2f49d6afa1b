//! Resolution engine
//!
//! Moves expired OPEN arenas to RESOLVED. The verdict comes from the oracle
//! registered for the arena's type; the status change and the stats update
//! are committed in one transaction. Oracle calls happen before that
//! transaction is opened and are bounded by `oracle_timeout`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sylon_db::ArenaStore;
use sylon_types::{Arena, ArenaId, Outcome};
use tracing::{debug, error, info, warn};

use crate::error::{ArenaError, ArenaResult, OracleError};
use crate::oracle::{OracleRegistry, Verdict};
use crate::stats::{StatsAggregator, StatsApplication};

/// Default bound on a single oracle invocation
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of resolving one arena
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Arena),
    /// Left OPEN for an operator to confirm
    AwaitingManual,
}

/// Summary of one resolution sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub resolved: Vec<Arena>,
    /// Arenas left OPEN for this tick, with the reason
    pub deferred: Vec<(ArenaId, String)>,
    pub awaiting_manual: Vec<ArenaId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.deferred.is_empty() && self.awaiting_manual.is_empty()
    }
}

pub struct ResolutionEngine {
    store: ArenaStore,
    oracles: OracleRegistry,
    oracle_timeout: Duration,
}

impl ResolutionEngine {
    pub fn new(store: ArenaStore, oracles: OracleRegistry) -> Self {
        Self {
            store,
            oracles,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Resolve every OPEN arena whose deadline is at or before `now`.
    ///
    /// Arenas are independent: a failure on one is recorded in the report
    /// and the sweep moves on. Only a failure to list arenas fails the sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) -> ArenaResult<SweepReport> {
        let expired = self.store.list_expired_open_arenas(now).await?;
        let mut report = SweepReport::default();

        for arena in expired {
            match self.resolve_arena(&arena, now).await {
                Ok(Resolution::Resolved(resolved)) => report.resolved.push(resolved),
                Ok(Resolution::AwaitingManual) => report.awaiting_manual.push(arena.arena_id),
                Err(ArenaError::AlreadyResolved(_)) => {
                    debug!(arena_id = %arena.arena_id, "Arena resolved concurrently, skipping");
                }
                Err(e) if e.is_deferrable() => {
                    warn!(arena_id = %arena.arena_id, error = %e, "Resolution deferred");
                    report.deferred.push((arena.arena_id, e.to_string()));
                }
                Err(e) => {
                    error!(arena_id = %arena.arena_id, error = %e, "Resolution failed");
                    report.deferred.push((arena.arena_id, e.to_string()));
                }
            }
        }

        if !report.is_empty() {
            info!(
                resolved = report.resolved.len(),
                deferred = report.deferred.len(),
                awaiting_manual = report.awaiting_manual.len(),
                "Resolution sweep complete"
            );
        }
        Ok(report)
    }

    /// Resolve one expired arena through its type's oracle
    pub async fn resolve_arena(&self, arena: &Arena, now: DateTime<Utc>) -> ArenaResult<Resolution> {
        if !arena.is_open() {
            return Err(ArenaError::AlreadyResolved(arena.arena_id.to_string()));
        }
        if !arena.is_expired(now) {
            return Err(ArenaError::DeadlineNotReached(arena.arena_id.to_string()));
        }

        let arena_type = arena.arena_type();
        let oracle = self.oracles.get(arena_type).ok_or(ArenaError::NoOracle(arena_type))?;

        let verdict = tokio::time::timeout(self.oracle_timeout, oracle.decide(arena))
            .await
            .map_err(|_| ArenaError::from(OracleError::Timeout(self.oracle_timeout)))??;

        match verdict {
            Verdict::Decided {
                outcome,
                resolved_price,
            } => {
                let resolved = self.commit(&arena.arena_id, outcome, resolved_price, now).await?;
                Ok(Resolution::Resolved(resolved))
            }
            Verdict::AwaitingManual => {
                debug!(arena_id = %arena.arena_id, "Arena awaiting manual resolution");
                Ok(Resolution::AwaitingManual)
            }
        }
    }

    /// Operator-supplied outcome for an arena whose type resolves manually.
    ///
    /// Allowed before the deadline; resolving closes the arena to predictions.
    pub async fn resolve_manual(
        &self,
        arena_id: &str,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> ArenaResult<Arena> {
        let id = ArenaId::parse(arena_id.trim()).map_err(|_| ArenaError::ArenaNotFound(arena_id.to_string()))?;
        let arena = self
            .store
            .get_arena(&id)
            .await?
            .ok_or_else(|| ArenaError::ArenaNotFound(id.to_string()))?;

        if !arena.is_open() {
            return Err(ArenaError::AlreadyResolved(id.to_string()));
        }

        let arena_type = arena.arena_type();
        let manual = self.oracles.get(arena_type).map(|o| o.is_manual()).unwrap_or(false);
        if !manual {
            return Err(ArenaError::ManualResolutionNotAllowed {
                arena_id: id.to_string(),
                arena_type,
            });
        }

        self.commit(&id, outcome, None, now).await
    }

    /// Status change and stats application in a single transaction
    async fn commit(
        &self,
        arena_id: &ArenaId,
        outcome: Outcome,
        resolved_price: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> ArenaResult<Arena> {
        let mut tx = self.store.begin().await?;
        let arena = tx
            .transition_to_resolved(arena_id, outcome, resolved_price, now)
            .await?;
        let applied = StatsAggregator::apply_within(&mut tx, &arena, now).await?;
        tx.commit().await?;

        let users = match applied {
            StatsApplication::Applied { users } => users,
            StatsApplication::AlreadyApplied => 0,
        };
        info!(
            arena_id = %arena.arena_id,
            outcome = %outcome,
            resolved_price = ?arena.resolved_price,
            users,
            "Arena resolved"
        );
        Ok(arena)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rust_decimal_macros::dec;
    use sylon_types::{ArenaCondition, ArenaStatus, ArenaType};

    use crate::oracle::PriceOracle;

    struct FixedPrice(Decimal);

    #[async_trait]
    impl PriceOracle for FixedPrice {
        async fn get_price(&self, _symbol: &str) -> Result<Decimal, OracleError> {
            Ok(self.0)
        }
    }

    struct Hanging;

    #[async_trait]
    impl PriceOracle for Hanging {
        async fn get_price(&self, _symbol: &str) -> Result<Decimal, OracleError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Decimal::ZERO)
        }
    }

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    async fn seed(store: &ArenaStore, seq: u32, condition: ArenaCondition) -> Arena {
        let arena = Arena {
            arena_id: ArenaId::for_slot(created().date_naive(), seq),
            asset: condition.arena_type().is_price_based().then(|| "BTC".to_string()),
            condition,
            question: "q".to_string(),
            rules: "r".to_string(),
            deadline: created() + ChronoDuration::days(2),
            status: ArenaStatus::Open,
            outcome: None,
            resolved_price: None,
            created_at: created(),
            resolved_at: None,
        };
        store.create_arena(&arena).await.unwrap();
        arena
    }

    fn after_deadline() -> DateTime<Utc> {
        created() + ChronoDuration::days(2)
    }

    #[tokio::test]
    async fn test_resolve_price_arena() {
        let store = ArenaStore::in_memory().await.unwrap();
        let engine = ResolutionEngine::new(
            store.clone(),
            OracleRegistry::with_defaults(Arc::new(FixedPrice(dec!(84000)))),
        );
        let arena = seed(&store, 1, ArenaCondition::StayAbove { floor: dec!(85000) }).await;

        let resolution = engine.resolve_arena(&arena, after_deadline()).await.unwrap();
        let Resolution::Resolved(resolved) = resolution else {
            panic!("expected resolution");
        };
        assert_eq!(resolved.status, ArenaStatus::Resolved);
        assert_eq!(resolved.outcome, Some(Outcome::No));
        assert_eq!(resolved.resolved_price, Some(dec!(84000)));
        assert_eq!(resolved.resolved_at, Some(after_deadline()));
        assert!(store.stats_already_applied(&arena.arena_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_not_expired_is_rejected() {
        let store = ArenaStore::in_memory().await.unwrap();
        let engine = ResolutionEngine::new(
            store.clone(),
            OracleRegistry::with_defaults(Arc::new(FixedPrice(dec!(1)))),
        );
        let arena = seed(&store, 1, ArenaCondition::HitTarget { target: dec!(90000) }).await;

        let err = engine.resolve_arena(&arena, created()).await.unwrap_err();
        assert!(matches!(err, ArenaError::DeadlineNotReached(_)));
    }

    #[tokio::test]
    async fn test_oracle_timeout_defers() {
        let store = ArenaStore::in_memory().await.unwrap();
        let engine = ResolutionEngine::new(store.clone(), OracleRegistry::with_defaults(Arc::new(Hanging)))
            .with_oracle_timeout(Duration::from_millis(20));
        let arena = seed(&store, 1, ArenaCondition::HitTarget { target: dec!(90000) }).await;

        let report = engine.sweep(after_deadline()).await.unwrap();
        assert!(report.resolved.is_empty());
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(report.deferred[0].0, arena.arena_id);

        let stored = store.get_arena(&arena.arena_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArenaStatus::Open);
    }

    #[tokio::test]
    async fn test_missing_oracle_defers() {
        let store = ArenaStore::in_memory().await.unwrap();
        let engine = ResolutionEngine::new(store.clone(), OracleRegistry::new());
        seed(&store, 1, ArenaCondition::HitTarget { target: dec!(90000) }).await;

        let report = engine.sweep(after_deadline()).await.unwrap();
        assert_eq!(report.deferred.len(), 1);
        assert!(report.deferred[0].1.contains("HIT_TARGET"));
    }

    #[tokio::test]
    async fn test_manual_resolution_rules() {
        let store = ArenaStore::in_memory().await.unwrap();
        let engine = ResolutionEngine::new(
            store.clone(),
            OracleRegistry::with_defaults(Arc::new(FixedPrice(dec!(1)))),
        );
        let price = seed(&store, 1, ArenaCondition::HitTarget { target: dec!(90000) }).await;
        let macro_arena = seed(&store, 2, ArenaCondition::Macro).await;

        let err = engine
            .resolve_manual(price.arena_id.as_str(), Outcome::Yes, created())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ArenaError::ManualResolutionNotAllowed { arena_type: ArenaType::HitTarget, .. }
        ));

        // Before the deadline is fine for operator-confirmed arenas
        let resolved = engine
            .resolve_manual(macro_arena.arena_id.as_str(), Outcome::Yes, created())
            .await
            .unwrap();
        assert_eq!(resolved.outcome, Some(Outcome::Yes));
        assert_eq!(resolved.resolved_price, None);

        let err = engine
            .resolve_manual(macro_arena.arena_id.as_str(), Outcome::No, created())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::AlreadyResolved(_)));

        let err = engine
            .resolve_manual("SYLON-20261019-042", Outcome::No, created())
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::ArenaNotFound(_)));
    }
}
