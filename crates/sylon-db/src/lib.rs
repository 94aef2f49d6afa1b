//! Sylon Database Layer
//!
//! Durable state for prediction arenas, backed by SQLite through SQLx.
//!
//! # Tables
//!
//! - **arenas**: one row per arena, keyed by `SYLON-YYYYMMDD-NNN`
//! - **predictions**: one row per `(arena_id, username)`
//! - **user_stats**: accuracy and streaks per user
//! - **stats_applied**: marker row per arena whose outcome has been folded
//!   into `user_stats`
//!
//! `ArenaStore` is the only writer of these tables. Multi-step writes
//! (quota-checked creation, resolution plus stats) go through a `StoreTx`
//! so they commit or roll back as a unit.

pub mod config;
pub mod error;
pub mod models;
pub mod repos;
mod tx;

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sylon_types::{Arena, ArenaId, LeaderboardEntry, Outcome, Prediction, UserStats};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use models::*;
pub use tx::StoreTx;

/// Schema statements, applied in order by `init`. Every statement is
/// idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS arenas (
        arena_id TEXT PRIMARY KEY,
        arena_type TEXT NOT NULL,
        asset TEXT,
        question TEXT NOT NULL,
        target TEXT,
        floor TEXT,
        deadline TEXT NOT NULL,
        rules TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('OPEN', 'RESOLVED')),
        outcome TEXT CHECK (outcome IN ('YES', 'NO')),
        resolved_price TEXT,
        created_at TEXT NOT NULL,
        resolved_at TEXT,
        CHECK ((status = 'RESOLVED') = (resolved_at IS NOT NULL))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_arenas_status ON arenas(status)",
    r#"
    CREATE TABLE IF NOT EXISTS predictions (
        arena_id TEXT NOT NULL REFERENCES arenas(arena_id),
        username TEXT NOT NULL,
        prediction TEXT NOT NULL CHECK (prediction IN ('YES', 'NO')),
        created_at TEXT NOT NULL,
        PRIMARY KEY (arena_id, username)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_stats (
        username TEXT PRIMARY KEY,
        total_predictions INTEGER NOT NULL DEFAULT 0,
        wins INTEGER NOT NULL DEFAULT 0,
        losses INTEGER NOT NULL DEFAULT 0,
        current_streak INTEGER NOT NULL DEFAULT 0,
        max_streak INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stats_applied (
        arena_id TEXT PRIMARY KEY REFERENCES arenas(arena_id),
        applied_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS arenas_resolved_immutable
    BEFORE UPDATE ON arenas WHEN OLD.status = 'RESOLVED'
    BEGIN
        SELECT RAISE(ABORT, 'arena already resolved');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS arenas_never_deleted
    BEFORE DELETE ON arenas
    BEGIN
        SELECT RAISE(ABORT, 'arenas are never deleted');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS predictions_immutable
    BEFORE UPDATE ON predictions
    BEGIN
        SELECT RAISE(ABORT, 'predictions are immutable');
    END
    "#,
];

/// Persistent repository for arenas, predictions and user stats
#[derive(Clone)]
pub struct ArenaStore {
    pool: SqlitePool,
    /// Serializes quota check + insert on the creation path
    creation_lock: Arc<Mutex<()>>,
}

impl ArenaStore {
    /// Open (creating if missing) the database named by `config`
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        if let Some(parent) = config.file_path().and_then(|p| Path::new(p).parent()) {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::Connection(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::Connection(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(format!("SQLite: {}", e)))?;

        let store = Self::from_pool(pool);
        store.init().await?;

        info!(url = %config.url, "Arena store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::Connection(e.to_string()))?
            .foreign_keys(true);

        // A single connection that is never recycled, otherwise the
        // in-memory database vanishes with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(format!("SQLite: {}", e)))?;

        let store = Self::from_pool(pool);
        store.init().await?;

        debug!("In-memory arena store initialized");
        Ok(store)
    }

    fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            creation_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Idempotent schema setup
    pub async fn init(&self) -> DbResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    /// Start a transaction over the store
    pub async fn begin(&self) -> DbResult<StoreTx> {
        Ok(StoreTx::new(self.pool.begin().await?))
    }

    // =========================================================================
    // Arena Operations
    // =========================================================================

    /// Insert a new arena; fails with `DuplicateArenaId` if the id exists
    pub async fn create_arena(&self, arena: &Arena) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        repos::arena::insert(&mut conn, arena).await
    }

    /// Count today's arenas and, if below `limit`, insert the arena built
    /// from that count, all in one transaction. Concurrent callers on this
    /// store are serialized; returns `None` once the quota is reached.
    pub async fn create_arena_within_quota<F>(
        &self,
        day: NaiveDate,
        limit: u32,
        build: F,
    ) -> DbResult<Option<Arena>>
    where
        F: FnOnce(u32) -> Arena,
    {
        let _guard = self.creation_lock.lock().await;

        let mut tx = self.begin().await?;
        let count = tx.count_arenas_for_day(day).await?;
        if count >= limit {
            tx.rollback().await?;
            debug!(%day, count, limit, "Daily arena quota reached");
            return Ok(None);
        }

        let arena = build(count);
        tx.create_arena(&arena).await?;
        tx.commit().await?;

        Ok(Some(arena))
    }

    /// Standalone OPEN → RESOLVED transition, returning the updated arena.
    ///
    /// Resolution in the engine goes through `StoreTx` instead so the stats
    /// update lands in the same transaction.
    pub async fn transition_to_resolved(
        &self,
        arena_id: &ArenaId,
        outcome: Outcome,
        resolved_price: Option<Decimal>,
        resolved_at: DateTime<Utc>,
    ) -> DbResult<Arena> {
        let mut tx = self.begin().await?;
        let arena = tx
            .transition_to_resolved(arena_id, outcome, resolved_price, resolved_at)
            .await?;
        tx.commit().await?;
        Ok(arena)
    }

    pub async fn count_arenas_for_day(&self, day: NaiveDate) -> DbResult<u32> {
        let mut conn = self.pool.acquire().await?;
        repos::arena::count_for_day(&mut conn, day).await
    }

    pub async fn get_arena(&self, arena_id: &ArenaId) -> DbResult<Option<Arena>> {
        let mut conn = self.pool.acquire().await?;
        repos::arena::find(&mut conn, arena_id).await
    }

    pub async fn list_open_arenas(&self) -> DbResult<Vec<Arena>> {
        let mut conn = self.pool.acquire().await?;
        repos::arena::list_open(&mut conn).await
    }

    /// OPEN arenas whose deadline is at or before `now`
    pub async fn list_expired_open_arenas(&self, now: DateTime<Utc>) -> DbResult<Vec<Arena>> {
        let open = self.list_open_arenas().await?;
        Ok(open.into_iter().filter(|a| a.is_expired(now)).collect())
    }

    pub async fn list_arenas_for_day(&self, day: NaiveDate) -> DbResult<Vec<Arena>> {
        let mut conn = self.pool.acquire().await?;
        repos::arena::list_for_day(&mut conn, day).await
    }

    pub async fn list_resolved_pending_stats(&self) -> DbResult<Vec<Arena>> {
        let mut conn = self.pool.acquire().await?;
        repos::arena::list_resolved_pending_stats(&mut conn).await
    }

    // =========================================================================
    // Prediction Operations
    // =========================================================================

    /// Fails with `DuplicatePrediction` on a repeat `(arena_id, username)`
    /// and `NotFound` if the arena does not exist
    pub async fn record_prediction(&self, prediction: &Prediction) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        repos::prediction::insert(&mut conn, prediction).await
    }

    pub async fn get_prediction(&self, arena_id: &ArenaId, username: &str) -> DbResult<Option<Prediction>> {
        let mut conn = self.pool.acquire().await?;
        repos::prediction::find(&mut conn, arena_id, username).await
    }

    pub async fn get_predictions_for_arena(&self, arena_id: &ArenaId) -> DbResult<Vec<Prediction>> {
        let mut conn = self.pool.acquire().await?;
        repos::prediction::list_for_arena(&mut conn, arena_id).await
    }

    // =========================================================================
    // Stats Operations
    // =========================================================================

    pub async fn get_user_stats(&self, username: &str) -> DbResult<Option<UserStats>> {
        let mut conn = self.pool.acquire().await?;
        repos::user_stats::find(&mut conn, username).await
    }

    pub async fn upsert_user_stats(&self, stats: &UserStats) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        repos::user_stats::upsert(&mut conn, stats).await
    }

    pub async fn mark_stats_applied(&self, arena_id: &ArenaId, applied_at: DateTime<Utc>) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        repos::user_stats::mark_applied(&mut conn, arena_id, applied_at).await
    }

    pub async fn stats_already_applied(&self, arena_id: &ArenaId) -> DbResult<bool> {
        let mut conn = self.pool.acquire().await?;
        repos::user_stats::is_applied(&mut conn, arena_id).await
    }

    /// Top `limit` users by accuracy, then wins
    pub async fn leaderboard(&self, limit: u32) -> DbResult<Vec<LeaderboardEntry>> {
        let mut conn = self.pool.acquire().await?;
        repos::user_stats::leaderboard(&mut conn, limit).await
    }
}
