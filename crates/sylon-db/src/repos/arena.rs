//! Arena repository

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use sylon_types::{Arena, ArenaId, Outcome};

use crate::{DbArena, DbError, DbResult};

/// Insert a new OPEN arena. Never overwrites an existing row.
pub async fn insert(conn: &mut SqliteConnection, arena: &Arena) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO arenas (arena_id, arena_type, asset, question, target, floor, deadline,
            rules, status, outcome, resolved_price, created_at, resolved_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(arena.arena_id.as_str())
    .bind(arena.arena_type().as_str())
    .bind(&arena.asset)
    .bind(&arena.question)
    .bind(arena.target().map(|d| d.to_string()))
    .bind(arena.floor().map(|d| d.to_string()))
    .bind(arena.deadline)
    .bind(&arena.rules)
    .bind(arena.status.as_str())
    .bind(arena.outcome.map(|o| o.as_str()))
    .bind(arena.resolved_price.map(|d| d.to_string()))
    .bind(arena.created_at)
    .bind(arena.resolved_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if DbError::is_unique_violation(&e) {
            DbError::DuplicateArenaId(arena.arena_id.to_string())
        } else {
            DbError::Query(e)
        }
    })?;
    Ok(())
}

pub async fn find(conn: &mut SqliteConnection, arena_id: &ArenaId) -> DbResult<Option<Arena>> {
    let row = sqlx::query_as::<_, DbArena>("SELECT * FROM arenas WHERE arena_id = ?")
        .bind(arena_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.map(Arena::try_from).transpose()
}

/// OPEN → RESOLVED. Only touches the resolution columns, and only while the
/// row is still OPEN. MACRO rows never store a price.
pub async fn mark_resolved(
    conn: &mut SqliteConnection,
    arena_id: &ArenaId,
    outcome: Outcome,
    resolved_price: Option<Decimal>,
    resolved_at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE arenas
        SET status = 'RESOLVED',
            outcome = ?,
            resolved_price = CASE WHEN arena_type IN ('HIT_TARGET', 'STAY_ABOVE') THEN ? END,
            resolved_at = ?
        WHERE arena_id = ? AND status = 'OPEN'
        "#,
    )
    .bind(outcome.as_str())
    .bind(resolved_price.map(|d| d.to_string()))
    .bind(resolved_at)
    .bind(arena_id.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return match find(conn, arena_id).await? {
            Some(_) => Err(DbError::AlreadyResolved(arena_id.to_string())),
            None => Err(DbError::NotFound(arena_id.to_string())),
        };
    }
    Ok(())
}

/// Arenas whose id carries `day`'s prefix
pub async fn count_for_day(conn: &mut SqliteConnection, day: NaiveDate) -> DbResult<u32> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM arenas WHERE arena_id LIKE ?")
        .bind(format!("{}%", ArenaId::day_prefix(day)))
        .fetch_one(&mut *conn)
        .await?;
    u32::try_from(count).map_err(|_| DbError::InvalidData(format!("arena count {count}")))
}

pub async fn list_for_day(conn: &mut SqliteConnection, day: NaiveDate) -> DbResult<Vec<Arena>> {
    let rows = sqlx::query_as::<_, DbArena>(
        "SELECT * FROM arenas WHERE arena_id LIKE ? ORDER BY arena_id",
    )
    .bind(format!("{}%", ArenaId::day_prefix(day)))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Arena::try_from).collect()
}

pub async fn list_open(conn: &mut SqliteConnection) -> DbResult<Vec<Arena>> {
    let rows = sqlx::query_as::<_, DbArena>(
        "SELECT * FROM arenas WHERE status = 'OPEN' ORDER BY arena_id",
    )
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Arena::try_from).collect()
}

/// RESOLVED arenas that have no stats marker yet
pub async fn list_resolved_pending_stats(conn: &mut SqliteConnection) -> DbResult<Vec<Arena>> {
    let rows = sqlx::query_as::<_, DbArena>(
        r#"
        SELECT a.* FROM arenas a
        LEFT JOIN stats_applied s ON s.arena_id = a.arena_id
        WHERE a.status = 'RESOLVED' AND s.arena_id IS NULL
        ORDER BY a.resolved_at, a.arena_id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Arena::try_from).collect()
}
