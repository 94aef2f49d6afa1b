//! Prediction repository

use sqlx::SqliteConnection;
use sylon_types::{ArenaId, Prediction};

use crate::{DbError, DbPrediction, DbResult};

/// Record a prediction. The `(arena_id, username)` primary key is the
/// authority on uniqueness, not a prior lookup.
pub async fn insert(conn: &mut SqliteConnection, prediction: &Prediction) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO predictions (arena_id, username, prediction, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(prediction.arena_id.as_str())
    .bind(&prediction.username)
    .bind(prediction.prediction.as_str())
    .bind(prediction.created_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if DbError::is_unique_violation(&e) {
            DbError::DuplicatePrediction {
                arena_id: prediction.arena_id.to_string(),
                username: prediction.username.clone(),
            }
        } else if DbError::is_foreign_key_violation(&e) {
            DbError::NotFound(prediction.arena_id.to_string())
        } else {
            DbError::Query(e)
        }
    })?;
    Ok(())
}

pub async fn find(
    conn: &mut SqliteConnection,
    arena_id: &ArenaId,
    username: &str,
) -> DbResult<Option<Prediction>> {
    let row = sqlx::query_as::<_, DbPrediction>(
        "SELECT * FROM predictions WHERE arena_id = ? AND username = ?",
    )
    .bind(arena_id.as_str())
    .bind(username)
    .fetch_optional(&mut *conn)
    .await?;
    row.map(Prediction::try_from).transpose()
}

pub async fn list_for_arena(conn: &mut SqliteConnection, arena_id: &ArenaId) -> DbResult<Vec<Prediction>> {
    let rows = sqlx::query_as::<_, DbPrediction>(
        "SELECT * FROM predictions WHERE arena_id = ? ORDER BY created_at, username",
    )
    .bind(arena_id.as_str())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Prediction::try_from).collect()
}

/// Correctness of `username`'s settled predictions in arena deadline order.
///
/// Settled means the arena's stats were applied, plus `settling`, the arena
/// whose stats are being applied now.
pub async fn settled_history(
    conn: &mut SqliteConnection,
    username: &str,
    settling: &ArenaId,
) -> DbResult<Vec<bool>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT CAST(p.prediction = a.outcome AS INTEGER) AS correct
        FROM predictions p
        JOIN arenas a ON a.arena_id = p.arena_id
        LEFT JOIN stats_applied s ON s.arena_id = a.arena_id
        WHERE p.username = ?
          AND a.status = 'RESOLVED'
          AND (s.arena_id IS NOT NULL OR a.arena_id = ?)
        ORDER BY a.deadline, a.arena_id
        "#,
    )
    .bind(username)
    .bind(settling.as_str())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(correct,)| correct != 0).collect())
}
