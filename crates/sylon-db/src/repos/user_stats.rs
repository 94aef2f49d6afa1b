//! User stats repository, stats-applied markers and the leaderboard query

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use sylon_types::{ArenaId, LeaderboardEntry, UserStats};

use crate::{DbError, DbLeaderboardRow, DbResult, DbUserStats};

pub async fn find(conn: &mut SqliteConnection, username: &str) -> DbResult<Option<UserStats>> {
    let row = sqlx::query_as::<_, DbUserStats>("SELECT * FROM user_stats WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(UserStats::try_from).transpose()
}

pub async fn upsert(conn: &mut SqliteConnection, stats: &UserStats) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO user_stats (username, total_predictions, wins, losses, current_streak, max_streak)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(username) DO UPDATE SET
            total_predictions = excluded.total_predictions,
            wins = excluded.wins,
            losses = excluded.losses,
            current_streak = excluded.current_streak,
            max_streak = excluded.max_streak
        "#,
    )
    .bind(&stats.username)
    .bind(i64::from(stats.total_predictions))
    .bind(i64::from(stats.wins))
    .bind(i64::from(stats.losses))
    .bind(i64::from(stats.current_streak))
    .bind(i64::from(stats.max_streak))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn is_applied(conn: &mut SqliteConnection, arena_id: &ArenaId) -> DbResult<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT arena_id FROM stats_applied WHERE arena_id = ?")
        .bind(arena_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub async fn mark_applied(
    conn: &mut SqliteConnection,
    arena_id: &ArenaId,
    applied_at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query("INSERT INTO stats_applied (arena_id, applied_at) VALUES (?, ?)")
        .bind(arena_id.as_str())
        .bind(applied_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if DbError::is_unique_violation(&e) {
                DbError::StatsAlreadyApplied(arena_id.to_string())
            } else if DbError::is_foreign_key_violation(&e) {
                DbError::NotFound(arena_id.to_string())
            } else {
                DbError::Query(e)
            }
        })?;
    Ok(())
}

/// Users with at least one settled prediction, best accuracy first, then
/// most wins.
pub async fn leaderboard(conn: &mut SqliteConnection, limit: u32) -> DbResult<Vec<LeaderboardEntry>> {
    let rows = sqlx::query_as::<_, DbLeaderboardRow>(
        r#"
        SELECT
            username,
            total_predictions,
            wins,
            losses,
            ROUND((wins * 100.0) / total_predictions, 2) AS accuracy,
            current_streak,
            max_streak
        FROM user_stats
        WHERE total_predictions > 0
        ORDER BY accuracy DESC, wins DESC, username ASC
        LIMIT ?
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .zip(1u32..)
        .map(|(row, rank)| row.into_entry(rank))
        .collect()
}
