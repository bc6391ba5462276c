use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::models::MilestoneHistoryRow;
use crate::error::{AppError, Result};
use crate::types::{now_ns, PollOrigin};

pub const LAST_ACTED_KEY: &str = "milestone.lastActedThreshold";

/// Persisted "last threshold announced" record.
///
/// `check_and_advance` is the only way the value moves forward. The advance is
/// a conditional UPDATE inside one SQLite write transaction, so any number of
/// pollers (in this process or another one sharing the file) observing the
/// same crossing produce exactly one winner.
#[derive(Clone)]
pub struct MilestoneTracker {
    pool: SqlitePool,
}

impl MilestoneTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the crossed threshold if this caller is the one that advanced
    /// the record, `None` otherwise. Never mutates state on `None`.
    pub async fn check_and_advance(
        &self,
        total_count: u64,
        threshold_step: u64,
        origin: PollOrigin,
    ) -> Result<Option<u64>> {
        if threshold_step == 0 {
            return Ok(None);
        }
        let candidate = (total_count / threshold_step) * threshold_step;
        // last_acted starts at 0 and candidate must be strictly greater.
        if candidate == 0 {
            return Ok(None);
        }
        let candidate_i64 = to_i64(candidate)?;
        let now = now_ns() as i64;

        let mut tx = self.pool.begin().await?;

        // Opening with a write takes the database write lock up front.
        sqlx::query(
            "INSERT OR IGNORE INTO kv_state (key, int_value, updated_at_ns) VALUES (?, 0, ?)",
        )
        .bind(LAST_ACTED_KEY)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let advanced = sqlx::query(
            "UPDATE kv_state SET int_value = ?, updated_at_ns = ? WHERE key = ? AND int_value < ?",
        )
        .bind(candidate_i64)
        .bind(now)
        .bind(LAST_ACTED_KEY)
        .bind(candidate_i64)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !advanced {
            tx.rollback().await?;
            debug!(total = total_count, candidate, "Threshold already acted upon");
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO milestone_history (threshold, origin, announced_at_ns) VALUES (?, ?, ?)",
        )
        .bind(candidate_i64)
        .bind(origin.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            threshold = candidate,
            total = total_count,
            origin = %origin,
            "Milestone crossed: {candidate}",
        );
        Ok(Some(candidate))
    }

    pub async fn last_acted(&self) -> Result<u64> {
        let value: Option<i64> =
            sqlx::query_scalar::<_, Option<i64>>("SELECT int_value FROM kv_state WHERE key = ?")
                .bind(LAST_ACTED_KEY)
                .fetch_optional(&self.pool)
                .await?
                .flatten();
        Ok(value.unwrap_or(0).max(0) as u64)
    }

    /// Operator reset for re-testing. Not called from any polling path.
    pub async fn reset(&self) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_state (key, int_value, updated_at_ns) VALUES (?, 0, ?)
            ON CONFLICT(key) DO UPDATE SET int_value = 0, updated_at_ns = excluded.updated_at_ns
            "#,
        )
        .bind(LAST_ACTED_KEY)
        .bind(now_ns() as i64)
        .execute(&self.pool)
        .await?;
        info!("Milestone tracker reset to 0");
        Ok(())
    }

    /// Announcement log, newest first.
    pub async fn history(&self, limit: i64) -> Result<Vec<MilestoneHistoryRow>> {
        let rows = sqlx::query_as::<_, MilestoneHistoryRow>(
            r#"
            SELECT id, threshold, origin, announced_at_ns
            FROM milestone_history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| AppError::Parse(format!("threshold {v} exceeds storage range")))
}
