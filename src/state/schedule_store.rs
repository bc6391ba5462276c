use sqlx::SqlitePool;

use crate::db::models::ScheduleRow;
use crate::error::Result;
use crate::types::now_ns;

/// Persisted registry of named background schedules.
///
/// A row survives restarts so the schedule resumes with its remaining delay.
/// The lease columns let exactly one daemon run a given schedule at a time:
/// a tick proceeds only after `try_claim` succeeds for its owner id.
#[derive(Clone)]
pub struct ScheduleStore {
    pool: SqlitePool,
}

impl ScheduleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace the registration for `name`. `last_run_at_ns` is kept
    /// so a re-registration does not reset the cadence.
    pub async fn register(&self, name: &str, interval_secs: u64, owner: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (name, interval_secs, owner, lease_until_ns, registered_at_ns)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(name) DO UPDATE SET
                interval_secs = excluded.interval_secs,
                registered_at_ns = excluded.registered_at_ns
            "#,
        )
        .bind(name)
        .bind(interval_secs as i64)
        .bind(owner)
        .bind(now_ns() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<ScheduleRow>> {
        let row = sqlx::query_as::<_, ScheduleRow>(
            r#"
            SELECT name, interval_secs, owner, lease_until_ns, registered_at_ns, last_run_at_ns
            FROM schedules WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Take or renew the lease. Succeeds when the caller already owns it or
    /// the previous owner's lease has lapsed.
    pub async fn try_claim(&self, name: &str, owner: &str, lease_secs: u64) -> Result<bool> {
        let now = now_ns() as i64;
        let until = now.saturating_add((lease_secs as i64).saturating_mul(1_000_000_000));
        let claimed = sqlx::query(
            r#"
            UPDATE schedules SET owner = ?, lease_until_ns = ?
            WHERE name = ? AND (owner = ? OR lease_until_ns < ?)
            "#,
        )
        .bind(owner)
        .bind(until)
        .bind(name)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected()
            == 1;
        Ok(claimed)
    }

    /// Give the lease up on clean shutdown so another daemon can take over.
    pub async fn release(&self, name: &str, owner: &str) -> Result<()> {
        sqlx::query("UPDATE schedules SET lease_until_ns = 0 WHERE name = ? AND owner = ?")
            .bind(name)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_run(&self, name: &str) -> Result<()> {
        sqlx::query("UPDATE schedules SET last_run_at_ns = ? WHERE name = ?")
            .bind(now_ns() as i64)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Uninstall. Returns false when nothing was registered under `name`.
    pub async fn remove(&self, name: &str) -> Result<bool> {
        let removed = sqlx::query("DELETE FROM schedules WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;
        Ok(removed)
    }
}

/// Delay before the first run of a resumed schedule: what is left of the
/// interval since the last recorded run, zero when overdue or never run.
pub fn initial_delay_ns(row: &ScheduleRow, now_ns: u64) -> u64 {
    let interval_ns = (row.interval_secs.max(0) as u64).saturating_mul(1_000_000_000);
    match row.last_run_at_ns {
        Some(last) if last > 0 => {
            let elapsed = now_ns.saturating_sub(last as u64);
            interval_ns.saturating_sub(elapsed)
        }
        _ => 0,
    }
}
