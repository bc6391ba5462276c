//! Row types for `migrations/0001_init.sql`.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MilestoneHistoryRow {
    pub id: i64,
    pub threshold: i64,
    pub origin: String,
    pub announced_at_ns: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScheduleRow {
    pub name: String,
    pub interval_secs: i64,
    pub owner: String,
    pub lease_until_ns: i64,
    pub registered_at_ns: i64,
    pub last_run_at_ns: Option<i64>,
}
