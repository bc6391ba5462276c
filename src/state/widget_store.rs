use sqlx::SqlitePool;

use crate::error::Result;
use crate::types::{format_currency, now_ns};

pub const DISPLAY_TEXT_KEY: &str = "widget.displayText";

/// Last known widget text. Written by whichever poller saw the newest
/// snapshot; read by the widget surface whether or not the dashboard runs.
#[derive(Clone)]
pub struct WidgetStore {
    pool: SqlitePool,
    currency_symbol: String,
}

impl WidgetStore {
    pub fn new(pool: SqlitePool, currency_symbol: impl Into<String>) -> Self {
        Self {
            pool,
            currency_symbol: currency_symbol.into(),
        }
    }

    pub async fn set(&self, display_text: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_state (key, text_value, updated_at_ns) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                text_value = excluded.text_value,
                updated_at_ns = excluded.updated_at_ns
            "#,
        )
        .bind(DISPLAY_TEXT_KEY)
        .bind(display_text)
        .bind(now_ns() as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stored text, or the zero amount before the first `set`.
    pub async fn get(&self) -> Result<String> {
        let stored = sqlx::query_scalar::<_, Option<String>>(
            "SELECT text_value FROM kv_state WHERE key = ?",
        )
        .bind(DISPLAY_TEXT_KEY)
        .fetch_optional(&self.pool)
        .await?
        .flatten();
        Ok(stored.unwrap_or_else(|| self.format_amount(0)))
    }

    pub fn format_amount(&self, amount: u64) -> String {
        format_currency(&self.currency_symbol, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn get_before_set_returns_zero_amount() {
        let store = WidgetStore::new(db::memory().await, "₹");
        assert_eq!(store.get().await.unwrap(), "₹0");
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let store = WidgetStore::new(db::memory().await, "₹");
        store.set("₹4500").await.unwrap();
        store.set(&store.format_amount(9_000)).await.unwrap();
        assert_eq!(store.get().await.unwrap(), "₹9000");
    }

    #[tokio::test]
    async fn widget_value_does_not_touch_milestone_record() {
        let pool = db::memory().await;
        let store = WidgetStore::new(pool.clone(), "₹");
        store.set("₹100").await.unwrap();
        let tracker = crate::state::MilestoneTracker::new(pool);
        assert_eq!(tracker.last_acted().await.unwrap(), 0);
    }
}
