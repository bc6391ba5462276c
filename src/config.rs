use crate::error::{AppError, Result};

pub const API_BASE_URL: &str = "http://127.0.0.1:3000/api";

/// Foreground auto-refresh interval while the dashboard is visible (seconds).
pub const FOREGROUND_POLL_SECS: u64 = 5;

/// Background schedule interval (seconds). Runs regardless of UI visibility.
pub const BACKGROUND_POLL_SECS: u64 = 15 * 60;

/// Upper bound on a single snapshot fetch before the tick counts as failed.
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Retry backoff for a failed background tick, in milliseconds. The tick gives
/// up once the list is exhausted.
pub const BACKGROUND_RETRY_BACKOFF_MS: &[u64] = &[1_000, 5_000, 15_000];

/// How long a daemon's claim on a background schedule stays valid without renewal.
/// Must exceed BACKGROUND_POLL_SECS plus the worst-case retry time.
pub const SCHEDULE_LEASE_SECS: u64 = BACKGROUND_POLL_SECS * 2;

/// Name the daemon registers its background schedule under.
pub const BACKGROUND_SCHEDULE_NAME: &str = "widget_update";

/// In-app overlay auto-dismiss (seconds).
pub const OVERLAY_DISMISS_SECS: u64 = 8;

/// Identifier ticker animation length (milliseconds).
pub const TICKER_DURATION_MS: u64 = 1_500;

/// Channel capacity for UI event routing.
pub const CHANNEL_CAPACITY: usize = 256;

pub const DEFAULT_MILESTONE_STEP: u64 = 100_000;

/// System notification channel settings.
pub mod notification {
    pub const CHANNEL_ID: &str = "milestone_celebrations";
    pub const CHANNEL_NAME: &str = "Milestone Celebrations";
    pub const CHANNEL_DESCRIPTION: &str = "Notifications for registration milestones";
    /// Fixed identity: a repeat post replaces the previous notification.
    pub const NOTIFICATION_ID: u32 = 1000;
    pub const TITLE: &str = "🎉 MILESTONE ACHIEVED! 🎉";
    pub const VIBRATION_PATTERN_MS: [u64; 4] = [0, 1000, 500, 1000];
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    /// Bearer token issued by the login flow (AUTH_TOKEN). Optional.
    pub auth_token: Option<String>,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Threshold step for milestone detection (MILESTONE_STEP). `1` gives the
    /// per-registration test policy.
    pub milestone_step: u64,
    pub currency_symbol: String,
    /// Webhook receiving system notifications (NOTIFY_WEBHOOK_URL). When unset,
    /// notifications are emitted as log events only.
    pub notify_webhook_url: Option<String>,
    /// Directory holding celebration animation frames and sound cue (ASSET_DIR).
    pub asset_dir: String,
    /// Register the full-screen celebration surface in the dashboard (CELEBRATION_SCREEN).
    pub celebration_screen: bool,
    pub dashboard_log_path: String,
    /// Command a notification or widget click should run to open the dashboard.
    pub dashboard_command: String,
    /// Lease owner for background schedules (INSTANCE_ID). Defaults to host and
    /// database path, so a restarted daemon reclaims the lease it held before.
    pub instance_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let milestone_step = std::env::var("MILESTONE_STEP")
            .unwrap_or_else(|_| DEFAULT_MILESTONE_STEP.to_string())
            .parse::<u64>()
            .map_err(|_| AppError::Config("MILESTONE_STEP must be a positive integer".to_string()))?;
        if milestone_step == 0 {
            return Err(AppError::Config("MILESTONE_STEP must be greater than zero".to_string()));
        }

        let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "regdesk.db".to_string());
        let instance_id = std::env::var("INSTANCE_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| default_instance_id(&hostname(), &db_path));

        Ok(Self {
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            auth_token: std::env::var("AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3100".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            milestone_step,
            currency_symbol: std::env::var("CURRENCY_SYMBOL").unwrap_or_else(|_| "₹".to_string()),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            asset_dir: std::env::var("ASSET_DIR").unwrap_or_else(|_| "assets".to_string()),
            celebration_screen: std::env::var("CELEBRATION_SCREEN")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            dashboard_log_path: std::env::var("DASHBOARD_LOG_PATH")
                .unwrap_or_else(|_| "dashboard.log".to_string()),
            dashboard_command: std::env::var("DASHBOARD_COMMAND")
                .unwrap_or_else(|_| "dashboard".to_string()),
            instance_id,
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.db_path)
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Same host and same state file give the same owner across restarts.
fn default_instance_id(host: &str, db_path: &str) -> String {
    // Lexical only: the file may not exist yet on first start.
    let path = std::path::absolute(db_path)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| db_path.to_string());
    format!("milestoned@{host}:{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_is_stable_per_installation() {
        let a = default_instance_id("desk-01", "/var/lib/regdesk/missing.db");
        let b = default_instance_id("desk-01", "/var/lib/regdesk/missing.db");
        assert_eq!(a, b);
        assert_eq!(a, "milestoned@desk-01:/var/lib/regdesk/missing.db");
        assert_ne!(a, default_instance_id("desk-02", "/var/lib/regdesk/missing.db"));
        assert_ne!(a, default_instance_id("desk-01", "/var/lib/regdesk/other.db"));
    }
}
