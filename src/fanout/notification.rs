use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::{notification, Config};
use crate::error::{AppError, Result};
use crate::fanout::{Surface, SurfaceKind};
use crate::types::{format_grouped, Announcement};

const WEBHOOK_TIMEOUT_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Channel settings sent with every notification so the receiving side can
/// create the channel on first use.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub importance: &'static str,
    pub sound: &'static str,
    pub vibration_pattern_ms: [u64; 4],
    /// Deliver even in silent / do-not-disturb mode.
    pub bypass_dnd: bool,
}

impl ChannelSpec {
    pub fn milestones() -> Self {
        Self {
            id: notification::CHANNEL_ID,
            name: notification::CHANNEL_NAME,
            description: notification::CHANNEL_DESCRIPTION,
            importance: "high",
            sound: "default",
            vibration_pattern_ms: notification::VIBRATION_PATTERN_MS,
            bypass_dnd: true,
        }
    }
}

/// Where tapping the notification leads: the dashboard with the threshold
/// attached.
#[derive(Debug, Clone, Serialize)]
pub struct DeepLink {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    /// Fixed identity; a second post replaces the first.
    pub id: u32,
    pub channel: ChannelSpec,
    pub title: &'static str,
    pub body: String,
    pub threshold: u64,
    pub auto_cancel: bool,
    pub deep_link: DeepLink,
}

impl NotificationPayload {
    pub fn for_announcement(a: &Announcement, dashboard_command: &str) -> Self {
        Self {
            id: notification::NOTIFICATION_ID,
            channel: ChannelSpec::milestones(),
            title: notification::TITLE,
            body: format!("We've reached {} registrations!", format_grouped(a.threshold)),
            threshold: a.threshold,
            auto_cancel: true,
            deep_link: DeepLink {
                command: dashboard_command.to_string(),
                args: vec!["--milestone".to_string(), a.threshold.to_string()],
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

enum Backend {
    Webhook { client: reqwest::Client, url: String },
    /// No push endpoint configured: the notification is a structured log event.
    Log,
}

/// System notification surface. Registered by every process that polls,
/// independent of UI visibility. Every announcement is posted; the fixed
/// notification id makes a repeat replace the previous one on the receiver.
pub struct SystemNotificationSurface {
    backend: Backend,
    dashboard_command: String,
}

impl SystemNotificationSurface {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        match &cfg.notify_webhook_url {
            Some(url) => Self::webhook(url.clone(), cfg.dashboard_command.clone()),
            None => Ok(Self::log_only(cfg.dashboard_command.clone())),
        }
    }

    pub fn webhook(url: impl Into<String>, dashboard_command: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            backend: Backend::Webhook { client, url: url.into() },
            dashboard_command: dashboard_command.into(),
        })
    }

    /// Log-only surface, for setups without a push endpoint.
    pub fn log_only(dashboard_command: impl Into<String>) -> Self {
        Self {
            backend: Backend::Log,
            dashboard_command: dashboard_command.into(),
        }
    }

    async fn post(&self, payload: &NotificationPayload) -> Result<()> {
        match &self.backend {
            Backend::Webhook { client, url } => {
                let resp = client
                    .post(url)
                    .json(payload)
                    .send()
                    .await
                    .map_err(|e| AppError::Network(format!("notification webhook: {e}")))?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(AppError::Network(format!("notification webhook: HTTP {status}")));
                }
            }
            Backend::Log => {
                info!(
                    event = "SYSTEM_NOTIFICATION",
                    notification_id = payload.id,
                    channel = payload.channel.id,
                    threshold = payload.threshold,
                    open = %format!("{} {}", payload.deep_link.command, payload.deep_link.args.join(" ")),
                    "{} | {}",
                    payload.title,
                    payload.body,
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Surface for SystemNotificationSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::SystemNotification
    }

    async fn deliver(&self, announcement: &Announcement) -> Result<()> {
        let payload = NotificationPayload::for_announcement(announcement, &self.dashboard_command);
        self.post(&payload).await
    }

    async fn deliver_plain(&self, announcement: &Announcement) -> Result<()> {
        // Notifications carry no assets.
        self.deliver(announcement).await
    }
}
