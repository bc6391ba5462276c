//! Surfaces hosted by the dashboard. They hand the announcement to the UI
//! loop through its event channel; the loop owns all rendering.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::assets::{AssetDir, CELEBRATION_ANIMATION, OVERLAY_ANIMATION};
use crate::error::{AppError, Result};
use crate::fanout::{Surface, SurfaceKind};
use crate::types::{Announcement, UiEvent};

fn send(ui_tx: &mpsc::Sender<UiEvent>, event: UiEvent) -> Result<()> {
    ui_tx
        .try_send(event)
        .map_err(|e| AppError::Surface(format!("UI channel: {e}")))
}

/// Celebratory overlay on top of the dashboard.
pub struct OverlaySurface {
    ui_tx: mpsc::Sender<UiEvent>,
    assets: AssetDir,
}

impl OverlaySurface {
    pub fn new(ui_tx: mpsc::Sender<UiEvent>, assets: AssetDir) -> Self {
        Self { ui_tx, assets }
    }
}

#[async_trait]
impl Surface for OverlaySurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::Overlay
    }

    async fn deliver(&self, announcement: &Announcement) -> Result<()> {
        let frames = self.assets.load_frames(OVERLAY_ANIMATION).await?;
        send(
            &self.ui_tx,
            UiEvent::Overlay {
                announcement: announcement.clone(),
                frames: Some(frames),
            },
        )
    }

    async fn deliver_plain(&self, announcement: &Announcement) -> Result<()> {
        send(
            &self.ui_tx,
            UiEvent::Overlay {
                announcement: announcement.clone(),
                frames: None,
            },
        )
    }
}

/// Full-screen celebration view with looped animation and alarm cue.
pub struct CelebrationSurface {
    ui_tx: mpsc::Sender<UiEvent>,
    assets: AssetDir,
}

impl CelebrationSurface {
    pub fn new(ui_tx: mpsc::Sender<UiEvent>, assets: AssetDir) -> Self {
        Self { ui_tx, assets }
    }
}

#[async_trait]
impl Surface for CelebrationSurface {
    fn kind(&self) -> SurfaceKind {
        SurfaceKind::CelebrationScreen
    }

    async fn deliver(&self, announcement: &Announcement) -> Result<()> {
        let frames = self.assets.load_frames(CELEBRATION_ANIMATION).await?;
        send(
            &self.ui_tx,
            UiEvent::Celebration {
                announcement: announcement.clone(),
                frames: Some(frames),
            },
        )
    }

    async fn deliver_plain(&self, announcement: &Announcement) -> Result<()> {
        send(
            &self.ui_tx,
            UiEvent::Celebration {
                announcement: announcement.clone(),
                frames: None,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::fanout::{NotificationFanout, SurfaceOutcome, SurfaceRegistry};
    use crate::types::PollOrigin;

    fn asset_root() -> AssetDir {
        AssetDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets"))
    }

    #[tokio::test]
    async fn overlay_sends_frames_to_ui() {
        let (tx, mut rx) = mpsc::channel(4);
        let surface = OverlaySurface::new(tx, asset_root());
        surface
            .deliver(&Announcement::new(100_000, PollOrigin::Foreground))
            .await
            .unwrap();
        match rx.try_recv().unwrap() {
            UiEvent::Overlay { announcement, frames } => {
                assert_eq!(announcement.threshold, 100_000);
                assert!(frames.is_some_and(|f| !f.is_empty()));
            }
            other => panic!("expected Overlay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_celebration_asset_falls_back_to_text() {
        let (tx, mut rx) = mpsc::channel(4);
        let registry = SurfaceRegistry::new();
        registry.register(Arc::new(CelebrationSurface::new(
            tx,
            AssetDir::new("/nonexistent-regdesk-assets"),
        )));

        let report = NotificationFanout::new(registry).announce(100_000, PollOrigin::Foreground).await;

        assert!(matches!(
            report.outcome(SurfaceKind::CelebrationScreen),
            Some(SurfaceOutcome::Degraded(_))
        ));
        match rx.try_recv().unwrap() {
            UiEvent::Celebration { frames, .. } => assert!(frames.is_none()),
            other => panic!("expected Celebration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_ui_channel_is_a_failure_not_a_panic() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let surface = OverlaySurface::new(tx, asset_root());
        let err = surface
            .deliver_plain(&Announcement::new(100_000, PollOrigin::Foreground))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Surface(_)));
    }
}
