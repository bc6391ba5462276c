//! Milestone fan-out to the presentation surfaces.
//!
//! Surfaces register themselves in a `SurfaceRegistry` while their host is
//! alive. `NotificationFanout::announce` delivers to whatever is registered at
//! that moment; an unregistered surface is skipped, a failing one is isolated.

pub mod live;
pub mod notification;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::types::{Announcement, PollOrigin};

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SurfaceKind {
    /// In-app overlay on the dashboard. Live only.
    Overlay,
    /// Desktop/push notification. Always attempted.
    SystemNotification,
    /// Full-screen celebration view. Live only, optional.
    CelebrationScreen,
}

impl SurfaceKind {
    pub const ALL: [SurfaceKind; 3] = [
        SurfaceKind::Overlay,
        SurfaceKind::SystemNotification,
        SurfaceKind::CelebrationScreen,
    ];
}

impl std::fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SurfaceKind::Overlay => "overlay",
            SurfaceKind::SystemNotification => "system_notification",
            SurfaceKind::CelebrationScreen => "celebration_screen",
        };
        write!(f, "{s}")
    }
}

#[async_trait]
pub trait Surface: Send + Sync {
    fn kind(&self) -> SurfaceKind;

    async fn deliver(&self, announcement: &Announcement) -> Result<()>;

    /// Text-only rendition, used after `deliver` fails with `AppError::Asset`.
    async fn deliver_plain(&self, announcement: &Announcement) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Currently live surfaces, one per kind.
#[derive(Default)]
pub struct SurfaceRegistry {
    surfaces: DashMap<SurfaceKind, Arc<dyn Surface>>,
}

impl SurfaceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a surface, replacing any previous one of the same kind.
    pub fn register(&self, surface: Arc<dyn Surface>) {
        let kind = surface.kind();
        if self.surfaces.insert(kind, surface).is_some() {
            debug!(surface = %kind, "Surface replaced");
        } else {
            debug!(surface = %kind, "Surface registered");
        }
    }

    pub fn unregister(&self, kind: SurfaceKind) {
        if self.surfaces.remove(&kind).is_some() {
            debug!(surface = %kind, "Surface unregistered");
        }
    }

    pub fn is_live(&self, kind: SurfaceKind) -> bool {
        self.surfaces.contains_key(&kind)
    }

    fn get(&self, kind: SurfaceKind) -> Option<Arc<dyn Surface>> {
        self.surfaces.get(&kind).map(|s| Arc::clone(s.value()))
    }
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceOutcome {
    Delivered,
    /// Asset missing; the plain-text rendition went out instead.
    Degraded(String),
    /// Not registered at announce time.
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct FanoutReport {
    pub threshold: u64,
    pub outcomes: Vec<(SurfaceKind, SurfaceOutcome)>,
}

impl FanoutReport {
    pub fn outcome(&self, kind: SurfaceKind) -> Option<&SurfaceOutcome> {
        self.outcomes.iter().find(|(k, _)| *k == kind).map(|(_, o)| o)
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SurfaceOutcome::Delivered | SurfaceOutcome::Degraded(_)))
            .count()
    }
}

pub struct NotificationFanout {
    registry: Arc<SurfaceRegistry>,
}

impl NotificationFanout {
    pub fn new(registry: Arc<SurfaceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SurfaceRegistry> {
        &self.registry
    }

    /// Deliver one crossed threshold to every registered surface concurrently.
    /// Never fails as a whole; per-surface results are in the report.
    pub async fn announce(&self, threshold: u64, origin: PollOrigin) -> FanoutReport {
        let announcement = Announcement::new(threshold, origin);

        // Clone the Arcs out so no registry guard is held across an await.
        let targets: Vec<(SurfaceKind, Option<Arc<dyn Surface>>)> = SurfaceKind::ALL
            .iter()
            .map(|&kind| (kind, self.registry.get(kind)))
            .collect();

        let deliveries = targets.into_iter().map(|(kind, surface)| {
            let announcement = &announcement;
            async move {
                let outcome = match surface {
                    Some(surface) => deliver_isolated(surface.as_ref(), announcement).await,
                    None => SurfaceOutcome::Skipped,
                };
                (kind, outcome)
            }
        });
        let outcomes = join_all(deliveries).await;

        for (kind, outcome) in &outcomes {
            match outcome {
                SurfaceOutcome::Delivered => {}
                SurfaceOutcome::Skipped if *kind == SurfaceKind::SystemNotification => {
                    warn!(threshold, "No system notification surface registered");
                }
                SurfaceOutcome::Skipped => debug!(threshold, surface = %kind, "Surface not live, skipped"),
                SurfaceOutcome::Degraded(reason) => {
                    warn!(threshold, surface = %kind, "Surface degraded to text: {reason}")
                }
                SurfaceOutcome::Failed(reason) => {
                    error!(threshold, surface = %kind, "Surface delivery failed: {reason}")
                }
            }
        }

        let report = FanoutReport { threshold, outcomes };
        info!(
            threshold,
            origin = %origin,
            delivered = report.delivered_count(),
            "Milestone announced: {}",
            announcement.message,
        );
        report
    }
}

/// One surface's delivery, with asset fallback. A panic inside the surface
/// is contained and reported as a failure.
async fn deliver_isolated(surface: &dyn Surface, announcement: &Announcement) -> SurfaceOutcome {
    let attempt = AssertUnwindSafe(surface.deliver(announcement)).catch_unwind().await;
    match attempt {
        Ok(Ok(())) => SurfaceOutcome::Delivered,
        Ok(Err(AppError::Asset(reason))) => {
            match AssertUnwindSafe(surface.deliver_plain(announcement)).catch_unwind().await {
                Ok(Ok(())) => SurfaceOutcome::Degraded(reason),
                Ok(Err(e)) => SurfaceOutcome::Failed(format!("{reason}; text fallback: {e}")),
                Err(_) => SurfaceOutcome::Failed(format!("{reason}; text fallback panicked")),
            }
        }
        Ok(Err(e)) => SurfaceOutcome::Failed(e.to_string()),
        Err(_) => SurfaceOutcome::Failed("surface panicked".to_string()),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{Behaviour, RecordingSurface};
    use super::*;

    #[tokio::test]
    async fn failing_overlay_does_not_block_notification() {
        let registry = SurfaceRegistry::new();
        let overlay = RecordingSurface::new(SurfaceKind::Overlay, Behaviour::Fail);
        let notify = RecordingSurface::new(SurfaceKind::SystemNotification, Behaviour::Ok);
        registry.register(overlay.clone());
        registry.register(notify.clone());

        let report = NotificationFanout::new(registry).announce(100_000, PollOrigin::Foreground).await;

        assert_eq!(notify.delivered(), vec![100_000]);
        assert!(matches!(report.outcome(SurfaceKind::Overlay), Some(SurfaceOutcome::Failed(_))));
        assert_eq!(report.outcome(SurfaceKind::SystemNotification), Some(&SurfaceOutcome::Delivered));
    }

    #[tokio::test]
    async fn panicking_overlay_is_contained() {
        let registry = SurfaceRegistry::new();
        let notify = RecordingSurface::new(SurfaceKind::SystemNotification, Behaviour::Ok);
        registry.register(RecordingSurface::new(SurfaceKind::Overlay, Behaviour::Panic));
        registry.register(notify.clone());

        let report = NotificationFanout::new(registry).announce(100_000, PollOrigin::Foreground).await;

        assert_eq!(notify.delivered(), vec![100_000]);
        assert!(matches!(report.outcome(SurfaceKind::Overlay), Some(SurfaceOutcome::Failed(_))));
    }

    #[tokio::test]
    async fn missing_asset_degrades_only_that_surface() {
        let registry = SurfaceRegistry::new();
        let celebration = RecordingSurface::new(SurfaceKind::CelebrationScreen, Behaviour::MissingAsset);
        let overlay = RecordingSurface::new(SurfaceKind::Overlay, Behaviour::Ok);
        registry.register(celebration.clone());
        registry.register(overlay.clone());

        let report = NotificationFanout::new(registry).announce(200_000, PollOrigin::Background).await;

        assert_eq!(celebration.plain(), vec![200_000]);
        assert!(celebration.delivered().is_empty());
        assert_eq!(overlay.delivered(), vec![200_000]);
        assert!(matches!(
            report.outcome(SurfaceKind::CelebrationScreen),
            Some(SurfaceOutcome::Degraded(_))
        ));
    }

    #[tokio::test]
    async fn unregistered_overlay_is_skipped() {
        let registry = SurfaceRegistry::new();
        let notify = RecordingSurface::new(SurfaceKind::SystemNotification, Behaviour::Ok);
        registry.register(notify.clone());

        let report = NotificationFanout::new(registry).announce(300_000, PollOrigin::Background).await;

        assert_eq!(report.outcome(SurfaceKind::Overlay), Some(&SurfaceOutcome::Skipped));
        assert_eq!(report.outcome(SurfaceKind::CelebrationScreen), Some(&SurfaceOutcome::Skipped));
        assert_eq!(report.delivered_count(), 1);
    }

    #[tokio::test]
    async fn unregister_removes_live_surface() {
        let registry = SurfaceRegistry::new();
        let overlay = RecordingSurface::new(SurfaceKind::Overlay, Behaviour::Ok);
        registry.register(overlay.clone());
        assert!(registry.is_live(SurfaceKind::Overlay));
        registry.unregister(SurfaceKind::Overlay);
        assert!(!registry.is_live(SurfaceKind::Overlay));

        NotificationFanout::new(registry).announce(100_000, PollOrigin::Foreground).await;
        assert!(overlay.delivered().is_empty());
    }
}
