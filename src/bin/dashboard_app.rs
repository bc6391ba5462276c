use std::time::{Duration, Instant};

use regdesk_milestones::config::OVERLAY_DISMISS_SECS;
use regdesk_milestones::ticker::IdentifierTicker;
use regdesk_milestones::types::{
    format_currency, format_grouped, Announcement, Frames, PollOrigin, Snapshot, UiEvent,
};

/// Delay between animation frames on the overlay and celebration views.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(180);

/// Alarm cue repeat while the celebration view is up.
pub const ALARM_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Loading,
    Live,
    /// Last fetch failed; the previous snapshot stays on screen.
    Error(String),
}

/// Sound the UI loop should play after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    None,
    /// Single chime for the overlay. Honours mute.
    Chime,
}

#[derive(Debug, Clone)]
pub struct OverlayView {
    pub announcement: Announcement,
    pub frames: Option<Frames>,
    pub shown_at: Instant,
}

#[derive(Debug, Clone)]
pub struct CelebrationView {
    pub announcement: Announcement,
    pub frames: Option<Frames>,
    pub shown_at: Instant,
    pub last_alarm: Option<Instant>,
}

pub struct DashboardState {
    pub snapshot: Option<Snapshot>,
    pub status: PollStatus,
    pub session_expired: bool,
    pub ticker: IdentifierTicker,
    pub overlay: Option<OverlayView>,
    pub celebration: Option<CelebrationView>,
    pub visible: bool,
    pub muted: bool,
    pub currency_symbol: String,
}

impl DashboardState {
    pub fn new(currency_symbol: impl Into<String>) -> Self {
        Self {
            snapshot: None,
            status: PollStatus::Loading,
            session_expired: false,
            ticker: IdentifierTicker::default(),
            overlay: None,
            celebration: None,
            visible: true,
            muted: false,
            currency_symbol: currency_symbol.into(),
        }
    }

    pub fn apply(&mut self, event: UiEvent, now: Instant) -> Cue {
        match event {
            UiEvent::Snapshot(snapshot) => {
                self.ticker.observe(&snapshot.identifier, now);
                self.snapshot = Some(snapshot);
                self.status = PollStatus::Live;
                self.session_expired = false;
                Cue::None
            }
            UiEvent::FetchFailed { message, session_expired } => {
                self.status = PollStatus::Error(message);
                self.session_expired = session_expired;
                Cue::None
            }
            // Live surfaces unregister on pause; anything still queued is stale.
            UiEvent::Overlay { .. } | UiEvent::Celebration { .. } if !self.visible => Cue::None,
            UiEvent::Overlay { announcement, frames } => {
                self.overlay = Some(OverlayView { announcement, frames, shown_at: now });
                if self.muted {
                    Cue::None
                } else {
                    Cue::Chime
                }
            }
            UiEvent::Celebration { announcement, frames } => {
                self.celebration = Some(CelebrationView {
                    announcement,
                    frames,
                    shown_at: now,
                    last_alarm: None,
                });
                Cue::None
            }
        }
    }

    /// Overlay opened from a notification's deep link.
    pub fn open_milestone(&mut self, threshold: u64, now: Instant) {
        self.overlay = Some(OverlayView {
            announcement: Announcement::new(threshold, PollOrigin::Manual),
            frames: None,
            shown_at: now,
        });
    }

    /// Auto-dismiss the overlay once its time is up.
    pub fn expire(&mut self, now: Instant) {
        let limit = Duration::from_secs(OVERLAY_DISMISS_SECS);
        if self
            .overlay
            .as_ref()
            .is_some_and(|o| now.saturating_duration_since(o.shown_at) >= limit)
        {
            self.overlay = None;
        }
    }

    /// Close the top-most view. Returns false when nothing was open, so the
    /// key press should be handled normally.
    pub fn dismiss_top(&mut self) -> bool {
        if self.celebration.take().is_some() {
            return true;
        }
        self.overlay.take().is_some()
    }

    /// The celebration alarm ignores mute; returns true when it is due.
    pub fn alarm_due(&mut self, now: Instant) -> bool {
        let Some(view) = self.celebration.as_mut() else {
            return false;
        };
        let due = view
            .last_alarm
            .map_or(true, |t| now.saturating_duration_since(t) >= ALARM_INTERVAL);
        if due {
            view.last_alarm = Some(now);
        }
        due
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if !visible {
            self.overlay = None;
        }
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
    }

    pub fn amount_text(&self) -> String {
        let amount = self.snapshot.as_ref().map_or(0, |s| s.total_amount);
        format_currency(&self.currency_symbol, amount)
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Frame `elapsed` into a looping animation.
pub fn current_frame(frames: &[String], elapsed: Duration) -> Option<&str> {
    if frames.is_empty() {
        return None;
    }
    let idx = (elapsed.as_millis() / FRAME_INTERVAL.as_millis()) as usize % frames.len();
    Some(frames[idx].as_str())
}

pub fn format_count(n: Option<u64>) -> String {
    n.map_or("—".to_string(), format_grouped)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: u64, identifier: &str) -> Snapshot {
        Snapshot {
            total_count: total,
            identifier: identifier.to_string(),
            today_count: 12,
            period_count: 340,
            total_amount: 45_000,
            fetched_at_ns: 0,
        }
    }

    fn overlay_event(threshold: u64) -> UiEvent {
        UiEvent::Overlay {
            announcement: Announcement::new(threshold, PollOrigin::Foreground),
            frames: None,
        }
    }

    #[test]
    fn overlay_auto_dismisses_after_eight_seconds() {
        let mut state = DashboardState::new("₹");
        let t0 = Instant::now();
        assert_eq!(state.apply(overlay_event(100_000), t0), Cue::Chime);

        state.expire(t0 + Duration::from_secs(7));
        assert!(state.overlay.is_some());
        state.expire(t0 + Duration::from_secs(8));
        assert!(state.overlay.is_none());
    }

    #[test]
    fn muted_overlay_has_no_chime() {
        let mut state = DashboardState::new("₹");
        state.toggle_mute();
        assert_eq!(state.apply(overlay_event(100_000), Instant::now()), Cue::None);
        assert!(state.overlay.is_some());
    }

    #[test]
    fn celebration_alarm_ignores_mute_and_repeats() {
        let mut state = DashboardState::new("₹");
        state.toggle_mute();
        let t0 = Instant::now();
        state.apply(
            UiEvent::Celebration {
                announcement: Announcement::new(200_000, PollOrigin::Background),
                frames: Some(vec!["*".into(), "**".into()]),
            },
            t0,
        );
        assert!(state.alarm_due(t0));
        assert!(!state.alarm_due(t0 + Duration::from_millis(500)));
        assert!(state.alarm_due(t0 + Duration::from_millis(1_000)));
    }

    #[test]
    fn dismiss_closes_celebration_before_overlay() {
        let mut state = DashboardState::new("₹");
        let now = Instant::now();
        state.apply(overlay_event(100_000), now);
        state.apply(
            UiEvent::Celebration {
                announcement: Announcement::new(100_000, PollOrigin::Foreground),
                frames: None,
            },
            now,
        );
        assert!(state.dismiss_top());
        assert!(state.celebration.is_none() && state.overlay.is_some());
        assert!(state.dismiss_top());
        assert!(!state.dismiss_top());
    }

    #[test]
    fn hidden_dashboard_drops_queued_overlays() {
        let mut state = DashboardState::new("₹");
        state.set_visible(false);
        state.apply(overlay_event(100_000), Instant::now());
        assert!(state.overlay.is_none());
    }

    #[test]
    fn tick_finishing_after_pause_updates_stats_without_overlay() {
        let mut state = DashboardState::new("₹");
        let now = Instant::now();
        state.apply(UiEvent::Snapshot(snapshot(99_999, "MH26000099")), now);
        // Hidden while the tick's fetch was in flight; its results arrive afterwards.
        state.set_visible(false);
        state.apply(UiEvent::Snapshot(snapshot(100_050, "MH26000105")), now);
        assert_eq!(state.apply(overlay_event(100_000), now), Cue::None);
        assert!(state.overlay.is_none());
        assert_eq!(state.snapshot.as_ref().map(|s| s.total_count), Some(100_050));
    }

    #[test]
    fn failed_fetch_keeps_previous_snapshot() {
        let mut state = DashboardState::new("₹");
        let now = Instant::now();
        state.apply(UiEvent::Snapshot(snapshot(99_999, "MH26000099")), now);
        state.apply(
            UiEvent::FetchFailed {
                message: "Session expired. Sign in again.".into(),
                session_expired: true,
            },
            now,
        );
        assert!(state.session_expired);
        assert_eq!(state.snapshot.as_ref().map(|s| s.total_count), Some(99_999));
        assert_eq!(state.amount_text(), "₹45000");
    }

    #[test]
    fn frames_loop() {
        let frames = vec!["a".to_string(), "b".to_string()];
        assert_eq!(current_frame(&frames, Duration::ZERO), Some("a"));
        assert_eq!(current_frame(&frames, FRAME_INTERVAL), Some("b"));
        assert_eq!(current_frame(&frames, FRAME_INTERVAL * 2), Some("a"));
        assert_eq!(current_frame(&[], Duration::ZERO), None);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("₹₹₹₹", 3), "₹₹…");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
