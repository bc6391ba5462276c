use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One fetched copy of the backend aggregate counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Running registration total. The milestone counter.
    pub total_count: u64,
    /// Latest series code, e.g. `MH26000105`.
    pub identifier: String,
    pub today_count: u64,
    pub period_count: u64,
    pub total_amount: u64,
    pub fetched_at_ns: u64,
}

// ---------------------------------------------------------------------------
// Poll origin
// ---------------------------------------------------------------------------

/// Which schedule produced a tick. Recorded with each announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOrigin {
    Foreground,
    Background,
    Manual,
}

impl std::fmt::Display for PollOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PollOrigin::Foreground => "foreground",
            PollOrigin::Background => "background",
            PollOrigin::Manual => "manual",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Announcement
// ---------------------------------------------------------------------------

/// A crossed threshold on its way to the surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub threshold: u64,
    pub message: String,
    pub origin: PollOrigin,
    pub announced_at_ns: u64,
}

impl Announcement {
    pub fn new(threshold: u64, origin: PollOrigin) -> Self {
        Self {
            threshold,
            message: milestone_message(threshold),
            origin,
            announced_at_ns: now_ns(),
        }
    }
}

/// `🎉 100,000 Registrations! 🎉`
pub fn milestone_message(threshold: u64) -> String {
    format!("🎉 {} Registrations! 🎉", format_grouped(threshold))
}

// ---------------------------------------------------------------------------
// UI events
// ---------------------------------------------------------------------------

/// Animation frames loaded from an asset file.
pub type Frames = Vec<String>;

/// Everything the dashboard loop reacts to. Producers run on other tasks;
/// only the UI loop mutates screen state.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Snapshot(Snapshot),
    FetchFailed { message: String, session_expired: bool },
    /// In-app overlay. `frames` is None when the animation asset is missing.
    Overlay { announcement: Announcement, frames: Option<Frames> },
    /// Full-screen celebration view.
    Celebration { announcement: Announcement, frames: Option<Frames> },
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Thousands-grouped integer: `1234567` → `1,234,567`.
pub fn format_grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Widget text for a money total, e.g. `₹45000`.
pub fn format_currency(symbol: &str, amount: u64) -> String {
    format!("{symbol}{amount}")
}

pub fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
