use std::time::{Duration, Instant};

use crate::config::TICKER_DURATION_MS;

/// Rolling display for the series identifier.
///
/// When the identifier advances from `MH26000099` to `MH26000105`, the
/// numeric part counts up over `duration` with an accelerate/decelerate
/// curve. Purely cosmetic; the render loop pulls frames with `frame_at`.
#[derive(Debug, Clone)]
pub struct IdentifierTicker {
    duration: Duration,
    display: String,
    target: Option<String>,
    animation: Option<Animation>,
}

#[derive(Debug, Clone)]
struct Animation {
    prefix: String,
    from: u64,
    to: u64,
    width: usize,
    started: Instant,
}

impl Default for IdentifierTicker {
    fn default() -> Self {
        Self::new(Duration::from_millis(TICKER_DURATION_MS))
    }
}

impl IdentifierTicker {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            display: String::new(),
            target: None,
            animation: None,
        }
    }

    /// Feed the latest polled identifier. The first value is shown as is.
    pub fn observe(&mut self, next: &str, now: Instant) {
        match self.target.clone() {
            Some(previous) => self.on_new_value(&previous, next, now),
            None => self.show(next),
        }
    }

    pub fn on_new_value(&mut self, previous: &str, next: &str, now: Instant) {
        if previous == next {
            if self.animation.is_none() {
                self.show(next);
            }
            return;
        }

        match (decompose(previous), decompose(next)) {
            (Some((prev_prefix, from, _)), Some((next_prefix, to, width))) if prev_prefix == next_prefix => {
                self.target = Some(next.to_string());
                self.animation = Some(Animation {
                    prefix: next_prefix.to_string(),
                    from,
                    to,
                    width,
                    started: now,
                });
                self.display = previous.to_string();
            }
            _ => self.show(next),
        }
    }

    /// Current text; finishes the animation once its time is up.
    pub fn frame_at(&mut self, now: Instant) -> &str {
        if let Some(anim) = &self.animation {
            let elapsed = now.saturating_duration_since(anim.started);
            if elapsed >= self.duration || self.duration.is_zero() {
                self.animation = None;
                if let Some(target) = &self.target {
                    self.display = target.clone();
                }
            } else {
                let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
                let value = interpolate(anim.from, anim.to, accelerate_decelerate(t));
                self.display = format!("{}{:0width$}", anim.prefix, value, width = anim.width);
            }
        }
        &self.display
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    fn show(&mut self, value: &str) {
        self.animation = None;
        self.target = Some(value.to_string());
        self.display = value.to_string();
    }
}

/// `MH26000105` → (`MH`, 26000105, 8). Requires a non-empty alphabetic
/// prefix followed by digits only.
fn decompose(s: &str) -> Option<(&str, u64, usize)> {
    let split = s.find(|c: char| !c.is_ascii_alphabetic())?;
    let (prefix, digits) = s.split_at(split);
    if prefix.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value = digits.parse::<u64>().ok()?;
    Some((prefix, value, digits.len()))
}

/// `cos((t + 1)π) / 2 + 0.5`, slow at both ends.
fn accelerate_decelerate(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    ((t + 1.0) * std::f64::consts::PI).cos() / 2.0 + 0.5
}

fn interpolate(from: u64, to: u64, fraction: f64) -> u64 {
    let from_f = from as f64;
    let value = from_f + (to as f64 - from_f) * fraction;
    value.round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animates_to_exact_terminal_value() {
        let mut ticker = IdentifierTicker::default();
        let start = Instant::now();
        ticker.on_new_value("MH26000099", "MH26000105", start);
        assert!(ticker.is_animating());

        let mid = ticker.frame_at(start + Duration::from_millis(750)).to_string();
        assert!(mid.starts_with("MH26000"), "mid frame {mid}");
        assert_eq!(mid.len(), "MH26000105".len());

        assert_eq!(ticker.frame_at(start + Duration::from_millis(1_500)), "MH26000105");
        assert!(!ticker.is_animating());
    }

    #[test]
    fn frames_never_overshoot_and_never_go_backwards() {
        let mut ticker = IdentifierTicker::default();
        let start = Instant::now();
        ticker.on_new_value("MH26000099", "MH26000105", start);
        let mut last = 26_000_099;
        for ms in (0..=1_500).step_by(50) {
            let frame = ticker.frame_at(start + Duration::from_millis(ms)).to_string();
            let n: u64 = frame[2..].parse().unwrap();
            assert!(n >= last && n <= 26_000_105, "frame {frame} at {ms}ms");
            last = n;
        }
        assert_eq!(last, 26_000_105);
    }

    #[test]
    fn unparsable_next_is_shown_immediately() {
        let mut ticker = IdentifierTicker::default();
        let start = Instant::now();
        ticker.on_new_value("MH26000099", "XYZ", start);
        assert!(!ticker.is_animating());
        assert_eq!(ticker.frame_at(start), "XYZ");
    }

    #[test]
    fn differing_prefixes_skip_animation() {
        let mut ticker = IdentifierTicker::default();
        ticker.on_new_value("MH26000099", "KA26000001", Instant::now());
        assert!(!ticker.is_animating());
        assert_eq!(ticker.display(), "KA26000001");
    }

    #[test]
    fn first_observation_is_direct_then_animates() {
        let mut ticker = IdentifierTicker::default();
        let start = Instant::now();
        ticker.observe("MH26000001", start);
        assert!(!ticker.is_animating());
        assert_eq!(ticker.display(), "MH26000001");

        ticker.observe("MH26000002", start);
        assert!(ticker.is_animating());
        assert_eq!(ticker.frame_at(start + Duration::from_secs(2)), "MH26000002");
    }

    #[test]
    fn easing_is_symmetric_and_bounded() {
        assert!(accelerate_decelerate(0.0).abs() < 1e-9);
        assert!((accelerate_decelerate(1.0) - 1.0).abs() < 1e-9);
        assert!((accelerate_decelerate(0.5) - 0.5).abs() < 1e-9);
        assert!(accelerate_decelerate(0.1) < 0.1, "slow start");
    }

    #[test]
    fn decompose_rejects_mixed_suffix() {
        assert_eq!(decompose("MH26000105"), Some(("MH", 26_000_105, 8)));
        assert_eq!(decompose("MH26A00105"), None);
        assert_eq!(decompose("26000105"), None);
        assert_eq!(decompose("XYZ"), None);
    }
}
