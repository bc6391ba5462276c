//! Snapshot fetch latency, recorded per tick by the poll pipeline.

use std::sync::Mutex;
use std::time::Duration;

/// Values stored in milliseconds. Fetches are capped at the fetch timeout,
/// so the histogram only needs to reach a minute.
pub struct FetchLatency {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

impl FetchLatency {
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 60_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = (d.as_millis().min(60_000) as u64).max(1);
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    /// (p50, p95, p99) in ms, None before the first sample.
    pub fn percentiles_ms(&self) -> Option<(u64, u64, u64)> {
        let h = self.inner.lock().ok()?;
        if h.len() == 0 {
            return None;
        }
        Some((
            h.value_at_quantile(0.5),
            h.value_at_quantile(0.95),
            h.value_at_quantile(0.99),
        ))
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for FetchLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        assert!(FetchLatency::new().percentiles_ms().is_none());
    }

    #[test]
    fn slow_fetch_shows_in_tail() {
        let lat = FetchLatency::new();
        for _ in 0..99 {
            lat.record(Duration::from_millis(40));
        }
        lat.record(Duration::from_secs(10));
        let (p50, p95, _) = lat.percentiles_ms().unwrap();
        assert!((39..=41).contains(&p50), "p50={p50}");
        assert!((39..=41).contains(&p95), "p95={p95}");
        assert_eq!(lat.len(), 100);
    }
}
