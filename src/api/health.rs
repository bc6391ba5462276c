//! Shared poll health for the /health endpoint.
//! Updated by the poll pipeline, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::PollOrigin;

/// Tick counters and timestamps. Timestamps are ns since epoch, 0 = never.
#[derive(Default)]
pub struct HealthState {
    pub ticks_ok: AtomicU64,
    pub ticks_failed: AtomicU64,
    pub last_success_at_ns: AtomicU64,
    pub last_failure_at_ns: AtomicU64,
    pub last_total_count: AtomicU64,
    pub background_ticks: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, origin: PollOrigin, at_ns: u64, total_count: u64) {
        self.ticks_ok.fetch_add(1, Ordering::Relaxed);
        self.last_success_at_ns.store(at_ns, Ordering::Relaxed);
        self.last_total_count.store(total_count, Ordering::Relaxed);
        if origin == PollOrigin::Background {
            self.background_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, at_ns: u64) {
        self.ticks_failed.fetch_add(1, Ordering::Relaxed);
        self.last_failure_at_ns.store(at_ns, Ordering::Relaxed);
    }

    pub fn ticks_ok(&self) -> u64 {
        self.ticks_ok.load(Ordering::Relaxed)
    }

    pub fn ticks_failed(&self) -> u64 {
        self.ticks_failed.load(Ordering::Relaxed)
    }

    pub fn last_success_at_ns(&self) -> u64 {
        self.last_success_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_failure_at_ns(&self) -> u64 {
        self.last_failure_at_ns.load(Ordering::Relaxed)
    }

    pub fn last_total_count(&self) -> u64 {
        self.last_total_count.load(Ordering::Relaxed)
    }

    pub fn background_ticks(&self) -> u64 {
        self.background_ticks.load(Ordering::Relaxed)
    }
}
