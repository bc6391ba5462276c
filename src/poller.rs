use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::api::health::HealthState;
use crate::api::latency::FetchLatency;
use crate::config::{
    BACKGROUND_RETRY_BACKOFF_MS, FETCH_TIMEOUT_SECS, FOREGROUND_POLL_SECS, SCHEDULE_LEASE_SECS,
};
use crate::error::{AppError, Result};
use crate::fanout::{FanoutReport, NotificationFanout};
use crate::fetcher::SnapshotSource;
use crate::state::schedule_store::initial_delay_ns;
use crate::state::{MilestoneTracker, ScheduleStore, WidgetStore};
use crate::types::{now_ns, PollOrigin, Snapshot, UiEvent};

// ---------------------------------------------------------------------------
// PollPipeline
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct TickOutcome {
    pub snapshot: Snapshot,
    pub crossed: Option<u64>,
    pub fanout: Option<FanoutReport>,
}

/// One poll tick, shared by both schedules:
/// fetch → widget value → check-and-advance → fan-out.
pub struct PollPipeline {
    source: Arc<dyn SnapshotSource>,
    tracker: MilestoneTracker,
    widget: WidgetStore,
    fanout: Arc<NotificationFanout>,
    milestone_step: u64,
    fetch_timeout: Duration,
    health: Arc<HealthState>,
    latency: Arc<FetchLatency>,
}

impl PollPipeline {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        tracker: MilestoneTracker,
        widget: WidgetStore,
        fanout: Arc<NotificationFanout>,
        milestone_step: u64,
    ) -> Self {
        Self {
            source,
            tracker,
            widget,
            fanout,
            milestone_step,
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            health: Arc::new(HealthState::new()),
            latency: Arc::new(FetchLatency::new()),
        }
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub fn latency(&self) -> &Arc<FetchLatency> {
        &self.latency
    }

    pub fn tracker(&self) -> &MilestoneTracker {
        &self.tracker
    }

    /// Fetch with a hard upper bound; a stalled request counts as a timeout.
    pub async fn fetch(&self) -> Result<Snapshot> {
        let started = Instant::now();
        let result = match timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.fetch_timeout.as_secs().max(1))),
        };
        self.latency.record(started.elapsed());
        result
    }

    pub async fn tick(&self, origin: PollOrigin) -> Result<TickOutcome> {
        let snapshot = match self.fetch().await {
            Ok(s) => s,
            Err(e) => {
                self.health.record_failure(now_ns());
                return Err(e);
            }
        };

        // The widget value is independent of milestone bookkeeping.
        let display = self.widget.format_amount(snapshot.total_amount);
        if let Err(e) = self.widget.set(&display).await {
            warn!(origin = %origin, "Widget store update failed: {e}");
        }

        let crossed = self
            .tracker
            .check_and_advance(snapshot.total_count, self.milestone_step, origin)
            .await?;

        let fanout = match crossed {
            Some(threshold) => Some(self.fanout.announce(threshold, origin).await),
            None => None,
        };

        self.health
            .record_success(origin, snapshot.fetched_at_ns, snapshot.total_count);
        debug!(
            origin = %origin,
            total = snapshot.total_count,
            identifier = %snapshot.identifier,
            crossed = ?crossed,
            "Poll tick complete"
        );

        Ok(TickOutcome { snapshot, crossed, fanout })
    }
}

// ---------------------------------------------------------------------------
// ForegroundPoller
// ---------------------------------------------------------------------------

/// Fast schedule bound to dashboard visibility.
///
/// Ticks every `period` while `visible` is true, once immediately on every
/// resume, and not at all while hidden. Missed ticks are never replayed.
/// Results go to the UI loop as `UiEvent`s.
pub struct ForegroundPoller {
    pipeline: Arc<PollPipeline>,
    visible: watch::Receiver<bool>,
    refresh_rx: mpsc::Receiver<()>,
    ui_tx: mpsc::Sender<UiEvent>,
    period: Duration,
}

impl ForegroundPoller {
    pub fn new(
        pipeline: Arc<PollPipeline>,
        visible: watch::Receiver<bool>,
        refresh_rx: mpsc::Receiver<()>,
        ui_tx: mpsc::Sender<UiEvent>,
    ) -> Self {
        Self {
            pipeline,
            visible,
            refresh_rx,
            ui_tx,
            period: Duration::from_secs(FOREGROUND_POLL_SECS),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Returns when the visibility sender is dropped (dashboard exit).
    pub async fn run(mut self) {
        loop {
            // Paused: wait for the next resume.
            while !*self.visible.borrow_and_update() {
                if self.visible.changed().await.is_err() {
                    return;
                }
            }
            // Refresh requests made while hidden are stale.
            while self.refresh_rx.try_recv().is_ok() {}

            info!("Foreground polling resumed");
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // Visibility first: a tick that came due during an in-flight
                // fetch must not start once the dashboard is hidden.
                tokio::select! {
                    biased;
                    changed = self.visible.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        if !*self.visible.borrow_and_update() {
                            info!("Foreground polling paused");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        self.tick(PollOrigin::Foreground).await;
                    }
                    Some(()) = self.refresh_rx.recv() => {
                        self.tick(PollOrigin::Manual).await;
                        ticker.reset();
                    }
                }
            }
        }
    }

    async fn tick(&self, origin: PollOrigin) {
        let event = match self.pipeline.tick(origin).await {
            Ok(outcome) => UiEvent::Snapshot(outcome.snapshot),
            Err(e) => {
                warn!(origin = %origin, "Foreground poll failed: {e}");
                UiEvent::FetchFailed {
                    message: e.user_message(),
                    session_expired: matches!(e, AppError::Auth(_)),
                }
            }
        };
        if let Err(e) = self.ui_tx.try_send(event) {
            warn!("UI channel full, dropping poll result: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// BackgroundScheduler
// ---------------------------------------------------------------------------

/// Slow, persisted, named schedules.
///
/// - Registering a name that is already running replaces the running task.
/// - The registration row outlives the process; `register` after a restart
///   resumes with whatever is left of the interval.
/// - Each run first claims the schedule's lease, so two daemons sharing the
///   database never both run it.
/// - Only `unregister` removes a schedule.
pub struct BackgroundScheduler {
    pipeline: Arc<PollPipeline>,
    store: ScheduleStore,
    owner: String,
    lease_secs: u64,
    retry_backoff: Vec<Duration>,
    handles: DashMap<String, AbortHandle>,
}

impl BackgroundScheduler {
    pub fn new(pipeline: Arc<PollPipeline>, store: ScheduleStore, owner: impl Into<String>) -> Self {
        Self {
            pipeline,
            store,
            owner: owner.into(),
            lease_secs: SCHEDULE_LEASE_SECS,
            retry_backoff: BACKGROUND_RETRY_BACKOFF_MS
                .iter()
                .map(|&ms| Duration::from_millis(ms))
                .collect(),
            handles: DashMap::new(),
        }
    }

    pub fn with_retry_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_lease_secs(mut self, lease_secs: u64) -> Self {
        self.lease_secs = lease_secs;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn register(&self, name: &str, every: Duration) -> Result<()> {
        let every = every.max(Duration::from_millis(1));
        self.store
            .register(name, every.as_secs().max(1), &self.owner)
            .await?;
        let delay = match self.store.get(name).await? {
            Some(row) => Duration::from_nanos(initial_delay_ns(&row, now_ns()).min(every.as_nanos() as u64)),
            None => Duration::ZERO,
        };

        let task = BackgroundTask {
            name: name.to_string(),
            every,
            pipeline: Arc::clone(&self.pipeline),
            store: self.store.clone(),
            owner: self.owner.clone(),
            lease_secs: self.lease_secs,
            retry_backoff: self.retry_backoff.clone(),
        };
        let handle = tokio::spawn(task.run(delay));

        if let Some(previous) = self.handles.insert(name.to_string(), handle.abort_handle()) {
            previous.abort();
            info!(schedule = name, "Background schedule re-registered, previous task replaced");
        } else {
            info!(
                schedule = name,
                every_secs = every.as_secs(),
                first_run_in_secs = delay.as_secs(),
                "Background schedule registered"
            );
        }
        Ok(())
    }

    /// Stop and remove a schedule. The only path that cancels one.
    pub async fn unregister(&self, name: &str) -> Result<bool> {
        if let Some((_, handle)) = self.handles.remove(name) {
            handle.abort();
        }
        let removed = self.store.remove(name).await?;
        info!(schedule = name, removed, "Background schedule unregistered");
        Ok(removed)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.handles
            .get(name)
            .map(|h| !h.value().is_finished())
            .unwrap_or(false)
    }

    pub fn active_count(&self) -> usize {
        self.handles.iter().filter(|h| !h.value().is_finished()).count()
    }

    /// Stop local tasks and hand the leases back. Registrations stay, so the
    /// next start resumes them.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.handles.iter().map(|h| h.key().clone()).collect();
        for name in names {
            if let Some((_, handle)) = self.handles.remove(&name) {
                handle.abort();
            }
            if let Err(e) = self.store.release(&name, &self.owner).await {
                warn!(schedule = %name, "Lease release failed: {e}");
            }
        }
    }
}

struct BackgroundTask {
    name: String,
    every: Duration,
    pipeline: Arc<PollPipeline>,
    store: ScheduleStore,
    owner: String,
    lease_secs: u64,
    retry_backoff: Vec<Duration>,
}

impl BackgroundTask {
    async fn run(self, initial_delay: Duration) {
        if !initial_delay.is_zero() {
            sleep(initial_delay).await;
        }
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.store.try_claim(&self.name, &self.owner, self.lease_secs).await {
                Ok(true) => {}
                Ok(false) => match self.store.get(&self.name).await {
                    Ok(None) => {
                        info!(schedule = %self.name, "Schedule uninstalled elsewhere, stopping");
                        return;
                    }
                    _ => {
                        debug!(schedule = %self.name, "Lease held by another daemon, skipping tick");
                        continue;
                    }
                },
                Err(e) => {
                    error!(schedule = %self.name, "Lease claim failed: {e}");
                    continue;
                }
            }

            self.run_with_retry().await;

            if let Err(e) = self.store.record_run(&self.name).await {
                warn!(schedule = %self.name, "Recording run failed: {e}");
            }
        }
    }

    /// One scheduled tick with bounded retries. Gives up silently (logged)
    /// once the backoff list is exhausted or the error is not transient.
    async fn run_with_retry(&self) -> bool {
        let mut attempt = 0usize;
        loop {
            match self.pipeline.tick(PollOrigin::Background).await {
                Ok(outcome) => {
                    info!(
                        schedule = %self.name,
                        total = outcome.snapshot.total_count,
                        crossed = ?outcome.crossed,
                        attempts = attempt + 1,
                        "Background poll complete"
                    );
                    return true;
                }
                Err(e) if e.is_transient() && attempt < self.retry_backoff.len() => {
                    let delay = self.retry_backoff[attempt];
                    attempt += 1;
                    warn!(
                        schedule = %self.name,
                        attempt,
                        "Background poll failed, retrying in {}ms: {e}",
                        delay.as_millis(),
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    if matches!(e, AppError::Auth(_)) {
                        warn!(schedule = %self.name, "Background poll rejected, session needs re-authentication: {e}");
                    } else {
                        error!(schedule = %self.name, attempts = attempt + 1, "Background poll gave up for this tick: {e}");
                    }
                    return false;
                }
            }
        }
    }
}
