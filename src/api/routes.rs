use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::health::HealthState;
use crate::api::latency::FetchLatency;
use crate::error::AppError;
use crate::poller::BackgroundScheduler;
use crate::state::{MilestoneTracker, WidgetStore};

#[derive(Clone)]
pub struct ApiState {
    pub tracker: MilestoneTracker,
    pub widget: WidgetStore,
    pub scheduler: Arc<BackgroundScheduler>,
    pub health: Arc<HealthState>,
    pub latency: Arc<FetchLatency>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/widget", get(get_widget))
        .route("/milestones", get(get_milestones))
        .route("/milestones/reset", post(reset_milestones))
        .route("/schedules/:name", delete(delete_schedule))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MilestonesQuery {
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<u64>,
    pub p95_ms: Option<u64>,
    pub p99_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub last_acted_threshold: u64,
    pub last_total_count: u64,
    pub ticks_ok: u64,
    pub ticks_failed: u64,
    pub background_ticks: u64,
    pub last_success_at_ns: Option<u64>,
    pub last_failure_at_ns: Option<u64>,
    pub active_schedules: usize,
    pub fetch_latency: LatencyResponse,
}

#[derive(Serialize)]
pub struct WidgetResponse {
    pub display_text: String,
}

#[derive(Serialize)]
pub struct MilestoneResponse {
    pub threshold: i64,
    pub origin: String,
    pub announced_at_ns: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn non_zero(v: u64) -> Option<u64> {
    (v != 0).then_some(v)
}

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let last_acted_threshold = state.tracker.last_acted().await?;
    let percentiles = state.latency.percentiles_ms();

    Ok(Json(HealthResponse {
        last_acted_threshold,
        last_total_count: state.health.last_total_count(),
        ticks_ok: state.health.ticks_ok(),
        ticks_failed: state.health.ticks_failed(),
        background_ticks: state.health.background_ticks(),
        last_success_at_ns: non_zero(state.health.last_success_at_ns()),
        last_failure_at_ns: non_zero(state.health.last_failure_at_ns()),
        active_schedules: state.scheduler.active_count(),
        fetch_latency: LatencyResponse {
            samples: state.latency.len(),
            p50_ms: percentiles.map(|p| p.0),
            p95_ms: percentiles.map(|p| p.1),
            p99_ms: percentiles.map(|p| p.2),
        },
    }))
}

async fn get_widget(State(state): State<ApiState>) -> Result<Json<WidgetResponse>, AppError> {
    Ok(Json(WidgetResponse {
        display_text: state.widget.get().await?,
    }))
}

async fn get_milestones(
    State(state): State<ApiState>,
    Query(params): Query<MilestonesQuery>,
) -> Result<Json<Vec<MilestoneResponse>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 1_000);
    let rows = state.tracker.history(limit).await?;

    let milestones = rows
        .into_iter()
        .map(|r| MilestoneResponse {
            threshold: r.threshold,
            origin: r.origin,
            announced_at_ns: r.announced_at_ns,
        })
        .collect();

    Ok(Json(milestones))
}

async fn reset_milestones(State(state): State<ApiState>) -> Result<StatusCode, AppError> {
    state.tracker.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_schedule(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.scheduler.unregister(&name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("schedule {name}")))
    }
}
