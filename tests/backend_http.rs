//! HttpSnapshotSource and the daemon API against real sockets on 127.0.0.1:0.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use regdesk_milestones::api::routes::{router, ApiState};
use regdesk_milestones::db;
use regdesk_milestones::error::AppError;
use regdesk_milestones::fanout::{NotificationFanout, SurfaceRegistry};
use regdesk_milestones::fetcher::{HttpSnapshotSource, SnapshotSource};
use regdesk_milestones::poller::{BackgroundScheduler, PollPipeline};
use regdesk_milestones::state::{MilestoneTracker, ScheduleStore, WidgetStore};
use regdesk_milestones::types::{now_ns, PollOrigin};

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

/// 200 = healthy, 299 = malformed body, anything else is returned as is.
#[derive(Clone)]
struct Backend {
    status: Arc<AtomicU16>,
}

async fn stats(State(b): State<Backend>, headers: HeaderMap) -> Response {
    match b.status.load(Ordering::SeqCst) {
        200 => {
            if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            Json(json!({
                "totalRegistrations": 100_250,
                "totalMoney": 20_050_000.0,
                "todayRegistrations": 310,
                "monthRegistrations": 9_040
            }))
            .into_response()
        }
        299 => (StatusCode::OK, "<html>maintenance</html>").into_response(),
        code => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
    }
}

async fn current_series() -> Json<serde_json::Value> {
    Json(json!({ "seriesId": "MH26000105" }))
}

async fn spawn_backend(initial_status: u16) -> (String, Backend) {
    let backend = Backend {
        status: Arc::new(AtomicU16::new(initial_status)),
    };
    let app = Router::new()
        .route("/api/stats", get(stats))
        .route("/api/current-series", get(current_series))
        .with_state(backend.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/api"), backend)
}

fn source(base: &str, token: Option<&str>) -> HttpSnapshotSource {
    HttpSnapshotSource::new(base, token.map(str::to_string)).unwrap()
}

// ---------------------------------------------------------------------------
// Snapshot source
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetches_and_merges_both_endpoints() {
    let (base, _) = spawn_backend(200).await;
    let snap = source(&base, Some("secret")).fetch().await.unwrap();
    assert_eq!(snap.total_count, 100_250);
    assert_eq!(snap.identifier, "MH26000105");
    assert_eq!(snap.total_amount, 20_050_000);
}

#[tokio::test]
async fn rejected_session_is_auth_error() {
    let (base, _) = spawn_backend(200).await;
    let err = source(&base, None).fetch().await.unwrap_err();
    assert!(matches!(err, AppError::Auth(401)), "got {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let (base, _) = spawn_backend(299).await;
    let err = source(&base, Some("secret")).fetch().await.unwrap_err();
    assert!(matches!(err, AppError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn server_error_is_transient_network_error() {
    let (base, _) = spawn_backend(500).await;
    let err = source(&base, Some("secret")).fetch().await.unwrap_err();
    assert!(matches!(err, AppError::Network(_)), "got {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let err = source(&format!("http://{addr}/api"), None).fetch().await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Daemon API
// ---------------------------------------------------------------------------

#[tokio::test]
async fn daemon_api_reports_and_resets() {
    let (base, backend) = spawn_backend(200).await;
    let db_path = std::env::temp_dir().join(format!("regdesk-api-{}-{}.db", std::process::id(), now_ns()));
    let pool = db::connect(&format!("sqlite:{}", db_path.display())).await.unwrap();
    let tracker = MilestoneTracker::new(pool.clone());
    let widget = WidgetStore::new(pool.clone(), "₹");
    let pipeline = Arc::new(PollPipeline::new(
        Arc::new(source(&base, Some("secret"))),
        tracker.clone(),
        widget.clone(),
        Arc::new(NotificationFanout::new(SurfaceRegistry::new())),
        100_000,
    ));
    let scheduler = Arc::new(BackgroundScheduler::new(
        pipeline.clone(),
        ScheduleStore::new(pool.clone()),
        "daemon-test",
    ));

    let outcome = pipeline.tick(PollOrigin::Foreground).await.unwrap();
    assert_eq!(outcome.crossed, Some(100_000));
    backend.status.store(503, Ordering::SeqCst);
    assert!(pipeline.tick(PollOrigin::Foreground).await.is_err());

    scheduler
        .register("widget_update", Duration::from_secs(900))
        .await
        .unwrap();

    let app = router(ApiState {
        tracker: tracker.clone(),
        widget,
        scheduler: scheduler.clone(),
        health: Arc::clone(pipeline.health()),
        latency: Arc::clone(pipeline.latency()),
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{api}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["last_acted_threshold"], 100_000);
    assert_eq!(health["last_total_count"], 100_250);
    assert!(health["ticks_failed"].as_u64().unwrap() >= 1);
    assert!(health["fetch_latency"]["samples"].as_u64().unwrap() >= 2);

    let widget_text: serde_json::Value = client
        .get(format!("{api}/widget"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(widget_text["display_text"], "₹20050000");

    let history: Vec<serde_json::Value> = client
        .get(format!("{api}/milestones?limit=5"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["threshold"], 100_000);
    assert_eq!(history[0]["origin"], "foreground");

    let reset = client.post(format!("{api}/milestones/reset")).send().await.unwrap();
    assert_eq!(reset.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(tracker.last_acted().await.unwrap(), 0);

    let removed = client
        .delete(format!("{api}/schedules/widget_update"))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), reqwest::StatusCode::NO_CONTENT);
    assert!(!scheduler.is_active("widget_update"));

    let missing = client
        .delete(format!("{api}/schedules/widget_update"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", db_path.display()));
    }
}
