use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use regdesk_milestones::api::routes::{router, ApiState};
use regdesk_milestones::config::{Config, BACKGROUND_POLL_SECS, BACKGROUND_SCHEDULE_NAME};
use regdesk_milestones::db;
use regdesk_milestones::error::Result;
use regdesk_milestones::fanout::notification::SystemNotificationSurface;
use regdesk_milestones::fanout::{NotificationFanout, SurfaceRegistry};
use regdesk_milestones::fetcher::HttpSnapshotSource;
use regdesk_milestones::poller::{BackgroundScheduler, PollPipeline};
use regdesk_milestones::state::{MilestoneTracker, ScheduleStore, WidgetStore};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.database_url()).await?;
    info!("Database ready at {}", cfg.db_path);

    let tracker = MilestoneTracker::new(pool.clone());
    let widget = WidgetStore::new(pool.clone(), cfg.currency_symbol.clone());
    let last_acted = tracker.last_acted().await?;
    info!(
        last_acted,
        step = cfg.milestone_step,
        backend = %cfg.api_base_url,
        "Milestone tracker loaded"
    );

    // --- Surfaces: the daemon hosts only the system notification ---
    let registry = SurfaceRegistry::new();
    registry.register(Arc::new(SystemNotificationSurface::from_config(&cfg)?));
    if cfg.notify_webhook_url.is_none() {
        warn!("NOTIFY_WEBHOOK_URL not set: milestone notifications are logged only");
    }

    // --- Poll pipeline + background schedule ---
    let pipeline = Arc::new(PollPipeline::new(
        Arc::new(HttpSnapshotSource::from_config(&cfg)?),
        tracker.clone(),
        widget.clone(),
        Arc::new(NotificationFanout::new(registry)),
        cfg.milestone_step,
    ));

    info!(owner = %cfg.instance_id, "Claiming background schedule");
    let scheduler = Arc::new(BackgroundScheduler::new(
        Arc::clone(&pipeline),
        ScheduleStore::new(pool.clone()),
        cfg.instance_id.clone(),
    ));
    scheduler
        .register(BACKGROUND_SCHEDULE_NAME, Duration::from_secs(BACKGROUND_POLL_SECS))
        .await?;

    // --- HTTP API server ---
    let api_state = ApiState {
        tracker,
        widget,
        scheduler: Arc::clone(&scheduler),
        health: Arc::clone(pipeline.health()),
        latency: Arc::clone(pipeline.latency()),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Registrations stay in the database; only the lease is handed back.
    scheduler.shutdown().await;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Shutdown requested (Ctrl+C)"),
        _ = terminate => info!("Shutdown requested (SIGTERM)"),
    }
}
