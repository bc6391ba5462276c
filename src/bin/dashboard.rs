mod dashboard_app;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::{
    event::{self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dashboard_app::{current_frame, format_count, truncate, Cue, DashboardState, PollStatus};
use regdesk_milestones::assets::AssetDir;
use regdesk_milestones::config::{Config, CHANNEL_CAPACITY, FOREGROUND_POLL_SECS};
use regdesk_milestones::db;
use regdesk_milestones::error::Result;
use regdesk_milestones::fanout::live::{CelebrationSurface, OverlaySurface};
use regdesk_milestones::fanout::notification::SystemNotificationSurface;
use regdesk_milestones::fanout::{NotificationFanout, SurfaceKind, SurfaceRegistry};
use regdesk_milestones::fetcher::HttpSnapshotSource;
use regdesk_milestones::poller::{ForegroundPoller, PollPipeline};
use regdesk_milestones::state::{MilestoneTracker, WidgetStore};
use regdesk_milestones::types::UiEvent;

type Term = Terminal<CrosstermBackend<io::Stdout>>;

/// Render/input cadence. Short enough for a smooth ticker animation.
const UI_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Parser)]
#[command(name = "dashboard", version, about = "Registration milestone dashboard")]
struct Args {
    /// Open the overlay for threshold N, as attached to a notification's deep link
    #[arg(long, value_name = "N")]
    milestone: Option<u64>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    // The terminal belongs to the UI, so logs go to a file.
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.dashboard_log_path)
    {
        Ok(file) => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(&cfg.log_level))
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init(),
        Err(e) => eprintln!("Cannot open log file {}: {e}; logging disabled", cfg.dashboard_log_path),
    }

    if let Err(e) = run(cfg, args.milestone).await {
        error!("Fatal error: {e}");
        eprintln!("dashboard: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Live surfaces hosted by this process. Registered while the dashboard is
/// visible, unregistered while it is paused or unfocused.
struct LiveSurfaces {
    registry: Arc<SurfaceRegistry>,
    overlay: Arc<OverlaySurface>,
    celebration: Option<Arc<CelebrationSurface>>,
}

impl LiveSurfaces {
    fn set_live(&self, live: bool) {
        if live {
            self.registry.register(self.overlay.clone());
            if let Some(c) = &self.celebration {
                self.registry.register(c.clone());
            }
        } else {
            self.registry.unregister(SurfaceKind::Overlay);
            self.registry.unregister(SurfaceKind::CelebrationScreen);
        }
    }
}

async fn run(cfg: Config, deep_link: Option<u64>) -> Result<()> {
    let pool = db::connect(&cfg.database_url()).await?;
    info!("Database ready at {}", cfg.db_path);

    let (ui_tx, mut ui_rx) = mpsc::channel::<UiEvent>(CHANNEL_CAPACITY);
    let (visible_tx, visible_rx) = watch::channel(true);
    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(4);

    let registry = SurfaceRegistry::new();
    registry.register(Arc::new(SystemNotificationSurface::from_config(&cfg)?));
    let assets = AssetDir::new(&cfg.asset_dir);
    let live = LiveSurfaces {
        registry: registry.clone(),
        overlay: Arc::new(OverlaySurface::new(ui_tx.clone(), assets.clone())),
        celebration: cfg
            .celebration_screen
            .then(|| Arc::new(CelebrationSurface::new(ui_tx.clone(), assets))),
    };
    live.set_live(true);

    let pipeline = Arc::new(PollPipeline::new(
        Arc::new(HttpSnapshotSource::from_config(&cfg)?),
        MilestoneTracker::new(pool.clone()),
        WidgetStore::new(pool.clone(), cfg.currency_symbol.clone()),
        Arc::new(NotificationFanout::new(registry)),
        cfg.milestone_step,
    ));
    let poller = ForegroundPoller::new(pipeline, visible_rx, refresh_rx, ui_tx);
    tokio::spawn(async move { poller.run().await });

    let mut app = DashboardState::new(cfg.currency_symbol.clone());
    if let Some(threshold) = deep_link {
        info!(threshold, "Opened from milestone notification");
        app.open_milestone(threshold, Instant::now());
    }

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &mut ui_rx, &visible_tx, &refresh_tx, &live).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableFocusChange)?;
    terminal.show_cursor()?;

    live.set_live(false);
    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Term,
    app: &mut DashboardState,
    ui_rx: &mut mpsc::Receiver<UiEvent>,
    visible_tx: &watch::Sender<bool>,
    refresh_tx: &mpsc::Sender<()>,
    live: &LiveSurfaces,
) -> Result<()> {
    let mut paused = false;
    let mut focused = true;

    loop {
        let now = Instant::now();
        while let Ok(ev) = ui_rx.try_recv() {
            if app.apply(ev, now) == Cue::Chime {
                ring_bell();
            }
        }
        app.expire(now);
        if app.alarm_due(now) {
            ring_bell();
        }

        terminal.draw(|f| render(f, app, now))?;

        if !event::poll(UI_TICK)? {
            continue;
        }
        let mut visibility_changed = false;
        match event::read()? {
            Event::FocusLost => {
                focused = false;
                visibility_changed = true;
            }
            Event::FocusGained => {
                focused = true;
                visibility_changed = true;
            }
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                // Any key (or Esc) closes an open view first.
                if app.dismiss_top() {
                    continue;
                }
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char('r') | KeyCode::Char('R') => {
                        if let Err(e) = refresh_tx.try_send(()) {
                            warn!("Refresh request dropped: {e}");
                        }
                    }
                    KeyCode::Char('p') | KeyCode::Char('P') => {
                        paused = !paused;
                        visibility_changed = true;
                    }
                    KeyCode::Char('m') | KeyCode::Char('M') => app.toggle_mute(),
                    _ => {}
                }
            }
            _ => {}
        }

        if visibility_changed {
            let visible = focused && !paused;
            if visible != app.visible {
                info!(visible, "Dashboard visibility changed");
                app.set_visible(visible);
                live.set_live(visible);
                // Fails only when the poller is gone; the UI keeps running.
                let _ = visible_tx.send(visible);
            }
        }
    }
}

fn ring_bell() {
    let mut out = io::stdout();
    let _ = out.write_all(b"\x07");
    let _ = out.flush();
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &mut DashboardState, now: Instant) {
    let area = f.area();

    if app.celebration.is_some() {
        render_celebration(f, app, area, now);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_body(f, app, chunks[1], now);
    render_footer(f, app, chunks[2]);

    if app.overlay.is_some() {
        render_overlay(f, app, area, now);
    }
}

fn render_header(f: &mut Frame, app: &DashboardState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        PollStatus::Live => ("● live".to_string(), Color::Green),
        PollStatus::Loading => ("◌ loading".to_string(), Color::Yellow),
        PollStatus::Error(e) => (format!("✗ {}", truncate(e, 48)), Color::Red),
    };
    let visibility = if app.visible { "" } else { "  (paused)" };

    let line = Line::from(vec![
        Span::styled(
            " Registration Desk  ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::styled(visibility, Style::default().fg(Color::DarkGray)),
    ]);
    let paragraph = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(paragraph, area);
}

fn render_body(f: &mut Frame, app: &mut DashboardState, area: Rect, now: Instant) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(0)])
        .split(area);

    let stat_cells = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, 4); 4])
        .split(rows[0]);

    let snap = app.snapshot.as_ref();
    let stats = [
        (" TOTAL ", format_count(snap.map(|s| s.total_count))),
        (" TODAY ", format_count(snap.map(|s| s.today_count))),
        (" THIS MONTH ", format_count(snap.map(|s| s.period_count))),
        (" COLLECTED ", app.amount_text()),
    ];
    for (cell, (title, value)) in stat_cells.iter().zip(stats) {
        render_stat(f, *cell, title, &value);
    }

    let identifier = app.ticker.frame_at(now).to_string();
    let series = Paragraph::new(vec![
        Line::raw(""),
        Line::from(Span::styled(
            if identifier.is_empty() { "—".to_string() } else { identifier },
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::raw(""),
        Line::from(Span::styled(
            if app.session_expired {
                "Session expired. Sign in again and restart the dashboard."
            } else {
                "Latest registration series"
            },
            Style::default().fg(if app.session_expired { Color::Red } else { Color::DarkGray }),
        )),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                " CURRENT SERIES ",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    );
    f.render_widget(series, rows[1]);
}

fn render_stat(f: &mut Frame, area: Rect, title: &str, value: &str) {
    let paragraph = Paragraph::new(Line::from(Span::styled(
        value.to_string(),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )))
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(title.to_string(), Style::default().fg(Color::Cyan))),
    );
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, app: &DashboardState, area: Rect) {
    let mute = if app.muted { "unmute  " } else { "mute  " };
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("refresh  "),
        Span::styled("[p] ", Style::default().fg(Color::Yellow)),
        Span::raw("pause  "),
        Span::styled("[m] ", Style::default().fg(Color::Yellow)),
        Span::raw(mute),
        Span::styled(
            format!("auto-refresh: {FOREGROUND_POLL_SECS}s"),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}

fn render_overlay(f: &mut Frame, app: &DashboardState, area: Rect, now: Instant) {
    let Some(overlay) = &app.overlay else {
        return;
    };
    let popup = centered(area, 60, 14);
    let mut text = Text::default();
    if let Some(frame) = overlay
        .frames
        .as_deref()
        .and_then(|frames| current_frame(frames, now.saturating_duration_since(overlay.shown_at)))
    {
        text.extend(Text::raw(frame.to_string()));
    }
    text.push_line(Line::raw(""));
    text.push_line(Line::from(Span::styled(
        overlay.announcement.message.clone(),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )));
    text.push_line(Line::from(Span::styled(
        "press any key",
        Style::default().fg(Color::DarkGray),
    )));

    f.render_widget(Clear, popup);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        ),
        popup,
    );
}

fn render_celebration(f: &mut Frame, app: &DashboardState, area: Rect, now: Instant) {
    let Some(view) = &app.celebration else {
        return;
    };
    let mut text = Text::default();
    text.push_line(Line::raw(""));
    if let Some(frame) = view
        .frames
        .as_deref()
        .and_then(|frames| current_frame(frames, now.saturating_duration_since(view.shown_at)))
    {
        text.extend(Text::raw(frame.to_string()));
    }
    text.push_line(Line::raw(""));
    text.push_line(Line::from(Span::styled(
        view.announcement.message.clone(),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )));
    text.push_line(Line::raw(""));
    text.push_line(Line::from(Span::styled(
        "press any key to close",
        Style::default().fg(Color::DarkGray),
    )));

    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta))
                .title(Span::styled(
                    " MILESTONE ",
                    Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
                )),
        ),
        area,
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    Rect {
        x: area.x + (area.width - w) / 2,
        y: area.y + (area.height - h) / 2,
        width: w,
        height: h,
    }
}
