//! Home-screen style widget: prints the last stored display text.
//!
//! `widget`               print once
//! `widget --watch SECS`  reprint every SECS seconds
//! `widget --json`        one JSON line for status bars, with a click command

use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use regdesk_milestones::config::Config;
use regdesk_milestones::db;
use regdesk_milestones::error::Result;
use regdesk_milestones::state::WidgetStore;

#[derive(Debug, Parser)]
#[command(name = "widget", version, about = "Print the stored widget text")]
struct Args {
    /// Reprint every SECS seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    watch: Option<u64>,
    /// One JSON line for status bars, with a click command
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StatusBarLine<'a> {
    text: &'a str,
    tooltip: &'static str,
    on_click: &'a str,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_writer(std::io::stderr)
        .init();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cfg, args).await {
        eprintln!("widget: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config, args: Args) -> Result<()> {
    let pool = db::connect(&cfg.database_url()).await?;
    let store = WidgetStore::new(pool, cfg.currency_symbol.clone());

    let Some(every) = args.watch.map(Duration::from_secs) else {
        let text = store.get().await?;
        println!("{}", render(&text, args.json, &cfg.dashboard_command)?);
        return Ok(());
    };

    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match store.get().await {
                    Ok(text) => println!("{}", render(&text, args.json, &cfg.dashboard_command)?),
                    Err(e) => warn!("Widget read failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn render(text: &str, json: bool, dashboard_command: &str) -> Result<String> {
    if !json {
        return Ok(text.to_string());
    }
    Ok(serde_json::to_string(&StatusBarLine {
        text,
        tooltip: "Total collected. Click to open the dashboard.",
        on_click: dashboard_command,
    })?)
}
