// src/main.rs
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use posture_monitor::config::MonitorSettings;
use posture_monitor::history::{export_csv, format_duration, JsonFileStore, ProgressSummary, SessionStore};
use posture_monitor::monitor::{read_frame_events, Monitor, SessionContext};
use posture_monitor::profiles::ProfileRegistry;
use posture_monitor::session::{SessionRecord, SystemClock};

/// Scores posture from JSON Lines landmark frames (`{"landmarks": [...]}`)
/// read on stdin, until the stream ends or Ctrl-C is pressed.
#[derive(Parser, Debug)]
#[command(name = "posture_monitor", version)]
struct CliArgs {
    /// Settings file (JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Posture type: sitting, standing, working, ...
    #[arg(long, value_name = "TYPE")]
    posture: Option<String>,

    /// Custom posture profile table (JSON)
    #[arg(long, value_name = "PATH")]
    profiles: Option<PathBuf>,

    /// Session history file
    #[arg(long, value_name = "PATH")]
    history: Option<PathBuf>,

    /// Print progress across stored sessions and exit
    #[arg(long)]
    summary: bool,

    /// Export stored sessions as CSV and exit
    #[arg(long, value_name = "PATH")]
    export_csv: Option<PathBuf>,

    /// Delete stored sessions and exit
    #[arg(long)]
    clear_history: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the session record.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let mut settings = match &args.config {
        Some(path) => MonitorSettings::load(path)?,
        None => MonitorSettings::default(),
    };
    if let Some(posture) = args.posture.clone() {
        settings.posture_type = posture;
    }
    if let Some(profiles) = args.profiles.clone() {
        settings.profiles_path = Some(profiles);
    }
    if let Some(history) = args.history.clone() {
        settings.history_path = history;
    }

    let mut store = JsonFileStore::new(&settings.history_path);

    if args.clear_history {
        store.clear()?;
        info!(path = %store.path().display(), "Session history cleared");
        return Ok(());
    }
    if args.summary {
        return print_summary(&store);
    }
    if let Some(path) = &args.export_csv {
        let records = store.load_all()?;
        let path = export_csv(&records, path)?;
        info!(path = %path.display(), sessions = records.len(), "Exported session history");
        return Ok(());
    }

    // Profiles are validated before any frame is read.
    let registry = match &settings.profiles_path {
        Some(path) => ProfileRegistry::load(path)?,
        None => ProfileRegistry::builtin().clone(),
    };
    let profile = registry.require(&settings.posture_type)?.clone();
    for tip in &profile.tips {
        info!("Tip: {tip}");
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let record = runtime.block_on(monitor_stdin(profile, &settings));
    // A blocked stdin read must not keep the process alive.
    runtime.shutdown_background();

    match record {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            store.append(record)?;
            info!(path = %store.path().display(), "Session saved");
        }
        None => info!("No session recorded"),
    }
    Ok(())
}

async fn monitor_stdin(
    profile: posture_monitor::PostureProfile,
    settings: &MonitorSettings,
) -> Option<SessionRecord> {
    let context = SessionContext::start(profile, settings, SystemClock::new());
    let (tx, rx) = mpsc::channel(64);

    let reader = tokio::spawn(read_frame_events(BufReader::new(tokio::io::stdin()), tx));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let record = Monitor::new(context, settings.tick_interval())
        .run(rx, shutdown)
        .await;

    if reader.is_finished() {
        match reader.await {
            Ok(Ok(frames)) => info!(frames, "Landmark stream closed"),
            Ok(Err(e)) => warn!(error = %format!("{e:#}"), "Landmark stream failed"),
            Err(e) => warn!(error = %e, "Landmark reader panicked"),
        }
    } else {
        reader.abort();
    }
    record
}

fn print_summary(store: &JsonFileStore) -> Result<()> {
    let records = store.load_all()?;
    let summary = ProgressSummary::from_records(&records);

    info!(
        sessions = summary.total_sessions,
        average = summary.average_score,
        total_time = %format_duration(summary.total_seconds),
        "Progress"
    );
    for record in &summary.recent {
        info!(
            "{} {}% {} {}",
            record.posture_type,
            record.stats.average_score,
            format_duration(record.stats.duration_seconds),
            record.timestamp.format("%Y-%m-%d %H:%M"),
        );
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
