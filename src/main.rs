//! Wayfinder - voice-driven navigation assistant
//!
//! Presents route options, lets the user pick one by voice or keyboard, then
//! counts down to arrival while a background obstacle monitor can pause the
//! countdown.
//!
//! Module structure:
//! - `domain/` - Route options, session state, ETA phrasing
//! - `io/` - External collaborators (voice, directions, geolocation, detectors)
//! - `services/` - Guidance core (orchestrator, selection, monitor, catalogs)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use wayfinder::infra::{Config, Metrics};
use wayfinder::io::{probe_detector, probe_voice, IpLocator, VoiceChannel};
use wayfinder::services::{
    GuidanceOrchestrator, ObstacleMonitor, ObstacleSignal, RoutePlanner, SessionRequest,
};

/// Wayfinder - voice-driven navigation assistant
#[derive(Parser, Debug)]
#[command(name = "wayfinder", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Force accelerated demo timing
    #[arg(long)]
    demo: bool,

    /// Destination; skips the destination prompt
    #[arg(long)]
    destination: Option<String>,

    /// Disable the obstacle monitor
    #[arg(long, conflicts_with = "vision")]
    no_vision: bool,

    /// Force the obstacle monitor on
    #[arg(long)]
    vision: bool,

    /// Pick the shortest route without asking
    #[arg(long)]
    auto_select: bool,

    /// Start guidance without waiting for "start"
    #[arg(long)]
    auto_start: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for state transitions and selection detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "wayfinder starting");

    let args = Args::parse();

    // File, then environment; flags are applied below
    let config = Config::load(args.config.as_deref());

    let demo_mode = config.demo_mode() || args.demo;
    let vision = !args.no_vision && (args.vision || config.vision_enabled());
    let timing = config.timing(demo_mode);

    info!(
        config_file = %config.config_file(),
        demo_mode = %demo_mode,
        vision = %vision,
        tick_ms = %timing.tick.as_millis(),
        pause_ms = %timing.pause.as_millis(),
        live_directions = %(!demo_mode && config.google_api_key().is_some()),
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());
    let voice: Arc<dyn VoiceChannel> = Arc::new(probe_voice(&config));
    let catalog = Arc::new(RoutePlanner::new(&config, demo_mode));

    // Operator cancellation on Ctrl+C
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = cancel_tx.send(true);
    });

    let mut orchestrator = GuidanceOrchestrator::new(voice.clone(), catalog, &config, timing)
        .with_metrics(metrics.clone())
        .with_cancel(cancel_rx)
        .with_locator(Arc::new(IpLocator::new(&config)));

    let mut forwarder = None;
    if vision {
        let detector = probe_detector(&config, demo_mode);
        let (alert_tx, mut alert_rx) = mpsc::channel::<String>(16);
        let monitor = ObstacleMonitor::new(detector, ObstacleSignal::new(), &timing, metrics.clone())
            .with_alert_tx(alert_tx);
        orchestrator = orchestrator.with_monitor(monitor);

        // Speak detector alerts and vision notices as they arrive
        let alert_voice = voice.clone();
        forwarder = Some(tokio::spawn(async move {
            while let Some(alert) = alert_rx.recv().await {
                alert_voice.say(&alert).await;
            }
        }));
    }

    let request = SessionRequest {
        destination: args.destination,
        auto_select: args.auto_select,
        auto_start: args.auto_start,
        ..SessionRequest::default()
    };
    let report = orchestrator.run(request).await;

    // Closing the alert channel lets the forwarder speak the last notice and exit
    drop(orchestrator);
    if let Some(forwarder) = forwarder {
        let _ = tokio::time::timeout(Duration::from_secs(5), forwarder).await;
    }

    info!(
        session_id = %report.session_id,
        outcome = ?report.outcome,
        mode = %report.route.as_ref().map_or("none", |r| r.mode.as_str()),
        transitions = ?report.transitions,
        "session_report"
    );
    metrics.report().log();

    info!("wayfinder shutdown complete");
    Ok(())
}
