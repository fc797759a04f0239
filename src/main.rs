//! Presencia - attendance presence engine
//!
//! Consumes detection pulses from a recognizer (JSONL over stdin or a file),
//! debounces them into entrada/salida events, and appends confirmed events to
//! a JSONL file the attendance store tails.
//!
//! Module structure:
//! - `domain/` - Core types (SubjectId, DetectionPulse, PresenceEvent)
//! - `io/` - External interfaces (pulse ingest, event egress)
//! - `services/` - Business logic (PresenceEngine, PresenceWorker)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use presencia::domain::types::DetectionPulse;
use presencia::infra::{Config, Metrics};
use presencia::io::{run_pulse_source, AttendanceEgress};
use presencia::services::{EntryPolicy, PresenceEngine, PresenceWorker};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Presencia - attendance presence engine
#[derive(Parser, Debug)]
#[command(name = "presencia", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE env var,
    /// then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Pulse input file (JSONL); reads stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full pulse visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("presencia starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    let policy_str = match config.entry_policy() {
        EntryPolicy::Immediate => "immediate",
        EntryPolicy::Confirmed => "confirmed",
    };
    info!(
        config_file = %config.config_file(),
        entry_policy = %policy_str,
        appear_threshold = %config.appear_threshold(),
        window_ms = %config.window_ms(),
        disappear_ms = %config.disappear_ms(),
        cooldown_ms = %config.cooldown_ms(),
        sweep_interval_ms = %config.sweep_interval_ms(),
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    // Create pulse channel (bounded for backpressure)
    let (pulse_tx, pulse_rx) = mpsc::channel::<DetectionPulse>(1000);

    // Start pulse source (stdin or file replay)
    let source_metrics = metrics.clone();
    let source_shutdown = shutdown_rx.clone();
    let input = args.input.clone();
    tokio::spawn(async move {
        if let Err(e) =
            run_pulse_source(input.as_deref(), pulse_tx, source_metrics, source_shutdown).await
        {
            tracing::error!(error = %e, "pulse source error");
        }
    });

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Run the presence worker - consumes pulses until the channel closes
    let egress = AttendanceEgress::new(config.egress_file());
    let engine = PresenceEngine::new(config.presence_settings(), egress);
    let mut worker = PresenceWorker::new(engine, metrics, config.sweep_interval_ms());
    info!("presence_worker_spawned");

    worker.run(pulse_rx).await;

    info!("presencia shutdown complete");
    Ok(())
}
