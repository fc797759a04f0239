//! Pulse ingest - line-oriented JSONL reader feeding the worker channel
//!
//! The recognizer (or a replay of a recorded session) writes one JSON object
//! per line: `{"subject": 100, "at_ms": 1700000000000}`. `at_ms` is optional;
//! pulses without it are stamped by the worker on receipt. Malformed lines are
//! logged and skipped, never fatal - a glitchy producer must not take the
//! engine down.

use crate::domain::types::DetectionPulse;
use crate::infra::metrics::Metrics;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Read pulses from `input` (or stdin when None) until EOF or shutdown
pub async fn run_pulse_source(
    input: Option<&Path>,
    tx: mpsc::Sender<DetectionPulse>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    match input {
        Some(path) => {
            let file = File::open(path)
                .await
                .with_context(|| format!("Failed to open pulse input {}", path.display()))?;
            info!(input = %path.display(), "pulse_source_started");
            read_pulses(BufReader::new(file), tx, metrics, shutdown).await
        }
        None => {
            info!(input = "stdin", "pulse_source_started");
            read_pulses(BufReader::new(tokio::io::stdin()), tx, metrics, shutdown).await
        }
    }
}

async fn read_pulses<R: AsyncBufRead + Unpin>(
    reader: R,
    tx: mpsc::Sender<DetectionPulse>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut lines = reader.lines();
    let mut forwarded: u64 = 0;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read pulse line")? else {
                    break; // EOF
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match serde_json::from_str::<DetectionPulse>(trimmed) {
                    Ok(pulse) => {
                        if tx.send(pulse).await.is_err() {
                            // Worker gone, nothing left to feed
                            break;
                        }
                        forwarded += 1;
                    }
                    Err(e) => {
                        metrics.record_malformed();
                        warn!(error = %e, line = %trimmed, "pulse_parse_failed");
                    }
                }
            }
            changed = shutdown.changed() => {
                // A dropped sender counts as shutdown too
                if changed.is_err() || *shutdown.borrow() {
                    info!("pulse_source_shutdown");
                    break;
                }
            }
        }
    }

    info!(forwarded = %forwarded, "pulse_source_stopped");
    Ok(())
}
