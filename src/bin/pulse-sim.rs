//! Pulse simulator - deterministic synthetic recognizer output
//!
//! Writes JSONL detection pulses to stdout for piping into the main binary:
//!
//!   pulse-sim --subjects 3 --fps 10 --seconds 60 | presencia --config config/dev.toml
//!
//! Dropout is a fixed modulo pattern rather than random noise, so two runs with
//! the same arguments produce identical pulse streams.

use clap::Parser;
use presencia::domain::types::{epoch_ms, DetectionPulse, SubjectId};
use std::io::Write;

/// Deterministic detection pulse generator
#[derive(Parser, Debug)]
#[command(name = "pulse-sim", version, about)]
struct Args {
    /// Number of simulated subjects (ids 1..=N)
    #[arg(long, default_value_t = 2)]
    subjects: i64,

    /// Simulated recognizer frame rate
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Length of the simulated session
    #[arg(long, default_value_t = 60)]
    seconds: u64,

    /// Drop every Nth frame per subject (0 = no dropout)
    #[arg(long, default_value_t = 4)]
    dropout: u64,

    /// Epoch-milliseconds base for pulse timestamps (defaults to now)
    #[arg(long)]
    base_ms: Option<u64>,

    /// Subjects walk away for this many seconds mid-session (0 = stay)
    #[arg(long, default_value_t = 15)]
    absence_secs: u64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let base_ms = args.base_ms.unwrap_or_else(epoch_ms);
    let frame_ms = (1_000 / u64::from(args.fps.max(1))).max(1);
    let total_frames = args.seconds * 1_000 / frame_ms;

    // Mid-session absence window, one frame-span per subject offset so the
    // departures stagger instead of all flapping at once
    let absence_start = total_frames / 2;
    let absence_frames = args.absence_secs * 1_000 / frame_ms;

    let mut stdout = std::io::stdout().lock();
    for frame in 0..total_frames {
        for raw in 1..=args.subjects {
            let offset = (raw as u64) * 7;
            if args.dropout > 0 && (frame + offset) % args.dropout == 0 {
                continue; // recognizer missed this frame
            }
            let gone_since = absence_start + offset;
            if args.absence_secs > 0
                && frame >= gone_since
                && frame < gone_since + absence_frames
            {
                continue; // subject stepped out
            }

            let pulse = DetectionPulse {
                subject: SubjectId::new(raw)?,
                at_ms: Some(base_ms + frame * frame_ms),
            };
            writeln!(stdout, "{}", serde_json::to_string(&pulse)?)?;
        }
    }

    Ok(())
}
