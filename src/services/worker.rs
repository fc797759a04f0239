//! Presence worker - single-writer loop driving the engine
//!
//! Owns the engine and serializes all mutations: pulses arrive over a bounded
//! channel and a periodic tick evaluates absence timeouts. Nothing else ever
//! touches the track table, which is the whole locking policy.

use crate::domain::types::{epoch_ms, DetectionPulse};
use crate::infra::metrics::Metrics;
use crate::services::presence::{EventSink, PresenceEngine, PresenceError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Consumes detection pulses and drives the sweep cadence
pub struct PresenceWorker<S: EventSink> {
    engine: PresenceEngine<S>,
    metrics: Arc<Metrics>,
    sweep_interval: Duration,
}

impl<S: EventSink> PresenceWorker<S> {
    pub fn new(engine: PresenceEngine<S>, metrics: Arc<Metrics>, sweep_interval_ms: u64) -> Self {
        Self {
            engine,
            metrics,
            sweep_interval: Duration::from_millis(sweep_interval_ms),
        }
    }

    /// Run until the pulse channel closes.
    ///
    /// The tick fires even when no pulses arrive, so disappearance is
    /// evaluated on idle frames exactly like on busy ones.
    pub async fn run(&mut self, mut pulse_rx: mpsc::Receiver<DetectionPulse>) {
        info!(sweep_interval_ms = %self.sweep_interval.as_millis(), "presence_worker_started");

        let mut tick = interval(self.sweep_interval);

        loop {
            tokio::select! {
                pulse = pulse_rx.recv() => {
                    match pulse {
                        Some(p) => self.handle_pulse(p),
                        None => break, // channel closed
                    }
                }
                _ = tick.tick() => {
                    self.handle_sweep();
                }
            }
        }

        info!(
            tracked = %self.engine.tracked_count(),
            present = %self.engine.present_count(),
            "presence_worker_stopped"
        );
    }

    fn handle_pulse(&mut self, pulse: DetectionPulse) {
        let process_start = Instant::now();
        let at_ms = pulse.at_ms.unwrap_or_else(epoch_ms);

        match self.engine.report_detection(pulse.subject, at_ms) {
            Ok(Some(_)) => self.metrics.record_entered(),
            Ok(None) => {}
            Err(e) => {
                // Transition is committed; delivery retries are the sink's job
                self.metrics.record_sink_failure();
                error!(subject = %pulse.subject, error = %e, "event_delivery_failed");
            }
        }

        self.metrics.record_pulse(process_start.elapsed().as_micros() as u64);
    }

    fn handle_sweep(&mut self) {
        match self.engine.sweep(epoch_ms()) {
            Ok(left) => {
                for _ in &left {
                    self.metrics.record_left();
                }
            }
            Err(PresenceError::SweepDelivery { decided, failed, source }) => {
                // The transitions happened even though some deliveries did not
                for _ in &decided {
                    self.metrics.record_left();
                }
                for _ in 0..failed {
                    self.metrics.record_sink_failure();
                }
                error!(
                    failed = %failed,
                    decided = %decided.len(),
                    error = %source,
                    "event_delivery_failed"
                );
            }
            Err(e) => {
                self.metrics.record_sink_failure();
                error!(error = %e, "event_delivery_failed");
            }
        }
        self.metrics.set_gauges(
            self.engine.tracked_count() as u64,
            self.engine.present_count() as u64,
        );
    }

    /// Access to the engine for snapshots (tests and diagnostics)
    pub fn engine(&self) -> &PresenceEngine<S> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{EventKind, PresenceEvent, SubjectId};
    use crate::services::presence::{EntryPolicy, PresenceSettings, SinkError};
    use std::sync::Mutex;

    fn settings() -> PresenceSettings {
        PresenceSettings {
            entry_policy: EntryPolicy::Immediate,
            disappear_ms: 50,
            cooldown_ms: 0,
            ..PresenceSettings::default()
        }
    }

    #[tokio::test]
    async fn test_worker_processes_pulses_and_sweeps() {
        let events: Arc<Mutex<Vec<PresenceEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink = move |e: &PresenceEvent| -> Result<(), SinkError> {
            sink_events.lock().unwrap().push(*e);
            Ok(())
        };

        let engine = PresenceEngine::new(settings(), sink);
        let metrics = Arc::new(Metrics::new());
        let mut worker = PresenceWorker::new(engine, metrics.clone(), 10);

        let (tx, rx) = mpsc::channel(16);
        let subject = SubjectId::new(7).unwrap();
        tx.send(DetectionPulse { subject, at_ms: None }).await.unwrap();

        // Close the channel after a few sweep ticks past the disappear window
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            drop(tx);
        });
        worker.run(rx).await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Entered);
        assert_eq!(events[1].kind, EventKind::Left);
        assert_eq!(events[0].subject, subject);

        // The engine snapshot agrees with the emitted stream
        let state = worker.engine().get_state(subject).unwrap();
        assert!(!state.is_present);
        assert_eq!(worker.engine().tracked_count(), 1);
        assert_eq!(worker.engine().present_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_stops_when_channel_closes() {
        let sink = |_: &PresenceEvent| -> Result<(), SinkError> { Ok(()) };
        let engine = PresenceEngine::new(settings(), sink);
        let mut worker = PresenceWorker::new(engine, Arc::new(Metrics::new()), 10);

        let (tx, rx) = mpsc::channel::<DetectionPulse>(1);
        drop(tx);

        // Returns promptly instead of ticking forever
        worker.run(rx).await;
    }
}
