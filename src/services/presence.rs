//! Presence debouncing engine
//!
//! Converts the recognizer's noisy per-frame "subject seen" pulses into clean,
//! idempotent entrada/salida transitions. This is the single source of truth
//! for who is currently considered present.
//!
//! Key behaviors:
//! - One track per subject, created lazily on first pulse, kept until clear()
//! - An event is emitted if and only if `is_present` actually flips
//! - Entry is confirmed either immediately or after `appear_threshold` pulses
//!   inside `window_ms` (selectable policy)
//! - Exit only happens through sweep() once `disappear_ms` elapsed with no pulse
//! - `cooldown_ms` gates consecutive transitions in either direction
//!
//! The engine never reads the wall clock: every operation takes a caller-supplied
//! epoch-milliseconds timestamp, which keeps runs fully deterministic under test.

use crate::domain::types::{EventKind, PresenceEvent, SubjectId};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Error type sinks may surface on delivery
pub type SinkError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Receives emitted events synchronously, before the triggering call returns
pub trait EventSink {
    fn deliver(&mut self, event: &PresenceEvent) -> Result<(), SinkError>;
}

impl<F> EventSink for F
where
    F: FnMut(&PresenceEvent) -> Result<(), SinkError>,
{
    fn deliver(&mut self, event: &PresenceEvent) -> Result<(), SinkError> {
        self(event)
    }
}

#[derive(Debug, Error)]
pub enum PresenceError {
    /// The sink rejected an event. The transition is already committed;
    /// re-delivery is the sink's/caller's responsibility.
    #[error("event sink rejected {kind} for subject {subject} at {at_ms}: {source}")]
    Sink {
        kind: EventKind,
        subject: SubjectId,
        at_ms: u64,
        #[source]
        source: SinkError,
    },
    /// One or more sweep deliveries failed. All transitions are committed
    /// and every decided event was offered to the sink; `decided` carries
    /// the full list so the caller can re-deliver.
    #[error("event sink rejected {} of {} sweep transitions: {}", .failed, .decided.len(), .source)]
    SweepDelivery {
        decided: Vec<PresenceEvent>,
        failed: usize,
        #[source]
        source: SinkError,
    },
}

/// How an absent subject is confirmed as entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryPolicy {
    /// First pulse enters, cooldown permitting
    Immediate,
    /// Requires `appear_threshold` pulses within `window_ms` of each other
    Confirmed,
}

/// Engine tuning, immutable for the engine's lifetime
#[derive(Debug, Clone, Copy)]
pub struct PresenceSettings {
    pub entry_policy: EntryPolicy,
    /// Pulses required to confirm entry (confirmed policy only)
    pub appear_threshold: u32,
    /// Max gap between pulses before the confirmation count resets
    pub window_ms: u64,
    /// Non-detection span after which a present subject is marked left
    pub disappear_ms: u64,
    /// Minimum span between two transitions for the same subject
    pub cooldown_ms: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            entry_policy: EntryPolicy::Confirmed,
            appear_threshold: 3,
            window_ms: 2_000,
            disappear_ms: 10_000,
            cooldown_ms: 30_000,
        }
    }
}

/// Per-subject mutable state, owned exclusively by the engine
#[derive(Debug, Clone, Copy, Default)]
struct SubjectTrack {
    is_present: bool,
    last_seen_ms: Option<u64>,
    last_toggle_ms: Option<u64>,
    seen_count: u32,
}

impl SubjectTrack {
    /// Elapsed-time checks saturate so an out-of-order timestamp can never
    /// produce a negative duration that falsely satisfies a threshold.
    fn cooldown_elapsed(&self, at_ms: u64, cooldown_ms: u64) -> bool {
        self.last_toggle_ms.map_or(true, |t| at_ms.saturating_sub(t) >= cooldown_ms)
    }

    /// Refresh the timeout clock. Monotone per track: a late pulse must not
    /// move the disappearance deadline backwards.
    fn refresh_seen(&mut self, at_ms: u64) {
        self.last_seen_ms = Some(self.last_seen_ms.map_or(at_ms, |s| s.max(at_ms)));
    }
}

/// Read-only view of a track for callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub is_present: bool,
    pub last_seen_ms: Option<u64>,
    pub last_toggle_ms: Option<u64>,
    pub seen_count: u32,
}

/// Presence state machine over all subjects
///
/// Plain single-owner mutable state: no locks, no I/O, no self-scheduling.
/// The caller serializes access (one worker task in production).
pub struct PresenceEngine<S: EventSink> {
    settings: PresenceSettings,
    /// BTreeMap so a sweep emits in stable subject order run-to-run
    tracks: BTreeMap<SubjectId, SubjectTrack>,
    sink: S,
}

impl<S: EventSink> PresenceEngine<S> {
    pub fn new(settings: PresenceSettings, sink: S) -> Self {
        Self { settings, tracks: BTreeMap::new(), sink }
    }

    /// Record a recognizer pulse for `subject` at logical time `at_ms`.
    ///
    /// Returns the `Entered` event if this pulse confirmed a transition.
    /// Already-present subjects only get their timeout clock refreshed.
    pub fn report_detection(
        &mut self,
        subject: SubjectId,
        at_ms: u64,
    ) -> Result<Option<PresenceEvent>, PresenceError> {
        let s = self.settings;
        let track = self.tracks.entry(subject).or_default();

        if track.is_present {
            track.refresh_seen(at_ms);
            trace!(subject = %subject, at_ms = %at_ms, "pulse_refresh");
            return Ok(None);
        }

        let confirmed = match s.entry_policy {
            EntryPolicy::Immediate => {
                track.refresh_seen(at_ms);
                true
            }
            EntryPolicy::Confirmed => {
                // A gap longer than the window voids the accumulated pulses
                if let Some(seen) = track.last_seen_ms {
                    if at_ms.saturating_sub(seen) > s.window_ms {
                        track.seen_count = 0;
                    }
                }
                track.seen_count = track.seen_count.saturating_add(1);
                track.refresh_seen(at_ms);
                track.seen_count >= s.appear_threshold
            }
        };

        if !confirmed {
            trace!(
                subject = %subject,
                seen_count = %track.seen_count,
                threshold = %s.appear_threshold,
                "pulse_accumulating"
            );
            return Ok(None);
        }

        if !track.cooldown_elapsed(at_ms, s.cooldown_ms) {
            debug!(subject = %subject, at_ms = %at_ms, "pulse_suppressed_cooldown");
            return Ok(None);
        }

        track.is_present = true;
        track.last_toggle_ms = Some(at_ms);

        let event = PresenceEvent::new(EventKind::Entered, subject, at_ms);
        info!(subject = %subject, at_ms = %at_ms, "presence_entered");
        self.deliver(event)?;
        Ok(Some(event))
    }

    /// Evaluate absence timeouts at logical time `at_ms`.
    ///
    /// Called by the owner at its own cadence, including ticks where nothing
    /// was detected. Only present tracks are evaluated; events come out in
    /// ascending subject order.
    pub fn sweep(&mut self, at_ms: u64) -> Result<Vec<PresenceEvent>, PresenceError> {
        let s = self.settings;
        let mut flipped = Vec::new();

        for (&subject, track) in self.tracks.iter_mut() {
            if !track.is_present {
                continue;
            }
            let Some(seen) = track.last_seen_ms else {
                continue;
            };
            if at_ms.saturating_sub(seen) < s.disappear_ms {
                continue;
            }
            if !track.cooldown_elapsed(at_ms, s.cooldown_ms) {
                debug!(subject = %subject, at_ms = %at_ms, "sweep_suppressed_cooldown");
                continue;
            }

            track.is_present = false;
            track.last_toggle_ms = Some(at_ms);

            info!(subject = %subject, at_ms = %at_ms, "presence_left");
            flipped.push(PresenceEvent::new(EventKind::Left, subject, at_ms));
        }

        // State is committed before any delivery, so a sink failure cannot
        // leave a subject stuck mid-transition. Every decided event is still
        // offered to the sink; the first failure is reported after the loop.
        let mut failed = 0usize;
        let mut first_failure: Option<SinkError> = None;
        for event in &flipped {
            if let Err(source) = self.sink.deliver(event) {
                failed += 1;
                if first_failure.is_none() {
                    first_failure = Some(source);
                }
            }
        }
        match first_failure {
            None => Ok(flipped),
            Some(source) => {
                Err(PresenceError::SweepDelivery { decided: flipped, failed, source })
            }
        }
    }

    /// Read-only snapshot of a subject's track, or None if never observed
    pub fn get_state(&self, subject: SubjectId) -> Option<TrackSnapshot> {
        self.tracks.get(&subject).map(|t| TrackSnapshot {
            is_present: t.is_present,
            last_seen_ms: t.last_seen_ms,
            last_toggle_ms: t.last_toggle_ms,
            seen_count: t.seen_count,
        })
    }

    /// Drop all tracks. Test isolation / explicit operator reset.
    pub fn clear(&mut self) {
        let dropped = self.tracks.len();
        self.tracks.clear();
        info!(dropped = %dropped, "presence_cleared");
    }

    /// Number of subjects ever observed (since the last clear)
    pub fn tracked_count(&self) -> usize {
        self.tracks.len()
    }

    /// Number of subjects currently confirmed present
    pub fn present_count(&self) -> usize {
        self.tracks.values().filter(|t| t.is_present).count()
    }

    fn deliver(&mut self, event: PresenceEvent) -> Result<(), PresenceError> {
        Self::deliver_with(&mut self.sink, event)
    }

    fn deliver_with(sink: &mut S, event: PresenceEvent) -> Result<(), PresenceError> {
        sink.deliver(&event).map_err(|source| PresenceError::Sink {
            kind: event.kind,
            subject: event.subject,
            at_ms: event.at_ms,
            source,
        })
    }
}
