//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention. All counter
//! updates are lock-free; reporting is the only operation that needs
//! synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Metrics collector for the presence pipeline
pub struct Metrics {
    // Interval counters (swapped to zero on each report)
    pulses: AtomicU64,
    entered: AtomicU64,
    left: AtomicU64,
    sink_failures: AtomicU64,
    malformed: AtomicU64,
    // Pulse handling latency within the interval (microseconds)
    pulse_latency_sum_us: AtomicU64,
    pulse_latency_max_us: AtomicU64,
    // Cumulative totals (never reset)
    pulses_total: AtomicU64,
    entered_total: AtomicU64,
    left_total: AtomicU64,
    // Gauges, set by the worker after each sweep
    tracked_subjects: AtomicU64,
    present_subjects: AtomicU64,
    // Report interval measurement
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pulses: AtomicU64::new(0),
            entered: AtomicU64::new(0),
            left: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            pulse_latency_sum_us: AtomicU64::new(0),
            pulse_latency_max_us: AtomicU64::new(0),
            pulses_total: AtomicU64::new(0),
            entered_total: AtomicU64::new(0),
            left_total: AtomicU64::new(0),
            tracked_subjects: AtomicU64::new(0),
            present_subjects: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn record_pulse(&self, latency_us: u64) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
        self.pulses_total.fetch_add(1, Ordering::Relaxed);
        self.pulse_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.pulse_latency_max_us, latency_us);
    }

    pub fn record_entered(&self) {
        self.entered.fetch_add(1, Ordering::Relaxed);
        self.entered_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_left(&self) {
        self.left.fetch_add(1, Ordering::Relaxed);
        self.left_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_gauges(&self, tracked: u64, present: u64) {
        self.tracked_subjects.store(tracked, Ordering::Relaxed);
        self.present_subjects.store(present, Ordering::Relaxed);
    }

    /// Swap interval counters and build a summary for logging
    pub fn report(&self) -> MetricsSummary {
        let mut last_report = self.last_report_time.lock();
        let interval_secs = last_report.elapsed().as_secs_f64();
        *last_report = Instant::now();
        drop(last_report);

        let pulses = self.pulses.swap(0, Ordering::Relaxed);
        let latency_sum = self.pulse_latency_sum_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            interval_secs,
            pulses,
            entered: self.entered.swap(0, Ordering::Relaxed),
            left: self.left.swap(0, Ordering::Relaxed),
            sink_failures: self.sink_failures.swap(0, Ordering::Relaxed),
            malformed: self.malformed.swap(0, Ordering::Relaxed),
            pulse_latency_avg_us: if pulses > 0 { latency_sum / pulses } else { 0 },
            pulse_latency_max_us: self.pulse_latency_max_us.swap(0, Ordering::Relaxed),
            pulses_total: self.pulses_total.load(Ordering::Relaxed),
            entered_total: self.entered_total.load(Ordering::Relaxed),
            left_total: self.left_total.load(Ordering::Relaxed),
            tracked_subjects: self.tracked_subjects.load(Ordering::Relaxed),
            present_subjects: self.present_subjects.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one reporting interval
#[derive(Debug)]
pub struct MetricsSummary {
    pub interval_secs: f64,
    pub pulses: u64,
    pub entered: u64,
    pub left: u64,
    pub sink_failures: u64,
    pub malformed: u64,
    pub pulse_latency_avg_us: u64,
    pub pulse_latency_max_us: u64,
    pub pulses_total: u64,
    pub entered_total: u64,
    pub left_total: u64,
    pub tracked_subjects: u64,
    pub present_subjects: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            interval_secs = %format!("{:.1}", self.interval_secs),
            pulses = %self.pulses,
            entered = %self.entered,
            left = %self.left,
            sink_failures = %self.sink_failures,
            malformed = %self.malformed,
            pulse_latency_avg_us = %self.pulse_latency_avg_us,
            pulse_latency_max_us = %self.pulse_latency_max_us,
            pulses_total = %self.pulses_total,
            entered_total = %self.entered_total,
            left_total = %self.left_total,
            tracked = %self.tracked_subjects,
            present = %self.present_subjects,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_counters_reset_on_report() {
        let metrics = Metrics::new();
        metrics.record_pulse(100);
        metrics.record_pulse(300);
        metrics.record_entered();

        let summary = metrics.report();
        assert_eq!(summary.pulses, 2);
        assert_eq!(summary.entered, 1);
        assert_eq!(summary.pulse_latency_avg_us, 200);
        assert_eq!(summary.pulse_latency_max_us, 300);

        let next = metrics.report();
        assert_eq!(next.pulses, 0);
        assert_eq!(next.pulse_latency_max_us, 0);
    }

    #[test]
    fn test_cumulative_totals_survive_report() {
        let metrics = Metrics::new();
        metrics.record_pulse(10);
        metrics.record_left();
        metrics.report();
        metrics.record_pulse(10);

        let summary = metrics.report();
        assert_eq!(summary.pulses_total, 2);
        assert_eq!(summary.left_total, 1);
    }

    #[test]
    fn test_gauges_reflect_last_set() {
        let metrics = Metrics::new();
        metrics.set_gauges(5, 2);
        metrics.set_gauges(6, 1);

        let summary = metrics.report();
        assert_eq!(summary.tracked_subjects, 6);
        assert_eq!(summary.present_subjects, 1);
    }

    #[test]
    fn test_update_atomic_max() {
        let max = AtomicU64::new(0);
        update_atomic_max(&max, 7);
        update_atomic_max(&max, 3);
        assert_eq!(max.load(Ordering::Relaxed), 7);
    }
}
