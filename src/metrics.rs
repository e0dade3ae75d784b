// Lightweight activity counters
//
// Tracks operation outcomes and panel refreshes with atomics so any thread
// can record without locks. Summarized to the log at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Metrics {
    /// User-initiated operations (retries are not re-counted).
    pub ops_started: AtomicU64,

    /// Operations that finished successfully.
    pub ops_completed: AtomicU64,

    /// Operations that finished with an error.
    pub ops_failed: AtomicU64,

    /// Operations cancelled by the user.
    pub ops_cancelled: AtomicU64,

    /// Operations-panel rebuilds triggered by registry notifications.
    pub panel_refreshes: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ops_started: AtomicU64::new(0),
            ops_completed: AtomicU64::new(0),
            ops_failed: AtomicU64::new(0),
            ops_cancelled: AtomicU64::new(0),
            panel_refreshes: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_started(&self) {
        self.ops_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.ops_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.ops_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.ops_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panel_refresh(&self) {
        self.panel_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the metrics were created (application start).
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log a one-shot summary, typically at shutdown.
    pub fn log_summary(&self) {
        tracing::info!(
            "session summary: uptime {:.0}s, operations {} started / {} completed / {} failed / {} cancelled, {} panel refreshes",
            self.uptime().as_secs_f64(),
            self.ops_started.load(Ordering::Relaxed),
            self.ops_completed.load(Ordering::Relaxed),
            self.ops_failed.load(Ordering::Relaxed),
            self.ops_cancelled.load(Ordering::Relaxed),
            self.panel_refreshes.load(Ordering::Relaxed),
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.ops_started.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.ops_failed.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_operations() {
        let metrics = Metrics::new();

        metrics.record_started();
        metrics.record_started();
        metrics.record_completed();
        metrics.record_failed();
        metrics.record_cancelled();
        metrics.record_panel_refresh();

        assert_eq!(metrics.ops_started.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.ops_completed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ops_failed.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.ops_cancelled.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.panel_refreshes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_uptime_advances() {
        let metrics = Metrics::new();
        std::thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
