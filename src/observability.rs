//! Logging setup and client-side counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins; otherwise `fallback` (from `telemetry.log_filter`) is used.
pub fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding apps) keeps the first subscriber
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    submissions_accepted: AtomicU64,
    submissions_failed: AtomicU64,
    status_updates: AtomicU64,
    reconnects: AtomicU64,
    bundles_retrieved: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submission_accepted(&self) {
        self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_accepted", "Metric incremented");
    }

    pub fn submission_failed(&self) {
        self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions_failed", "Metric incremented");
    }

    pub fn status_update(&self) {
        self.status_updates.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "status_updates", "Metric incremented");
    }

    pub fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "reconnects", "Metric incremented");
    }

    pub fn bundle_retrieved(&self) {
        self.bundles_retrieved.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "bundles_retrieved", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            submissions_failed: self.submissions_failed.load(Ordering::Relaxed),
            status_updates: self.status_updates.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            bundles_retrieved: self.bundles_retrieved.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submissions_accepted: u64,
    pub submissions_failed: u64,
    pub status_updates: u64,
    pub reconnects: u64,
    pub bundles_retrieved: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.submission_accepted();
        metrics.status_update();
        metrics.status_update();
        metrics.reconnect();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.submissions_accepted, 1);
        assert_eq!(snapshot.submissions_failed, 0);
        assert_eq!(snapshot.status_updates, 2);
        assert_eq!(snapshot.reconnects, 1);
        assert_eq!(snapshot.bundles_retrieved, 0);
    }
}
