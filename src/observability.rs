//! Logging setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honours `RUST_LOG`, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    uploads_accepted: AtomicU64,
    uploads_rejected: AtomicU64,
    artifacts_produced: AtomicU64,
    encodes_failed: AtomicU64,
    conversions_failed: AtomicU64,
    files_expired: AtomicU64,
    cleanup_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_accepted(&self) {
        self.uploads_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "uploads_accepted", "Metric incremented");
    }

    pub fn upload_rejected(&self) {
        self.uploads_rejected.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "uploads_rejected", "Metric incremented");
    }

    pub fn artifacts_produced(&self, count: usize) {
        self.artifacts_produced.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn encodes_failed(&self, count: usize) {
        self.encodes_failed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn conversion_failed(&self) {
        self.conversions_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "conversions_failed", "Metric incremented");
    }

    pub fn file_expired(&self) {
        self.files_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cleanup_failed(&self) {
        self.cleanup_failures.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "cleanup_failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_accepted: self.uploads_accepted.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            artifacts_produced: self.artifacts_produced.load(Ordering::Relaxed),
            encodes_failed: self.encodes_failed.load(Ordering::Relaxed),
            conversions_failed: self.conversions_failed.load(Ordering::Relaxed),
            files_expired: self.files_expired.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub uploads_accepted: u64,
    pub uploads_rejected: u64,
    pub artifacts_produced: u64,
    pub encodes_failed: u64,
    pub conversions_failed: u64,
    pub files_expired: u64,
    pub cleanup_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.upload_accepted();
        metrics.artifacts_produced(4);
        metrics.encodes_failed(1);
        metrics.file_expired();
        metrics.file_expired();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uploads_accepted, 1);
        assert_eq!(snapshot.artifacts_produced, 4);
        assert_eq!(snapshot.encodes_failed, 1);
        assert_eq!(snapshot.files_expired, 2);
        assert_eq!(snapshot.cleanup_failures, 0);
    }
}
