use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::Result;
use super::ledger::{ExpiryLedger, ExpiryRecord};
use crate::observability::Metrics;

/// Totals from one sweep of the ledger
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub batches: usize,
    pub files_deleted: usize,
    pub failures: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct BatchOutcome {
    deleted: usize,
    missing: usize,
    failed: usize,
}

/// Deletes batches of files once their retention window has elapsed.
///
/// Each batch is written to the [`ExpiryLedger`] before its timer is armed
/// and removed once deleted, so batches pending at shutdown are picked up
/// again by [`RetentionScheduler::recover`].
#[derive(Clone)]
pub struct RetentionScheduler {
    ledger: ExpiryLedger,
    metrics: Arc<Metrics>,
}

impl RetentionScheduler {
    pub fn new(ledger: ExpiryLedger, metrics: Arc<Metrics>) -> Self {
        Self { ledger, metrics }
    }

    /// Delete every path in `delete_list` once `delay` has elapsed.
    ///
    /// Fire-and-forget: returns immediately with the batch id. A ledger
    /// failure is logged and the in-memory timer is armed regardless.
    pub fn schedule(&self, delete_list: Vec<PathBuf>, delay: Duration) -> String {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(365));
        let record = ExpiryRecord::new(Uuid::now_v7().simple().to_string(), expires_at, delete_list);

        if let Err(err) = self.ledger.record(&record) {
            warn!(batch_id = %record.batch_id, error = %err, "Failed to persist expiry, cleanup will not survive a restart");
        }

        info!(
            batch_id = %record.batch_id,
            files = record.paths.len(),
            delay = ?delay,
            "Scheduled cleanup"
        );

        let batch_id = record.batch_id.clone();
        self.arm(record, delay);
        batch_id
    }

    /// Re-arm every batch left in the ledger. Overdue batches fire at once.
    pub fn recover(&self) -> Result<usize> {
        let records = self.ledger.all()?;
        let now = Utc::now();

        for record in &records {
            let remaining = (record.expires_at - now).to_std().unwrap_or(Duration::ZERO);
            self.arm(record.clone(), remaining);
        }

        if !records.is_empty() {
            info!(batches = records.len(), "Recovered pending cleanups");
        }
        Ok(records.len())
    }

    /// Delete every batch whose expiry is at or before `now`
    pub async fn sweep_due(&self, now: DateTime<Utc>) -> Result<SweepStats> {
        let mut stats = SweepStats::default();

        for record in self.ledger.due(now)? {
            let outcome = self.expire(&record).await;
            stats.batches += 1;
            stats.files_deleted += outcome.deleted;
            stats.failures += outcome.failed;
        }

        if stats.batches > 0 {
            info!(?stats, "Sweep complete");
        }
        Ok(stats)
    }

    /// Sweep the ledger every `interval` until the task is aborted
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately; recover() already covered startup
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(err) = scheduler.sweep_due(Utc::now()).await {
                    error!(error = %err, "Expiry sweep failed");
                }
            }
        })
    }

    /// Number of batches still waiting for deletion
    pub fn pending(&self) -> Result<usize> {
        self.ledger.len()
    }

    fn arm(&self, record: ExpiryRecord, delay: Duration) {
        let scheduler = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.expire(&record).await;
        });
    }

    async fn expire(&self, record: &ExpiryRecord) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for path in &record.paths {
            match fs::remove_file(path).await {
                Ok(()) => {
                    outcome.deleted += 1;
                    self.metrics.file_expired();
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    outcome.missing += 1;
                    debug!(path = %path.display(), "Expired file already gone");
                }
                Err(err) => {
                    outcome.failed += 1;
                    self.metrics.cleanup_failed();
                    warn!(path = %path.display(), error = %err, "Failed to delete expired file");
                }
            }
        }

        if let Err(err) = self.ledger.remove(record) {
            warn!(batch_id = %record.batch_id, error = %err, "Failed to clear expiry record");
        }

        info!(
            batch_id = %record.batch_id,
            deleted = outcome.deleted,
            missing = outcome.missing,
            failed = outcome.failed,
            "Cleaned up expired files"
        );

        outcome
    }
}
