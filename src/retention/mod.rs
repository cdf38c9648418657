//! Deferred deletion of uploads and their artifacts
//!
//! Every successful upload hands its original and artifact paths to the
//! [`RetentionScheduler`], which deletes them together after the configured
//! retention delay. Deletion is best-effort per path: a missing or
//! undeletable file is logged and never aborts the rest of the batch.
//!
//! ## Restarts
//!
//! Timers live in the process, but every batch is also written to a Fjall
//! keyspace ([`ExpiryLedger`]). On startup `recover()` re-arms what is left,
//! and a periodic sweep deletes anything overdue.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use multimat::retention::{ExpiryLedger, RetentionScheduler};
//!
//! let scheduler = RetentionScheduler::new(ExpiryLedger::open("data/retention")?, metrics);
//! scheduler.recover()?;
//! scheduler.schedule(vec![original, artifact], Duration::from_secs(3600));
//! ```

pub mod error;
pub mod ledger;
pub mod scheduler;

pub use error::{Result, RetentionError};
pub use ledger::{ExpiryLedger, ExpiryRecord};
pub use scheduler::{RetentionScheduler, SweepStats};
