//! Backup retention and pruning.
//!
//! # Overview
//!
//! [`RetentionSelector`] is a pure function over in-memory records: given the
//! backups of one project and a [`RetentionConfig`], it returns the set to keep.
//! [`Pruner`] is its caller: it scans a project root, runs the selector,
//! deletes everything else and removes the date directories left empty.
//!
//! # Example
//!
//! ```rust,ignore
//! use keepsake::gc::{PruneOptions, Pruner, RetentionConfig};
//! use keepsake::storage::FilesystemStore;
//! use std::sync::Arc;
//!
//! let options = PruneOptions::new("site", "/var/backups/site", RetentionConfig::default());
//! let pruner = Pruner::new(Arc::new(FilesystemStore::new()), options);
//!
//! // Dry run to see what would be cleaned up
//! let preview = pruner.preview()?;
//! println!("Would delete {} backups", preview.plan.delete_count());
//!
//! // Actually perform the cleanup
//! let result = pruner.prune()?;
//! println!("{}", result.summary());
//! ```
//!
//! # Locking
//!
//! A non dry-run prune holds [`PruneLock`] on the project root for its whole
//! duration, so two runs never delete from the same tree concurrently.

mod lock;
mod prune;
mod retention;

pub use lock::{DEFAULT_STALE_AFTER, LOCK_FILE_NAME, PruneLock};
pub use prune::{FailedRemoval, PruneOptions, PrunePreview, PruneResult, Pruner};
pub use retention::{
    DEFAULT_DAILY, DEFAULT_MONTHLY, DEFAULT_WEEKLY, RETENTION_DAILY_ENV, RETENTION_MONTHLY_ENV,
    RETENTION_WEEKLY_ENV, RetentionConfig, RetentionPlan, RetentionRule, RetentionSelector,
    select,
};
