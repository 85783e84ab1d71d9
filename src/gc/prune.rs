//! Retention-driven pruning of a project's backup tree.
//!
//! The pruner is the side-effecting half of retention: it scans the project
//! root, asks the [`RetentionSelector`] which archives survive, deletes the
//! rest and removes date directories left empty.
//!
//! Each deletion is independent. A file that cannot be removed is logged and
//! reported in [`PruneResult::failed`]; the run carries on with the next one.
//! Empty-directory cleanup walks upwards from the deleted file and stops at the
//! first non-empty directory or at the project root, which is never removed.

use super::lock::{DEFAULT_STALE_AFTER, PruneLock};
use super::retention::{RetentionConfig, RetentionPlan, RetentionSelector};
use crate::Result;
use crate::storage::{ArchiveStore, ScanResult, scan_project};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

/// Safely converts Duration to milliseconds as u64, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts usize to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn usize_to_f64(value: usize) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Converts u64 to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn u64_to_f64(value: u64) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// What to prune and how.
#[derive(Debug, Clone)]
pub struct PruneOptions {
    /// Project name; archives are `<project>_YYYYMMDD_HHMMSS.zip`.
    pub project: String,
    /// `<backup_base>/<project>`.
    pub project_root: PathBuf,
    /// Retention counts.
    pub retention: RetentionConfig,
    /// Report what would be deleted without touching the tree.
    pub dry_run: bool,
    /// Age after which an abandoned lock is reclaimed.
    pub lock_stale_after: Duration,
}

impl PruneOptions {
    /// Creates options for a real (non dry-run) prune.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        project_root: impl Into<PathBuf>,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            project: project.into(),
            project_root: project_root.into(),
            retention,
            dry_run: false,
            lock_stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Sets the stale lock threshold.
    #[must_use]
    pub const fn with_lock_stale_after(mut self, stale_after: Duration) -> Self {
        self.lock_stale_after = stale_after;
        self
    }
}

/// A path that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRemoval {
    /// The file or directory.
    pub path: PathBuf,
    /// The error reported by the store.
    pub error: String,
}

/// Scan results together with the retention decision, before anything is deleted.
#[derive(Debug, Clone, Default)]
pub struct PrunePreview {
    /// What the scanner found.
    pub scan: ScanResult,
    /// What the selector decided.
    pub plan: RetentionPlan,
}

/// Result of a prune run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneResult {
    /// Number of archives with a valid name.
    pub records_scanned: usize,
    /// Number of candidate archives skipped for a malformed name.
    pub records_skipped: usize,
    /// Number of archives retained.
    pub retained: usize,
    /// Archives that were (or in a dry run would be) deleted.
    pub deleted: Vec<PathBuf>,
    /// Archives whose deletion failed.
    pub failed: Vec<FailedRemoval>,
    /// Empty date directories that were removed.
    pub directories_removed: Vec<PathBuf>,
    /// Empty date directories that could not be removed.
    pub directory_failures: Vec<FailedRemoval>,
    /// Whether this was a dry run (no actual changes made).
    pub dry_run: bool,
    /// Duration of the run in milliseconds.
    pub duration_ms: u64,
}

impl PruneResult {
    /// Returns `true` if any file or directory removal failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.directory_failures.is_empty()
    }

    /// Returns a human-readable summary of the run.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.deleted.is_empty() && self.failed.is_empty() {
            return format!(
                "No old backups to delete ({} retained of {} scanned in {}ms)",
                self.retained, self.records_scanned, self.duration_ms
            );
        }

        let action = if self.dry_run {
            "would delete"
        } else {
            "deleted"
        };
        let mut summary = format!(
            "{action} {} of {} backups, retained {}",
            self.deleted.len(),
            self.records_scanned,
            self.retained
        );
        if !self.directories_removed.is_empty() {
            summary.push_str(&format!(
                ", removed {} empty directories",
                self.directories_removed.len()
            ));
        }
        if self.has_failures() {
            summary.push_str(&format!(
                ", {} failures",
                self.failed.len() + self.directory_failures.len()
            ));
        }
        if self.records_skipped > 0 {
            summary.push_str(&format!(
                ", skipped {} malformed names",
                self.records_skipped
            ));
        }
        summary.push_str(&format!(" in {}ms", self.duration_ms));
        summary
    }
}

/// Applies the retention policy to one project's backup tree.
pub struct Pruner<S: ArchiveStore + ?Sized> {
    store: Arc<S>,
    options: PruneOptions,
}

impl<S: ArchiveStore + ?Sized> Pruner<S> {
    /// Creates a new pruner.
    #[must_use]
    pub fn new(store: Arc<S>, options: PruneOptions) -> Self {
        Self { store, options }
    }

    /// Returns the options in use.
    #[must_use]
    pub const fn options(&self) -> &PruneOptions {
        &self.options
    }

    /// Scans the project and computes the retention plan without deleting anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the project root exists but cannot be listed.
    pub fn preview(&self) -> Result<PrunePreview> {
        let scan = scan_project(
            self.store.as_ref(),
            &self.options.project_root,
            &self.options.project,
        )?;

        let retention = self.options.retention;
        info!(
            daily = retention.daily,
            weekly = retention.weekly,
            monthly = retention.monthly,
            backups = scan.records.len(),
            "Applying retention policy"
        );
        let plan = RetentionSelector::new(retention).plan(&scan.records);

        Ok(PrunePreview { scan, plan })
    }

    /// Deletes every archive the retention policy does not keep.
    ///
    /// # Errors
    ///
    /// Returns an error only if the run cannot start: the project root cannot
    /// be listed or another run holds the project lock. Individual removal
    /// failures are reported in the result instead.
    #[instrument(
        name = "keepsake.gc.prune",
        skip(self),
        fields(
            component = "gc",
            operation = "prune",
            project = %self.options.project,
            dry_run = self.options.dry_run
        )
    )]
    pub fn prune(&self) -> Result<PruneResult> {
        let start = Instant::now();
        let dry_run = self.options.dry_run;
        let root = &self.options.project_root;

        let _lock = if dry_run || !self.store.is_dir(root) {
            None
        } else {
            Some(PruneLock::acquire(root, self.options.lock_stale_after)?)
        };

        let preview = self.preview()?;
        let mut result = PruneResult {
            records_scanned: preview.scan.records.len(),
            records_skipped: preview.scan.skipped.len(),
            retained: preview.plan.kept_count(),
            dry_run,
            ..Default::default()
        };

        for record in &preview.plan.deleted {
            if dry_run {
                info!(path = %record.path.display(), "Would delete old backup");
                result.deleted.push(record.path.clone());
                continue;
            }

            match self.store.remove_file(&record.path) {
                Ok(()) => {
                    info!(path = %record.path.display(), "Deleted old backup");
                    result.deleted.push(record.path.clone());
                    self.remove_empty_parents(&record.path, &mut result);
                },
                Err(e) => {
                    error!(path = %record.path.display(), error = %e, "Error deleting backup");
                    result.failed.push(FailedRemoval {
                        path: record.path.clone(),
                        error: e.to_string(),
                    });
                },
            }
        }

        result.duration_ms = duration_to_millis(start.elapsed());

        metrics::counter!(
            "keepsake_prune_runs_total",
            "dry_run" => dry_run.to_string()
        )
        .increment(1);
        metrics::gauge!("keepsake_prune_deleted").set(usize_to_f64(result.deleted.len()));
        let failures = result.failed.len() + result.directory_failures.len();
        metrics::counter!("keepsake_prune_failures_total")
            .increment(u64::try_from(failures).unwrap_or(u64::MAX));
        metrics::histogram!("keepsake_prune_duration_ms").record(u64_to_f64(result.duration_ms));

        info!(
            scanned = result.records_scanned,
            retained = result.retained,
            deleted = result.deleted.len(),
            failed = result.failed.len(),
            directory_failures = result.directory_failures.len(),
            duration_ms = result.duration_ms,
            dry_run,
            "Retention policy applied"
        );

        Ok(result)
    }

    /// Removes now-empty ancestors of `file`, stopping below the project root.
    fn remove_empty_parents(&self, file: &Path, result: &mut PruneResult) {
        let root = self.options.project_root.as_path();
        let mut current = file.parent();

        while let Some(dir) = current {
            if dir == root || !dir.starts_with(root) {
                break;
            }

            match self.store.is_empty_dir(dir) {
                Ok(true) => {},
                Ok(false) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Could not inspect directory");
                    result.directory_failures.push(FailedRemoval {
                        path: dir.to_path_buf(),
                        error: e.to_string(),
                    });
                    break;
                },
            }

            if let Err(e) = self.store.remove_dir(dir) {
                error!(dir = %dir.display(), error = %e, "Error removing empty directory");
                result.directory_failures.push(FailedRemoval {
                    path: dir.to_path_buf(),
                    error: e.to_string(),
                });
                break;
            }

            info!(dir = %dir.display(), "Removed empty directory");
            result.directories_removed.push(dir.to_path_buf());
            current = dir.parent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::{archive_dir, archive_file_name};
    use crate::storage::FilesystemStore;
    use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(2, 30, 0))
            .unwrap_or_else(|| unreachable!())
    }

    fn plant(root: &Path, at: NaiveDateTime) -> PathBuf {
        let dir = archive_dir(root, at);
        fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join(archive_file_name("site", at));
        fs::write(&path, b"zip").expect("write archive");
        path
    }

    /// Filesystem store that refuses to delete selected files and directories.
    #[derive(Default)]
    struct StubbornStore {
        inner: FilesystemStore,
        refuse: HashSet<PathBuf>,
        refuse_dirs: HashSet<PathBuf>,
    }

    impl ArchiveStore for StubbornStore {
        fn is_dir(&self, path: &Path) -> bool {
            self.inner.is_dir(path)
        }

        fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
            self.inner.list_files(root)
        }

        fn remove_file(&self, path: &Path) -> Result<()> {
            if self.refuse.contains(path) {
                return Err(Error::OperationFailed {
                    operation: "remove_file".to_string(),
                    cause: "permission denied".to_string(),
                });
            }
            self.inner.remove_file(path)
        }

        fn is_empty_dir(&self, path: &Path) -> Result<bool> {
            self.inner.is_empty_dir(path)
        }

        fn remove_dir(&self, path: &Path) -> Result<()> {
            if self.refuse_dirs.contains(path) {
                return Err(Error::OperationFailed {
                    operation: "remove_dir".to_string(),
                    cause: "device busy".to_string(),
                });
            }
            self.inner.remove_dir(path)
        }
    }

    #[test]
    fn test_prune_deletes_and_cleans_directories() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        // Mon 2024-04-01 .. Wed 2024-04-10
        let paths: Vec<_> = (0..10)
            .map(|i| plant(&root, ts(2024, 4, 1) + TimeDelta::days(i)))
            .collect();

        let options = PruneOptions::new("site", &root, RetentionConfig::new(3, 0, 0));
        let result = Pruner::new(Arc::new(FilesystemStore::new()), options)
            .prune()
            .expect("prune");

        assert_eq!(result.records_scanned, 10);
        assert_eq!(result.retained, 3);
        assert_eq!(result.deleted.len(), 7);
        assert!(!result.has_failures());
        for (i, path) in paths.iter().enumerate() {
            assert_eq!(path.exists(), i >= 7, "{}", path.display());
        }
        // Each deleted day directory is removed; month and year stay.
        assert_eq!(result.directories_removed.len(), 7);
        assert!(!root.join("2024/04/01").exists());
        assert!(root.join("2024/04").is_dir());
        assert!(!root.join(crate::gc::LOCK_FILE_NAME).exists());
    }

    #[test]
    fn test_prune_removes_up_to_but_not_root() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        let only = plant(&root, ts(2023, 1, 15));

        let options = PruneOptions::new("site", &root, RetentionConfig::none());
        let result = Pruner::new(Arc::new(FilesystemStore::new()), options)
            .prune()
            .expect("prune");

        assert_eq!(result.deleted, vec![only]);
        assert_eq!(
            result.directories_removed,
            vec![
                root.join("2023/01/15"),
                root.join("2023/01"),
                root.join("2023")
            ]
        );
        assert!(root.is_dir());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        let paths: Vec<_> = (1..=4).map(|d| plant(&root, ts(2024, 5, d))).collect();

        let options =
            PruneOptions::new("site", &root, RetentionConfig::new(1, 0, 0)).with_dry_run(true);
        let result = Pruner::new(Arc::new(FilesystemStore::new()), options)
            .prune()
            .expect("prune");

        assert!(result.dry_run);
        assert_eq!(result.deleted.len(), 3);
        assert!(result.directories_removed.is_empty());
        assert!(paths.iter().all(|p| p.exists()));
        assert!(result.summary().contains("would delete 3"));
    }

    #[test]
    fn test_deletion_failure_is_isolated() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        let paths: Vec<_> = (1..=4).map(|d| plant(&root, ts(2024, 5, d))).collect();

        let store = StubbornStore {
            refuse: HashSet::from([paths[1].clone()]),
            ..StubbornStore::default()
        };
        let options = PruneOptions::new("site", &root, RetentionConfig::new(1, 0, 0));
        let result = Pruner::new(Arc::new(store), options)
            .prune()
            .expect("prune completes despite failure");

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].path, paths[1]);
        assert!(result.failed[0].error.contains("permission denied"));
        assert_eq!(result.deleted.len(), 2);
        assert!(!paths[0].exists());
        assert!(paths[1].exists());
        assert!(!paths[2].exists());
        assert!(paths[3].exists());
        assert!(result.summary().contains("1 failures"));
    }

    #[test]
    fn test_directory_failure_is_isolated() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        let paths: Vec<_> = (1..=4).map(|d| plant(&root, ts(2024, 5, d))).collect();

        // 2024-05-03 is deleted first; its day directory cannot be removed
        let store = StubbornStore {
            refuse_dirs: HashSet::from([root.join("2024/05/03")]),
            ..StubbornStore::default()
        };
        let options = PruneOptions::new("site", &root, RetentionConfig::new(1, 0, 0));
        let result = Pruner::new(Arc::new(store), options)
            .prune()
            .expect("prune completes despite failure");

        assert!(result.failed.is_empty());
        assert_eq!(result.deleted.len(), 3);
        assert!(paths[..3].iter().all(|p| !p.exists()));
        assert!(paths[3].exists());

        assert_eq!(result.directory_failures.len(), 1);
        assert_eq!(result.directory_failures[0].path, root.join("2024/05/03"));
        assert!(result.directory_failures[0].error.contains("device busy"));
        assert!(root.join("2024/05/03").is_dir());
        assert!(!root.join("2024/05/02").exists());
        assert!(!root.join("2024/05/01").exists());
        assert_eq!(
            result.directories_removed,
            vec![root.join("2024/05/02"), root.join("2024/05/01")]
        );

        assert!(result.has_failures());
        assert!(result.summary().contains("1 failures"));
    }

    #[test]
    fn test_shared_directory_kept_while_non_empty() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        let morning = plant(&root, ts(2024, 6, 2));
        let evening_ts = ts(2024, 6, 2) + TimeDelta::hours(12);
        let evening = plant(&root, evening_ts);

        let options = PruneOptions::new("site", &root, RetentionConfig::new(1, 0, 0));
        let result = Pruner::new(Arc::new(FilesystemStore::new()), options)
            .prune()
            .expect("prune");

        assert_eq!(result.deleted, vec![morning]);
        assert!(result.directories_removed.is_empty());
        assert!(evening.exists());
    }

    #[test]
    fn test_missing_root_is_a_no_op() {
        let dir = TempDir::new().expect("tempdir");
        let options = PruneOptions::new("site", dir.path().join("site"), RetentionConfig::none());
        let result = Pruner::new(Arc::new(FilesystemStore::new()), options)
            .prune()
            .expect("prune");

        assert_eq!(result.records_scanned, 0);
        assert!(result.summary().contains("No old backups"));
    }

    #[test]
    fn test_locked_project_fails_fast() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        let path = plant(&root, ts(2024, 5, 1));
        let _held = PruneLock::acquire(&root, DEFAULT_STALE_AFTER).expect("hold lock");

        let options = PruneOptions::new("site", &root, RetentionConfig::none());
        let err = Pruner::new(Arc::new(FilesystemStore::new()), options)
            .prune()
            .expect_err("locked");

        assert!(matches!(err, Error::Locked { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_preview_reports_skipped() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        plant(&root, ts(2024, 5, 1));
        fs::write(root.join("site_oops.zip"), b"zip").expect("write");

        let options = PruneOptions::new("site", &root, RetentionConfig::default());
        let preview = Pruner::new(Arc::new(FilesystemStore::new()), options)
            .preview()
            .expect("preview");

        assert_eq!(preview.scan.records.len(), 1);
        assert_eq!(preview.scan.skipped.len(), 1);
        assert_eq!(preview.plan.kept_count(), 1);
    }
}
