//! Project backup discovery.
//!
//! Walks `<backup_base>/<project>/` and builds a [`BackupRecord`] for every
//! file named `<project>_YYYYMMDD_HHMMSS.zip`. Files that look like archives but
//! break the grammar are skipped with a warning; they never reach the
//! retention selector.

use super::ArchiveStore;
use crate::Result;
use crate::models::{BackupRecord, is_candidate, parse_archive_name};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A candidate archive that was skipped because its name did not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedArchive {
    /// Location of the skipped file.
    pub path: PathBuf,
    /// Why the name was rejected.
    pub reason: String,
}

/// Outcome of scanning a project directory.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Parsed records, in sorted path order.
    pub records: Vec<BackupRecord>,
    /// Candidate archives with malformed names.
    pub skipped: Vec<SkippedArchive>,
}

/// Scans a project's backup directory.
///
/// A missing `project_root` is not an error: there is simply nothing to
/// retain or delete.
///
/// # Errors
///
/// Returns an error if `project_root` exists but cannot be listed.
pub fn scan_project<S: ArchiveStore + ?Sized>(
    store: &S,
    project_root: &Path,
    project: &str,
) -> Result<ScanResult> {
    if !store.is_dir(project_root) {
        info!(
            root = %project_root.display(),
            "Backup root directory does not exist; nothing to scan"
        );
        return Ok(ScanResult::default());
    }

    let mut result = ScanResult::default();
    for path in store.list_files(project_root)? {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !is_candidate(project, file_name) {
            continue;
        }

        match parse_archive_name(project, file_name) {
            Ok(timestamp) => {
                debug!(path = %path.display(), %timestamp, "Found backup");
                result.records.push(BackupRecord::new(path, timestamp));
            },
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Could not parse timestamp from archive name"
                );
                result.skipped.push(SkippedArchive {
                    reason: e.to_string(),
                    path,
                });
            },
        }
    }

    debug!(
        records = result.records.len(),
        skipped = result.skipped.len(),
        "Scan complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FilesystemStore;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, b"zip").expect("write file");
    }

    #[test]
    fn test_scan_missing_root_is_empty() {
        let dir = TempDir::new().expect("tempdir");
        let result = scan_project(&FilesystemStore::new(), &dir.path().join("site"), "site")
            .expect("scan");
        assert!(result.records.is_empty());
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_scan_parses_and_skips() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        touch(&root, "2024/03/17/site_20240317_020000.zip");
        touch(&root, "2024/03/16/site_20240316_020000.zip");
        touch(&root, "2024/03/15/site_20240315_bad.zip");
        touch(&root, "2024/03/15/notes.txt");
        touch(&root, "backup.log");
        touch(&root, "stray/website_20240101_000000.zip");

        let result = scan_project(&FilesystemStore::new(), &root, "site").expect("scan");

        let names: Vec<_> = result
            .records
            .iter()
            .filter_map(|r| r.path.file_name().and_then(|n| n.to_str()))
            .collect();
        assert_eq!(
            names,
            vec!["site_20240316_020000.zip", "site_20240317_020000.zip"]
        );

        assert_eq!(result.skipped.len(), 1);
        assert!(result.skipped[0].path.ends_with("site_20240315_bad.zip"));
        assert!(result.skipped[0].reason.contains("invalid archive name"));
    }

    #[test]
    fn test_scan_finds_archives_outside_date_dirs() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("site");
        touch(&root, "site_20240101_000000.zip");

        let result = scan_project(&FilesystemStore::new(), &root, "site").expect("scan");
        assert_eq!(result.records.len(), 1);
    }
}
