//! Filesystem-backed archive store.

use super::ArchiveStore;
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Archive store operating directly on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemStore;

impl FilesystemStore {
    /// Creates a new filesystem store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                return;
            },
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                },
            };
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                Self::collect_files(&path, out);
            } else if file_type.is_file() || (file_type.is_symlink() && path.is_file()) {
                out.push(path);
            }
        }
    }
}

impl ArchiveStore for FilesystemStore {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>> {
        // The root itself must be readable; nested failures only lose that subtree.
        fs::read_dir(root).map_err(|e| io_error("list_backups", root, &e))?;

        let mut files = Vec::new();
        Self::collect_files(root, &mut files);
        files.sort();
        Ok(files)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).map_err(|e| io_error("remove_file", path, &e))
    }

    fn is_empty_dir(&self, path: &Path) -> Result<bool> {
        let mut entries = fs::read_dir(path).map_err(|e| io_error("read_dir", path, &e))?;
        Ok(entries.next().is_none())
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        fs::remove_dir(path).map_err(|e| io_error("remove_dir", path, &e))
    }
}

fn io_error(operation: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}
