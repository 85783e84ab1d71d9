//! Archive store trait.

use crate::Result;
use std::path::{Path, PathBuf};

/// Storage operations needed to scan and prune a backup tree.
///
/// The pruner only talks to the backup tree through this trait, so tests can
/// substitute stores that fail on specific paths.
pub trait ArchiveStore: Send + Sync {
    /// Returns `true` if `path` is an existing directory.
    fn is_dir(&self, path: &Path) -> bool;

    /// Lists every regular file under `root`, recursively, sorted by path.
    ///
    /// Directory symlinks are not followed.
    fn list_files(&self, root: &Path) -> Result<Vec<PathBuf>>;

    /// Removes a single file.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Returns `true` if the directory at `path` has no entries.
    fn is_empty_dir(&self, path: &Path) -> Result<bool>;

    /// Removes an empty directory.
    ///
    /// Implementations must refuse to remove a directory that has entries.
    fn remove_dir(&self, path: &Path) -> Result<()>;
}
