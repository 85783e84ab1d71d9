//! Advisory lock for the deletion phase.
//!
//! Two prune runs against the same project (or a prune racing a backup job
//! that honours the lock) could otherwise delete archives the other run is
//! still reasoning about. The lock is a file created with `create_new`, so
//! acquisition is atomic on local filesystems.
//!
//! A stale lock is renamed aside before it is deleted. Only one reclaiming run
//! can win the rename, and the winner checks that it moved the same lock it
//! judged stale; if a competitor had already replaced it, the fresh lock is
//! put back.

use crate::{Error, Result};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Name of the lock file inside the project root.
pub const LOCK_FILE_NAME: &str = ".keepsake.lock";

/// Default age after which an abandoned lock is reclaimed (1 hour).
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

/// Held lock on a project's backup directory. Released on drop.
#[derive(Debug)]
pub struct PruneLock {
    path: PathBuf,
}

impl PruneLock {
    /// Acquires the lock for `project_root`.
    ///
    /// A lock file older than `stale_after` is assumed to belong to a crashed
    /// run and is reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if another run holds a fresh lock, or
    /// [`Error::OperationFailed`] if the lock file cannot be created.
    pub fn acquire(project_root: &Path, stale_after: Duration) -> Result<Self> {
        let path = project_root.join(LOCK_FILE_NAME);

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // Contents are read before the age check so a lock replaced
                // in between is never mistaken for the stale one.
                let observed = match fs::read(&path) {
                    Ok(contents) => contents,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(lock_error(&path, &e)),
                };
                if !is_stale(&path, stale_after) {
                    return Err(locked(&path));
                }
                warn!(lock = %path.display(), "Reclaiming stale prune lock");
                reclaim(&path, &observed)?;
                Self::create(&path).map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        locked(&path)
                    } else {
                        lock_error(&path, &e)
                    }
                })
            },
            Err(e) => Err(lock_error(&path, &e)),
        }
    }

    /// Returns the lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        let lock = Self {
            path: path.to_path_buf(),
        };
        // On a failed write `lock` is dropped here and removes the file.
        writeln!(
            file,
            "pid={}\nacquired_at={}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        )?;
        debug!(lock = %path.display(), "Acquired prune lock");
        Ok(lock)
    }
}

impl Drop for PruneLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to release prune lock");
        }
    }
}

/// Moves the stale lock at `path` out of the way.
///
/// Fails with [`Error::Locked`] if the lock vanished or no longer holds
/// `observed`, meaning another run reclaimed it first.
fn reclaim(path: &Path, observed: &[u8]) -> Result<()> {
    let aside = path.with_file_name(format!("{LOCK_FILE_NAME}.{}.stale", std::process::id()));
    match fs::rename(path, &aside) {
        Ok(()) => {},
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(locked(path)),
        Err(e) => return Err(lock_error(path, &e)),
    }

    let moved = fs::read(&aside).map_err(|e| lock_error(&aside, &e))?;
    if moved != observed {
        // hard_link never overwrites, so a lock taken meanwhile wins
        if let Err(e) = fs::hard_link(&aside, path) {
            warn!(lock = %path.display(), error = %e, "Failed to restore live prune lock");
        }
        discard(&aside);
        return Err(locked(path));
    }

    discard(&aside);
    Ok(())
}

fn discard(aside: &Path) {
    if let Err(e) = fs::remove_file(aside) {
        warn!(lock = %aside.display(), error = %e, "Failed to remove reclaimed prune lock");
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age >= stale_after)
}

fn locked(path: &Path) -> Error {
    Error::Locked {
        path: path.display().to_string(),
    }
}

fn lock_error(path: &Path, e: &io::Error) -> Error {
    Error::OperationFailed {
        operation: "acquire_lock".to_string(),
        cause: format!("{}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().expect("tempdir");
        let lock = PruneLock::acquire(dir.path(), DEFAULT_STALE_AFTER).expect("first acquire");
        assert!(lock.path().exists());

        let err = PruneLock::acquire(dir.path(), DEFAULT_STALE_AFTER).expect_err("contended");
        assert!(matches!(err, Error::Locked { .. }));

        drop(lock);
        assert!(!dir.path().join(LOCK_FILE_NAME).exists());
        PruneLock::acquire(dir.path(), DEFAULT_STALE_AFTER).expect("reacquire after release");
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join(LOCK_FILE_NAME), "pid=1\n").expect("plant lock");

        let lock = PruneLock::acquire(dir.path(), Duration::ZERO).expect("stale lock reclaimed");
        let contents = fs::read_to_string(lock.path()).expect("read lock");
        assert!(contents.contains(&format!("pid={}", std::process::id())));
    }

    #[test]
    fn test_reclaim_restores_a_replaced_lock() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(LOCK_FILE_NAME);
        // another run reclaimed the stale lock and wrote its own
        fs::write(&path, "pid=2\nacquired_at=later\n").expect("plant lock");

        let err = reclaim(&path, b"pid=1\n").expect_err("lock was replaced");
        assert!(matches!(err, Error::Locked { .. }));
        assert_eq!(
            fs::read_to_string(&path).expect("lock restored"),
            "pid=2\nacquired_at=later\n"
        );
        let leftovers = fs::read_dir(dir.path()).expect("list").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_reclaim_removes_the_observed_lock() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(LOCK_FILE_NAME);
        fs::write(&path, "pid=1\n").expect("plant lock");

        reclaim(&path, b"pid=1\n").expect("reclaimed");
        assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 0);
    }

    #[test]
    fn test_reclaim_of_vanished_lock_is_locked() {
        let dir = TempDir::new().expect("tempdir");
        let err = reclaim(&dir.path().join(LOCK_FILE_NAME), b"pid=1\n").expect_err("gone");
        assert!(matches!(err, Error::Locked { .. }));
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = TempDir::new().expect("tempdir");
        let err = PruneLock::acquire(&dir.path().join("absent"), DEFAULT_STALE_AFTER)
            .expect_err("no root");
        assert!(matches!(err, Error::OperationFailed { .. }));
    }
}
