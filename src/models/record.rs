//! Backup record type.

use chrono::{Datelike, NaiveDateTime, Weekday};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// One archived snapshot of a project.
///
/// Identified by its file location; `timestamp` is the creation time parsed
/// from the archive name. Records are immutable once constructed. Two records
/// with the same `path` in one selection are a caller error and are not
/// detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BackupRecord {
    /// Location of the archive file.
    pub path: PathBuf,
    /// Creation time (local wall clock, as encoded in the file name).
    pub timestamp: NaiveDateTime,
}

impl BackupRecord {
    /// Creates a new backup record.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, timestamp: NaiveDateTime) -> Self {
        Self {
            path: path.into(),
            timestamp,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn id(&self) -> &Path {
        &self.path
    }

    /// Returns the calendar `(year, month)` this record belongs to.
    #[must_use]
    pub fn year_month(&self) -> (i32, u32) {
        (self.timestamp.year(), self.timestamp.month())
    }

    /// Returns `true` if the record was taken on the end-of-week day (Sunday).
    #[must_use]
    pub fn is_end_of_week(&self) -> bool {
        self.timestamp.weekday() == Weekday::Sun
    }
}

impl fmt::Display for BackupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({})",
            self.path.display(),
            self.timestamp.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
