//! Archive naming convention.
//!
//! Archives are named `<project>_YYYYMMDD_HHMMSS.zip` and stored under
//! `<project root>/YYYY/MM/DD/`. Parsing uses a fixed-width grammar and
//! rejects anything that does not match it exactly; it never guesses.

use crate::{Error, Result};
use chrono::{Datelike, NaiveDateTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// File extension of backup archives (without the dot).
pub const ARCHIVE_EXTENSION: &str = "zip";

/// `chrono` format of the timestamp embedded in archive names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Everything after `<project>_`: eight ASCII digits, underscore, six ASCII digits.
static STAMP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{8}_[0-9]{6})\.zip$").unwrap_or_else(|_| unreachable!())
});

/// Returns `true` if `file_name` looks like an archive of `project` at all.
///
/// Candidates start with `<project>_` and end with `.zip`. Anything else in the
/// backup tree (log files, lock files, other projects) is not a candidate and is
/// ignored without a warning.
#[must_use]
pub fn is_candidate(project: &str, file_name: &str) -> bool {
    strip_project_prefix(project, file_name).is_some()
        && Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

/// Parses the creation timestamp out of an archive file name.
///
/// # Errors
///
/// Returns [`Error::InvalidArchiveName`] if the name is not exactly
/// `<project>_YYYYMMDD_HHMMSS.zip` or the digits do not form a real calendar
/// date and time (for example `20240230` or `246000`).
pub fn parse_archive_name(project: &str, file_name: &str) -> Result<NaiveDateTime> {
    let rest = strip_project_prefix(project, file_name)
        .ok_or_else(|| invalid(file_name, format!("expected prefix '{project}_'")))?;

    let stamp = STAMP_PATTERN
        .captures(rest)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| invalid(file_name, "expected YYYYMMDD_HHMMSS.zip after the prefix"))?;

    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map_err(|e| invalid(file_name, format!("not a calendar date/time: {e}")))?;

    // chrono folds second 60 into a leap-second nanosecond value
    if timestamp.nanosecond() >= 1_000_000_000 {
        return Err(invalid(file_name, "leap seconds are not valid archive times"));
    }

    Ok(timestamp)
}

/// Builds the archive file name for `project` created at `timestamp`.
#[must_use]
pub fn archive_file_name(project: &str, timestamp: NaiveDateTime) -> String {
    format!(
        "{project}_{}.{ARCHIVE_EXTENSION}",
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Returns the `YYYY/MM/DD` directory under `project_root` for `timestamp`.
#[must_use]
pub fn archive_dir(project_root: &Path, timestamp: NaiveDateTime) -> PathBuf {
    project_root
        .join(format!("{:04}", timestamp.year()))
        .join(format!("{:02}", timestamp.month()))
        .join(format!("{:02}", timestamp.day()))
}

fn strip_project_prefix<'a>(project: &str, file_name: &'a str) -> Option<&'a str> {
    file_name.strip_prefix(project)?.strip_prefix('_')
}

fn invalid(file_name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidArchiveName {
        name: file_name.to_string(),
        reason: reason.into(),
    }
}
