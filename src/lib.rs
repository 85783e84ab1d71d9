//! # Keepsake
//!
//! Retention and pruning for dated project backup archives.
//!
//! Backups are laid out as
//! `<backup_base>/<project>/YYYY/MM/DD/<project>_YYYYMMDD_HHMMSS.zip`. Keepsake
//! scans such a tree, decides which archives survive under daily, weekly and
//! monthly rules, deletes the rest and prunes the date directories left empty.
//!
//! ## Features
//!
//! - Pure, deterministic retention selector (`gc::RetentionSelector`)
//! - Strict fixed-width archive name grammar (no guessing on malformed names)
//! - Per-file failure isolation during deletion
//! - Advisory lock around the deletion phase
//! - Dry-run planning with per-rule explanations
//!
//! ## Example
//!
//! ```rust,ignore
//! use keepsake::gc::{RetentionConfig, RetentionSelector};
//!
//! let selector = RetentionSelector::new(RetentionConfig::new(7, 4, 3));
//! let retained = selector.select(&records);
//! let doomed: Vec<_> = records.iter().filter(|r| !retained.contains(&r.path)).collect();
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod gc;
pub mod models;
pub mod observability;
pub mod storage;

// Re-exports for convenience
pub use config::KeepsakeConfig;
pub use gc::{
    PruneOptions, PruneResult, Pruner, RetentionConfig, RetentionPlan, RetentionRule,
    RetentionSelector,
};
pub use models::BackupRecord;
pub use storage::{ArchiveStore, FilesystemStore};

/// Error type for keepsake operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Missing project name, malformed config values |
/// | `InvalidArchiveName` | A file looks like an archive but breaks the name grammar |
/// | `OperationFailed` | I/O errors while reading config, scanning or locking |
/// | `Locked` | Another prune run holds the project lock |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - `project_name` is missing, empty, or contains a path separator
    /// - A config value cannot be parsed (including negative retention counts)
    /// - An unknown log format is requested
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A candidate archive file name does not match
    /// `<project>_YYYYMMDD_HHMMSS.zip`.
    ///
    /// Never fatal: the scanner logs it and skips the file.
    #[error("invalid archive name '{name}': {reason}")]
    InvalidArchiveName {
        /// The offending file name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - The config file cannot be read or parsed
    /// - The project root cannot be listed
    /// - The lock file cannot be created or inspected
    /// - The log file cannot be opened
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The project is locked by another run.
    #[error("project is locked by another run: {path}")]
    Locked {
        /// Path of the lock file.
        path: String,
    },
}

/// Result type alias for keepsake operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::OperationFailed {
            operation: "test".to_string(),
            cause: "failed".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'test' failed: failed");

        let err = Error::InvalidArchiveName {
            name: "site_2024.zip".to_string(),
            reason: "missing time".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid archive name 'site_2024.zip': missing time"
        );

        let err = Error::Locked {
            path: "/b/site/.keepsake.lock".to_string(),
        };
        assert!(err.to_string().contains(".keepsake.lock"));
    }
}
