//! CLI command implementations.
//!
//! Each submodule implements one `keepsake` subcommand against an explicit
//! [`KeepsakeConfig`] and writes its report to a caller-supplied writer; the
//! binary passes stdout.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `prune` | Delete backups no retention rule keeps |
//! | `plan` | Show the keep/delete decision for every backup |
//! | `config` | Print the effective configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # Preview, then prune with a tighter daily window
//! keepsake prune --project site --dry-run
//! keepsake prune --project site --daily 3
//!
//! # Explain why each archive is kept
//! keepsake plan --format json
//! ```

mod config;
mod plan;
mod prune;

pub use config::cmd_config;
pub use plan::{PlanEntry, cmd_plan};
pub use prune::cmd_prune;

use crate::config::KeepsakeConfig;
use crate::gc::{PruneOptions, Pruner};
use crate::storage::FilesystemStore;
use crate::{Error, Result};
use std::str::FromStr;
use std::sync::Arc;

/// Report format for `plan` and `prune`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Aligned text columns.
    #[default]
    Table,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "table" | "text" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!(
                "unknown output format '{other}' (expected 'table' or 'json')"
            ))),
        }
    }
}

/// Builds a filesystem pruner for the configured project.
///
/// # Errors
///
/// Returns an error if the project name is missing or invalid.
pub fn build_pruner(config: &KeepsakeConfig, dry_run: bool) -> Result<Pruner<FilesystemStore>> {
    let options = PruneOptions::new(
        config.project_name()?,
        config.project_root()?,
        config.retention,
    )
    .with_dry_run(dry_run)
    .with_lock_stale_after(config.lock_stale_after());

    Ok(Pruner::new(Arc::new(FilesystemStore::new()), options))
}

fn output_error(e: &std::io::Error) -> Error {
    Error::OperationFailed {
        operation: "write_output".to_string(),
        cause: e.to_string(),
    }
}

fn json_error(e: &serde_json::Error) -> Error {
    Error::OperationFailed {
        operation: "serialize_output".to_string(),
        cause: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::RetentionConfig;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("JSON".parse::<OutputFormat>().expect("json"), OutputFormat::Json);
        assert_eq!("table".parse::<OutputFormat>().expect("table"), OutputFormat::Table);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_build_pruner_requires_project() {
        assert!(build_pruner(&KeepsakeConfig::new(), false).is_err());
    }

    #[test]
    fn test_build_pruner_carries_config() {
        let config = KeepsakeConfig::new()
            .with_project_name("site")
            .with_backup_base_dir("/srv/backups")
            .with_retention(RetentionConfig::new(1, 2, 3));

        let pruner = build_pruner(&config, true).expect("pruner");
        let options = pruner.options();
        assert_eq!(options.project, "site");
        assert_eq!(options.project_root, std::path::PathBuf::from("/srv/backups/site"));
        assert_eq!(options.retention, RetentionConfig::new(1, 2, 3));
        assert!(options.dry_run);
    }
}
