//! `keepsake prune`.

use super::{OutputFormat, build_pruner, json_error, output_error};
use crate::Result;
use crate::config::KeepsakeConfig;
use crate::gc::PruneResult;
use std::io::Write;

/// Runs a prune for the configured project and reports the outcome.
///
/// Individual deletion failures do not make this return `Err`; check
/// [`PruneResult::has_failures`].
///
/// # Errors
///
/// Returns an error if the project is not configured, its root cannot be
/// listed, another run holds the lock, or the report cannot be written.
pub fn cmd_prune<W: Write>(
    config: &KeepsakeConfig,
    dry_run: bool,
    format: OutputFormat,
    out: &mut W,
) -> Result<PruneResult> {
    let result = build_pruner(config, dry_run)?.prune()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result).map_err(|e| json_error(&e))?;
            writeln!(out, "{json}").map_err(|e| output_error(&e))?;
        },
        OutputFormat::Table => write_report(&result, out).map_err(|e| output_error(&e))?,
    }

    Ok(result)
}

fn write_report<W: Write>(result: &PruneResult, out: &mut W) -> std::io::Result<()> {
    let verb = if result.dry_run {
        "Would delete"
    } else {
        "Deleted"
    };
    for path in &result.deleted {
        writeln!(out, "{verb}: {}", path.display())?;
    }
    for failure in &result.failed {
        writeln!(
            out,
            "Failed:  {} ({})",
            failure.path.display(),
            failure.error
        )?;
    }
    for failure in &result.directory_failures {
        writeln!(
            out,
            "Failed to remove directory: {} ({})",
            failure.path.display(),
            failure.error
        )?;
    }
    writeln!(out, "{}", result.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::RetentionConfig;
    use crate::models::{archive_dir, archive_file_name};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .and_then(|d| d.and_hms_opt(2, 0, 0))
            .expect("valid date")
    }

    fn lay_out(root: &Path, days: &[u32]) {
        for &day in days {
            let ts = at(day);
            let dir = archive_dir(root, ts);
            fs::create_dir_all(&dir).expect("mkdir");
            fs::write(dir.join(archive_file_name("site", ts)), b"zip").expect("write");
        }
    }

    fn config(base: &Path, retention: RetentionConfig) -> KeepsakeConfig {
        KeepsakeConfig::new()
            .with_project_name("site")
            .with_backup_base_dir(base)
            .with_retention(retention)
    }

    #[test]
    fn test_dry_run_reports_without_deleting() {
        let dir = TempDir::new().expect("tempdir");
        lay_out(&dir.path().join("site"), &[11, 12, 13]);

        let mut out = Vec::new();
        let result = cmd_prune(
            &config(dir.path(), RetentionConfig::new(1, 0, 0)),
            true,
            OutputFormat::Table,
            &mut out,
        )
        .expect("prune");

        assert_eq!(result.deleted.len(), 2);
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("Would delete:"));
        assert!(text.contains("site_20240311_020000.zip"));
        assert!(result.deleted.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_json_report() {
        let dir = TempDir::new().expect("tempdir");
        lay_out(&dir.path().join("site"), &[11, 12]);

        let mut out = Vec::new();
        let result = cmd_prune(
            &config(dir.path(), RetentionConfig::new(1, 0, 0)),
            false,
            OutputFormat::Json,
            &mut out,
        )
        .expect("prune");

        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value["retained"], 1);
        assert_eq!(value["dry_run"], false);
        assert_eq!(value["deleted"].as_array().map(Vec::len), Some(1));
        assert!(!result.deleted[0].exists());
    }

    #[test]
    fn test_missing_project_fails() {
        let mut out = Vec::new();
        let err = cmd_prune(&KeepsakeConfig::new(), true, OutputFormat::Table, &mut out)
            .expect_err("no project");
        assert!(err.to_string().contains("project_name"));
    }
}
