//! `keepsake plan`: explain the retention decision for every archive.

use super::{OutputFormat, build_pruner, json_error, output_error};
use crate::Result;
use crate::config::KeepsakeConfig;
use crate::gc::{PrunePreview, RetentionRule};
use crate::storage::SkippedArchive;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// One row of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// Archive creation time.
    pub timestamp: NaiveDateTime,
    /// Archive location.
    pub path: PathBuf,
    /// `true` if at least one rule keeps the archive.
    pub keep: bool,
    /// Rules that keep the archive; empty for deletions.
    pub rules: Vec<RetentionRule>,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    entries: &'a [PlanEntry],
    skipped: &'a [SkippedArchive],
}

impl PlanEntry {
    /// Flattens a preview into rows, newest first.
    #[must_use]
    pub fn from_preview(preview: &PrunePreview) -> Vec<Self> {
        let mut entries: Vec<Self> = preview
            .scan
            .records
            .iter()
            .map(|record| {
                let rules: Vec<RetentionRule> = preview
                    .plan
                    .reasons(&record.path)
                    .map(|rules| rules.iter().copied().collect())
                    .unwrap_or_default();
                Self {
                    timestamp: record.timestamp,
                    path: record.path.clone(),
                    keep: !rules.is_empty(),
                    rules,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }
}

/// Prints the keep/delete decision for each archive of the configured project.
///
/// # Errors
///
/// Returns an error if the project is not configured, its root cannot be
/// listed, or the report cannot be written.
pub fn cmd_plan<W: Write>(
    config: &KeepsakeConfig,
    format: OutputFormat,
    out: &mut W,
) -> Result<Vec<PlanEntry>> {
    let preview = build_pruner(config, true)?.preview()?;
    let entries = PlanEntry::from_preview(&preview);

    match format {
        OutputFormat::Json => {
            let report = PlanReport {
                entries: &entries,
                skipped: &preview.scan.skipped,
            };
            let json = serde_json::to_string_pretty(&report).map_err(|e| json_error(&e))?;
            writeln!(out, "{json}").map_err(|e| output_error(&e))?;
        },
        OutputFormat::Table => {
            write_table(&entries, &preview.scan.skipped, out).map_err(|e| output_error(&e))?;
        },
    }

    Ok(entries)
}

fn write_table<W: Write>(
    entries: &[PlanEntry],
    skipped: &[SkippedArchive],
    out: &mut W,
) -> std::io::Result<()> {
    if entries.is_empty() {
        writeln!(out, "No backups found.")?;
    } else {
        writeln!(out, "{:<20} {:<7} {:<22} PATH", "TIMESTAMP", "ACTION", "RULES")?;
        for entry in entries {
            let rules = entry
                .rules
                .iter()
                .map(RetentionRule::as_str)
                .collect::<Vec<_>>()
                .join(",");
            writeln!(
                out,
                "{:<20} {:<7} {:<22} {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                if entry.keep { "keep" } else { "delete" },
                if rules.is_empty() { "-" } else { rules.as_str() },
                entry.path.display()
            )?;
        }
    }

    for skip in skipped {
        writeln!(out, "skipped: {} ({})", skip.path.display(), skip.reason)?;
    }

    let kept = entries.iter().filter(|e| e.keep).count();
    writeln!(
        out,
        "\n{kept} kept, {} to delete, {} skipped",
        entries.len() - kept,
        skipped.len()
    )
}
