//! Retention policy selector.
//!
//! Decides which backup records survive a cleanup run. Three independent
//! rules each pick a subset of the records and the union of those subsets is
//! retained; everything else is a deletion candidate.
//!
//! | Rule | Keeps |
//! |------|-------|
//! | Daily | the `daily` most recent records overall |
//! | Weekly | the `weekly` most recent records taken on a Sunday |
//! | Monthly | the newest record of each of the `monthly` most recent calendar months |
//!
//! A count of `0` disables its rule. The selector is a pure function of its
//! input: it performs no I/O and holds no state between calls.
//!
//! # Configuration
//!
//! Retention can be configured via:
//! - Config file: `"retention": { "daily": 7, "weekly": 4, "monthly": 3 }`
//! - Environment variables: `KEEPSAKE_RETENTION_DAILY`, `KEEPSAKE_RETENTION_WEEKLY`,
//!   `KEEPSAKE_RETENTION_MONTHLY`
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use keepsake::BackupRecord;
//! use keepsake::gc::{RetentionConfig, RetentionSelector};
//!
//! let day = |d| NaiveDate::from_ymd_opt(2024, 3, d).and_then(|date| date.and_hms_opt(2, 0, 0));
//! let records: Vec<BackupRecord> = (10..=17)
//!     .filter_map(|d| day(d).map(|ts| BackupRecord::new(format!("site_{d}.zip"), ts)))
//!     .collect();
//!
//! let selector = RetentionSelector::new(RetentionConfig::new(2, 1, 0));
//! let retained = selector.select(&records);
//!
//! // The two newest days, plus Sunday the 17th which is already among them.
//! assert_eq!(retained.len(), 2);
//! ```

use crate::models::BackupRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable overriding the daily retention count.
pub const RETENTION_DAILY_ENV: &str = "KEEPSAKE_RETENTION_DAILY";

/// Environment variable overriding the weekly retention count.
pub const RETENTION_WEEKLY_ENV: &str = "KEEPSAKE_RETENTION_WEEKLY";

/// Environment variable overriding the monthly retention count.
pub const RETENTION_MONTHLY_ENV: &str = "KEEPSAKE_RETENTION_MONTHLY";

/// Default number of most recent backups kept by the daily rule.
pub const DEFAULT_DAILY: u32 = 7;

/// Default number of Sunday backups kept by the weekly rule.
pub const DEFAULT_WEEKLY: u32 = 4;

/// Default number of months kept by the monthly rule.
pub const DEFAULT_MONTHLY: u32 = 3;

/// Retention counts for the three rules.
///
/// The selector applies whatever counts it is given; the defaults (7/4/3)
/// are only a convenience for callers building a config from scratch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Number of most recent backups to keep.
    pub daily: u32,
    /// Number of most recent Sunday backups to keep.
    pub weekly: u32,
    /// Number of most recent months for which the newest backup is kept.
    pub monthly: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY,
            weekly: DEFAULT_WEEKLY,
            monthly: DEFAULT_MONTHLY,
        }
    }
}

impl RetentionConfig {
    /// Creates a retention config with explicit counts.
    #[must_use]
    pub const fn new(daily: u32, weekly: u32, monthly: u32) -> Self {
        Self {
            daily,
            weekly,
            monthly,
        }
    }

    /// Creates a config that retains nothing.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Applies `KEEPSAKE_RETENTION_*` environment overrides.
    ///
    /// Unset or unparseable variables leave the current value in place.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup, using the
    /// `KEEPSAKE_RETENTION_*` key names.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let count = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u32>().ok());
        if let Some(n) = count(RETENTION_DAILY_ENV) {
            self.daily = n;
        }
        if let Some(n) = count(RETENTION_WEEKLY_ENV) {
            self.weekly = n;
        }
        if let Some(n) = count(RETENTION_MONTHLY_ENV) {
            self.monthly = n;
        }
        self
    }

    /// Sets the daily count.
    #[must_use]
    pub const fn with_daily(mut self, daily: u32) -> Self {
        self.daily = daily;
        self
    }

    /// Sets the weekly count.
    #[must_use]
    pub const fn with_weekly(mut self, weekly: u32) -> Self {
        self.weekly = weekly;
        self
    }

    /// Sets the monthly count.
    #[must_use]
    pub const fn with_monthly(mut self, monthly: u32) -> Self {
        self.monthly = monthly;
        self
    }

    /// Returns `true` if every rule is disabled.
    #[must_use]
    pub const fn retains_nothing(&self) -> bool {
        self.daily == 0 && self.weekly == 0 && self.monthly == 0
    }
}

/// A retention rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionRule {
    /// Most recent backups overall.
    Daily,
    /// Most recent Sunday backups.
    Weekly,
    /// Newest backup of each recent month.
    Monthly,
}

impl RetentionRule {
    /// Returns the rule name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl fmt::Display for RetentionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of applying the retention rules to a set of records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionPlan {
    /// Retained records, keyed by path, with the rules that retained each.
    pub kept: BTreeMap<PathBuf, BTreeSet<RetentionRule>>,
    /// Records not retained by any rule, newest first.
    pub deleted: Vec<BackupRecord>,
}

impl RetentionPlan {
    /// Returns the set of retained record identifiers.
    #[must_use]
    pub fn retained(&self) -> BTreeSet<PathBuf> {
        self.kept.keys().cloned().collect()
    }

    /// Returns `true` if the record at `path` is retained.
    #[must_use]
    pub fn is_retained(&self, path: &Path) -> bool {
        self.kept.contains_key(path)
    }

    /// Returns the rules that retained the record at `path`, if any.
    #[must_use]
    pub fn reasons(&self, path: &Path) -> Option<&BTreeSet<RetentionRule>> {
        self.kept.get(path)
    }

    /// Number of retained records.
    #[must_use]
    pub fn kept_count(&self) -> usize {
        self.kept.len()
    }

    /// Number of records to delete.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.deleted.len()
    }
}

/// Applies daily/weekly/monthly retention rules to backup records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionSelector {
    config: RetentionConfig,
}

impl RetentionSelector {
    /// Creates a selector for the given retention counts.
    #[must_use]
    pub const fn new(config: RetentionConfig) -> Self {
        Self { config }
    }

    /// Returns the retention counts in use.
    #[must_use]
    pub const fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Returns the identifiers of the records to retain.
    ///
    /// The result is always a subset of the input paths. Input order only
    /// matters for breaking timestamp ties: among equal timestamps the record
    /// appearing first is treated as the newer one.
    #[must_use]
    pub fn select(&self, records: &[BackupRecord]) -> BTreeSet<PathBuf> {
        self.plan(records).retained()
    }

    /// Returns the full plan: retained records with their reasons, plus the
    /// deletion list.
    #[must_use]
    pub fn plan(&self, records: &[BackupRecord]) -> RetentionPlan {
        let ordered = newest_first(records);
        let mut kept: BTreeMap<PathBuf, BTreeSet<RetentionRule>> = BTreeMap::new();
        let mut keep = |record: &BackupRecord, rule: RetentionRule| {
            kept.entry(record.path.clone()).or_default().insert(rule);
        };

        for record in ordered.iter().take(as_limit(self.config.daily)) {
            keep(*record, RetentionRule::Daily);
        }

        for record in ordered
            .iter()
            .filter(|r| r.is_end_of_week())
            .take(as_limit(self.config.weekly))
        {
            keep(*record, RetentionRule::Weekly);
        }

        for record in monthly_representatives(&ordered)
            .into_iter()
            .take(as_limit(self.config.monthly))
        {
            keep(record, RetentionRule::Monthly);
        }

        let deleted = ordered
            .into_iter()
            .filter(|r| !kept.contains_key(&r.path))
            .cloned()
            .collect();

        RetentionPlan { kept, deleted }
    }
}

/// Returns the identifiers of the records to retain under `config`.
///
/// Shorthand for `RetentionSelector::new(config).select(records)`.
#[must_use]
pub fn select(records: &[BackupRecord], config: RetentionConfig) -> BTreeSet<PathBuf> {
    RetentionSelector::new(config).select(records)
}

/// Sorts by timestamp descending. The sort is stable, so ties keep input order.
fn newest_first(records: &[BackupRecord]) -> Vec<&BackupRecord> {
    let mut ordered: Vec<&BackupRecord> = records.iter().collect();
    ordered.sort_by_key(|r| Reverse(r.timestamp));
    ordered
}

/// Newest record of each `(year, month)`, most recent month first.
///
/// `ordered` must already be newest first, so the first record seen for a
/// month is its representative.
fn monthly_representatives<'a>(ordered: &[&'a BackupRecord]) -> Vec<&'a BackupRecord> {
    let mut by_month: BTreeMap<(i32, u32), &'a BackupRecord> = BTreeMap::new();
    for record in ordered {
        by_month.entry(record.year_month()).or_insert(*record);
    }
    by_month.into_values().rev().collect()
}

fn as_limit(count: u32) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}
