//! Configuration management.
//!
//! Configuration is read from a JSON file (the format used by existing backup
//! jobs) or a TOML file, selected by extension:
//!
//! ```json
//! {
//!   "project_name": "site",
//!   "local_backup_base_dir": "~/backups",
//!   "retention": { "daily": 7, "weekly": 4, "monthly": 3 },
//!   "logging": { "format": "pretty", "level": "info" }
//! }
//! ```
//!
//! Keys this tool does not use (upload remotes, webhook URLs) are ignored, so
//! one config file can serve the whole backup job.
//!
//! Precedence, lowest to highest: built-in defaults, config file,
//! `KEEPSAKE_*` environment variables, command-line flags.

use crate::gc::{DEFAULT_STALE_AFTER, RetentionConfig};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "KEEPSAKE_CONFIG_PATH";

/// Environment variable overriding the project name.
pub const PROJECT_ENV: &str = "KEEPSAKE_PROJECT";

/// Environment variable overriding the backup base directory.
pub const BACKUP_DIR_ENV: &str = "KEEPSAKE_BACKUP_DIR";

/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "KEEPSAKE_LOG_FORMAT";

/// Default backup base directory.
pub const DEFAULT_BACKUP_DIR: &str = "~/backups";

/// Log file created inside the project root when no explicit path is set.
pub const DEFAULT_LOG_FILE_NAME: &str = "backup.log";

/// Main configuration for keepsake.
#[derive(Debug, Clone, Serialize)]
pub struct KeepsakeConfig {
    /// Project whose backups are managed.
    pub project_name: Option<String>,
    /// Directory holding one subdirectory per project.
    pub backup_base_dir: PathBuf,
    /// Retention counts.
    pub retention: RetentionConfig,
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Age in seconds after which an abandoned prune lock is reclaimed.
    pub lock_stale_secs: u64,
}

/// Logging section of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Tracing filter directive, e.g. `info` or `keepsake=debug`.
    pub level: Option<String>,
    /// Log file path. Defaults to `<project root>/backup.log` once the root exists.
    pub file: Option<PathBuf>,
    /// Set to `false` to log to the console only.
    pub file_enabled: Option<bool>,
}

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Project name.
    pub project_name: Option<String>,
    /// Backup base directory (`~` is expanded).
    pub local_backup_base_dir: Option<String>,
    /// Retention counts; missing keys keep their defaults.
    pub retention: Option<RetentionConfig>,
    /// Shorthand for `logging.file`.
    pub log_file: Option<String>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Stale lock threshold in seconds.
    pub lock_stale_secs: Option<u64>,
}

impl Default for KeepsakeConfig {
    fn default() -> Self {
        Self {
            project_name: None,
            backup_base_dir: expand_home(DEFAULT_BACKUP_DIR),
            retention: RetentionConfig::default(),
            logging: LoggingSettings::default(),
            lock_stale_secs: DEFAULT_STALE_AFTER.as_secs(),
        }
    }
}

impl KeepsakeConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Negative
    /// retention counts fail to parse.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Ok(Self::from_config_file(Self::parse(path, &contents)?))
    }

    fn parse(path: &Path, contents: &str) -> Result<ConfigFile> {
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let parsed = if is_toml {
            toml::from_str(contents).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(contents).map_err(|e| e.to_string())
        };

        parsed.map_err(|cause| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: format!("{}: {cause}", path.display()),
        })
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<platform config dir>/keepsake/config.json` and then
    /// `config.toml`. Returns the default configuration only if neither
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or parsed.
    pub fn load_default() -> Result<Self> {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Ok(Self::default());
        };
        Self::load_from_dir(&base_dirs.config_dir().join("keepsake"))
    }

    /// Loads `config.json` or `config.toml` from `dir`, falling back to the
    /// defaults when neither exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the first config file found cannot be read or
    /// parsed.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        ["config.json", "config.toml"]
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.exists())
            .map_or_else(|| Ok(Self::default()), |path| Self::load_from_file(&path))
    }

    /// Converts a `ConfigFile` to `KeepsakeConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(project) = file.project_name {
            config.project_name = Some(project);
        }
        if let Some(dir) = file.local_backup_base_dir {
            config.backup_base_dir = expand_home(&dir);
        }
        if let Some(retention) = file.retention {
            config.retention = retention;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        config.logging.file = config
            .logging
            .file
            .take()
            .map(|p| p.to_str().map_or_else(|| p.clone(), expand_home))
            .or_else(|| file.log_file.as_deref().map(expand_home));
        if let Some(secs) = file.lock_stale_secs {
            config.lock_stale_secs = secs;
        }

        config
    }

    /// Applies `KEEPSAKE_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup using the `KEEPSAKE_*`
    /// variable names. Empty values are ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(project) = value(PROJECT_ENV) {
            self.project_name = Some(project.trim().to_string());
        }
        if let Some(dir) = value(BACKUP_DIR_ENV) {
            self.backup_base_dir = expand_home(dir.trim());
        }
        if let Some(format) = value(LOG_FORMAT_ENV) {
            self.logging.format = Some(format.trim().to_string());
        }
        self.retention = self.retention.with_overrides_from(&lookup);
        self
    }

    /// Sets the project name.
    #[must_use]
    pub fn with_project_name(mut self, project: impl Into<String>) -> Self {
        self.project_name = Some(project.into());
        self
    }

    /// Sets the backup base directory.
    #[must_use]
    pub fn with_backup_base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.backup_base_dir = path.into();
        self
    }

    /// Sets the retention counts.
    #[must_use]
    pub const fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Returns the validated project name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if no project is configured, or the
    /// name is empty, `.`/`..`, or contains a path separator.
    pub fn project_name(&self) -> Result<&str> {
        let name = self
            .project_name
            .as_deref()
            .map(str::trim)
            .ok_or_else(|| {
                Error::InvalidInput(
                    "project_name is not set (config file, KEEPSAKE_PROJECT or --project)"
                        .to_string(),
                )
            })?;

        if name.is_empty() || name == "." || name == ".." {
            return Err(Error::InvalidInput(format!(
                "project_name '{name}' is not a valid directory name"
            )));
        }
        if name.contains(['/', '\\']) {
            return Err(Error::InvalidInput(format!(
                "project_name '{name}' must not contain path separators"
            )));
        }
        Ok(name)
    }

    /// Returns `<backup_base_dir>/<project_name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the project name is missing or invalid.
    pub fn project_root(&self) -> Result<PathBuf> {
        Ok(self.backup_base_dir.join(self.project_name()?))
    }

    /// Returns the log file path, or `None` for console-only logging.
    ///
    /// Without an explicit path the log goes to `<project root>/backup.log`,
    /// but only if the project root already exists; logging never creates a
    /// project directory.
    #[must_use]
    pub fn log_file(&self) -> Option<PathBuf> {
        if self.logging.file_enabled == Some(false) {
            return None;
        }
        self.logging.file.clone().or_else(|| {
            self.project_root()
                .ok()
                .filter(|root| root.is_dir())
                .map(|root| root.join(DEFAULT_LOG_FILE_NAME))
        })
    }

    /// Returns the stale lock threshold.
    #[must_use]
    pub const fn lock_stale_after(&self) -> Duration {
        Duration::from_secs(self.lock_stale_secs)
    }
}

/// Expands a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let home = || directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());

    if path == "~" {
        return home().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
