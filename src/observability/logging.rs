//! Structured logging configuration.

use crate::config::LoggingSettings;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Directive used when nothing else is configured.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Returns the format name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(Error::InvalidInput(format!(
                "unknown log format '{other}' (expected 'pretty' or 'json')"
            ))),
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Line format for both console and file output.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub directive: String,
    /// Optional log file, appended to.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            directive: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// The filter is `debug` when `verbose` is set, otherwise `RUST_LOG`, then
    /// the configured level, then `info`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured format is unknown.
    pub fn from_settings(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        file: Option<PathBuf>,
    ) -> Result<Self> {
        Self::resolve(settings, verbose, file, std::env::var("RUST_LOG").ok())
    }

    fn resolve(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        file: Option<PathBuf>,
        rust_log: Option<String>,
    ) -> Result<Self> {
        let format = settings
            .and_then(|s| s.format.as_deref())
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();

        let directive = if verbose {
            "debug".to_string()
        } else {
            rust_log
                .filter(|v| !v.trim().is_empty())
                .or_else(|| settings.and_then(|s| s.level.clone()))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
        };

        Ok(Self {
            format,
            directive,
            file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("pretty", LogFormat::Pretty; "pretty")]
    #[test_case("JSON", LogFormat::Json; "uppercase json")]
    #[test_case(" text ", LogFormat::Pretty; "text alias")]
    fn test_parse_format(input: &str, expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().expect("valid format"), expected);
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = "xml".parse::<LogFormat>().expect_err("unknown");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_defaults_without_settings() {
        let config = LoggingConfig::resolve(None, false, None, None).expect("resolve");
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_directive_precedence() {
        let settings = LoggingSettings {
            format: Some("json".to_string()),
            level: Some("warn".to_string()),
            ..LoggingSettings::default()
        };

        let from_config =
            LoggingConfig::resolve(Some(&settings), false, None, None).expect("resolve");
        assert_eq!(from_config.directive, "warn");
        assert_eq!(from_config.format, LogFormat::Json);

        let from_env = LoggingConfig::resolve(
            Some(&settings),
            false,
            None,
            Some("keepsake=trace".to_string()),
        )
        .expect("resolve");
        assert_eq!(from_env.directive, "keepsake=trace");

        let verbose =
            LoggingConfig::resolve(Some(&settings), true, None, Some("error".to_string()))
                .expect("resolve");
        assert_eq!(verbose.directive, "debug");
    }

    #[test]
    fn test_blank_rust_log_ignored() {
        let config =
            LoggingConfig::resolve(None, false, None, Some("  ".to_string())).expect("resolve");
        assert_eq!(config.directive, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_bad_format_in_settings_fails() {
        let settings = LoggingSettings {
            format: Some("yaml".to_string()),
            ..LoggingSettings::default()
        };
        assert!(LoggingConfig::resolve(Some(&settings), false, None, None).is_err());
    }
}
