//! Observability: console and file logging.
//!
//! Log lines go to stderr, so command output on stdout stays machine
//! readable, and are appended to the project's log file when one is
//! configured.

mod logging;

pub use logging::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig};

use crate::config::KeepsakeConfig;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Options for initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested via CLI.
    pub verbose: bool,
    /// Skip the log file even when the configuration names one.
    pub console_only: bool,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Initializes logging from the loaded configuration.
///
/// # Errors
///
/// Returns an error if logging was already initialized or the configured
/// format is unknown.
pub fn init_from_config(config: &KeepsakeConfig, options: InitOptions) -> Result<()> {
    let logging = LoggingConfig::from_settings(
        Some(&config.logging),
        options.verbose,
        log_file_for(config, options),
    )?;
    init(&logging)
}

/// Resolves the log file a run appends to, if any.
fn log_file_for(config: &KeepsakeConfig, options: InitOptions) -> Option<PathBuf> {
    if options.console_only {
        return None;
    }
    config.log_file()
}

/// Initializes the global tracing subscriber.
///
/// A log file that cannot be opened does not fail initialization: logging
/// continues on the console and the failure is reported as a warning.
///
/// # Errors
///
/// Returns an error if logging was already initialized or the filter
/// directive is invalid.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(already_initialized());
    }

    let filter = EnvFilter::try_new(&config.directive).map_err(|e| {
        Error::InvalidInput(format!("invalid log filter '{}': {e}", config.directive))
    })?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config.format)];
    let mut file_error = None;
    if let Some(path) = &config.file {
        match open_log_file(path) {
            Ok(writer) => layers.push(file_layer(config.format, writer)),
            Err(e) => file_error = Some(e),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(init_error)?;

    OBSERVABILITY_INIT.set(()).map_err(|()| already_initialized())?;

    if let Some(e) = file_error {
        tracing::warn!(error = %e, "Log file unavailable; logging to console only");
    }
    Ok(())
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_target(false)
            .boxed(),
    }
}

fn file_layer(format: LogFormat, writer: LogFileWriter) -> BoxedLayer {
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
    }
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

fn already_initialized() -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: "logging already initialized".to_string(),
    }
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    }
}
