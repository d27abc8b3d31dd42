//! # Logging Utilities
//!
//! Logging infrastructure for Ferros using `tracing`.
//!
//! Console output goes to stderr so that anything a command prints on stdout
//! (declaration dumps, image lists) stays machine-readable. Every resolver
//! request opens a span carrying its request id, so the pretty and JSON
//! formats both show which lookup a line belongs to.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferros_utils::{init_logging, LoggingConfig};
//!
//! // Keep the guard alive for as long as file logging should be flushed.
//! let _guard = init_logging(&LoggingConfig::from_env()).expect("Failed to initialize logging");
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=ferros_expr=trace`)
//! - `FERROS_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `FERROS_LOG_FILE`: Optional path of a log file written in addition to stderr

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Output format of every layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines with ANSI colours on a terminal
    #[default]
    Pretty,
    /// One JSON object per event, spans included
    Json,
}

impl LogFormat
{
    const ALIASES: [(&'static str, LogFormat); 6] = [
        ("pretty", LogFormat::Pretty),
        ("dev", LogFormat::Pretty),
        ("development", LogFormat::Pretty),
        ("json", LogFormat::Json),
        ("prod", LogFormat::Json),
        ("production", LogFormat::Json),
    ];
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let wanted = s.to_ascii_lowercase();
        Self::ALIASES
            .iter()
            .find_map(|(alias, format)| (*alias == wanted).then_some(*format))
            .ok_or_else(|| format!("Unknown log format: {s}. Use 'pretty' or 'json'"))
    }
}

/// Verbosity, from least to most chatty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    /// Includes every import and map completion
    Trace,
}

impl LogLevel
{
    const ALIASES: [(&'static str, LogLevel); 8] = [
        ("error", LogLevel::Error),
        ("err", LogLevel::Error),
        ("warn", LogLevel::Warn),
        ("warning", LogLevel::Warn),
        ("info", LogLevel::Info),
        ("debug", LogLevel::Debug),
        ("dbg", LogLevel::Debug),
        ("trace", LogLevel::Trace),
    ];
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let wanted = s.to_ascii_lowercase();
        Self::ALIASES
            .iter()
            .find_map(|(alias, level)| (*alias == wanted).then_some(*level))
            .ok_or_else(|| format!("Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"))
    }
}

/// Where and how to log.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig
{
    /// Overrides `RUST_LOG` when set.
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Also write to this file (never rotated).
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Read `FERROS_LOG_FORMAT` and `FERROS_LOG_FILE`.
    ///
    /// Unparsable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self
    {
        let format = env::var("FERROS_LOG_FORMAT")
            .ok()
            .and_then(|s| LogFormat::from_str(&s).ok())
            .unwrap_or_default();
        let file = env::var("FERROS_LOG_FILE").ok().map(PathBuf::from);
        Self {
            level: None,
            format,
            file,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        self
    }

    fn filter(&self) -> EnvFilter
    {
        // Priority: explicit level, then RUST_LOG, then INFO.
        if let Some(level) = self.level {
            return EnvFilter::new(Level::from(level).to_string());
        }
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()))
    }
}

fn layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());
    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

/// Initialize the global subscriber.
///
/// Returns the guard of the file writer when file logging is enabled; logs
/// buffered for the file are flushed when it is dropped.
///
/// ## Errors
///
/// Returns an error if logging is already initialized or the log file
/// directory cannot be created.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![layer(config.format, io::stderr, true).with_filter(config.filter()).boxed()];

    let mut guard = None;
    if let Some(path) = &config.file {
        let directory = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
        std::fs::create_dir_all(directory)?;
        let file_name = path
            .file_name()
            .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
        let (writer, file_guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name));
        layers.push(layer(config.format, writer, false).with_filter(config.filter()).boxed());
        guard = Some(file_guard);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;
    Ok(guard)
}

/// Initialize logging at `level`, taking the rest from the environment.
///
/// ## Errors
///
/// See [`init_logging`].
pub fn init_logging_with_level(level: LogLevel) -> Result<Option<WorkerGuard>, LoggingError>
{
    init_logging(&LoggingConfig::from_env().with_level(Some(level)))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// The log file path has no file name
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_every_format_alias_parses()
    {
        for (alias, format) in LogFormat::ALIASES {
            assert_eq!(alias.parse::<LogFormat>().unwrap(), format);
            assert_eq!(alias.to_uppercase().parse::<LogFormat>().unwrap(), format);
        }
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_every_level_alias_parses()
    {
        for (alias, level) in LogLevel::ALIASES {
            assert_eq!(alias.parse::<LogLevel>().unwrap(), level);
        }
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_levels_are_ordered_by_verbosity()
    {
        assert!(LogLevel::Error < LogLevel::Info);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_explicit_level_wins()
    {
        let config = LoggingConfig::default().with_level(Some(LogLevel::Trace));
        assert_eq!(config.level, Some(LogLevel::Trace));

        let unchanged = config.clone().with_level(None);
        assert_eq!(unchanged.level, Some(LogLevel::Trace));
    }
}
