/// Structured logging for the reservoir chart ingest service
///
/// Provides context-rich logging with feed/station identifiers on top of
/// `tracing`. Supports console output and an append-only log file for
/// unattended runs, and classifies feed failures so that routine
/// "no data this cycle" outcomes do not show up as errors.

use crate::model::{ConfigError, FetchError, ImageError, OcrError, WriteReport};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing_subscriber::Layer as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::Invalid(format!("unknown log level '{other}'"))),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    LevelFeed,
    RainFeed,
    Ocr,
    Capacity,
    Database,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::LevelFeed => write!(f, "LEVEL"),
            DataSource::RainFeed => write!(f, "RAIN"),
            DataSource::Ocr => write!(f, "OCR"),
            DataSource::Capacity => write!(f, "CAP"),
            DataSource::Database => write!(f, "DB"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

impl From<crate::model::FeedKind> for DataSource {
    fn from(kind: crate::model::FeedKind) -> Self {
        match kind {
            crate::model::FeedKind::Level => DataSource::LevelFeed,
            crate::model::FeedKind::Rain => DataSource::RainFeed,
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Unexpected failure - indicates a URL change, format change or outage
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Initialize the global logger.
///
/// `RUST_LOG` takes precedence over `min_level` when set. When `log_file` is
/// given, every event is also appended to that file without ANSI colouring.
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(min_level).into())
        .from_env_lossy();

    let console_layer = if console_timestamps {
        tracing_fmt::layer().with_target(false).boxed()
    } else {
        tracing_fmt::layer().with_target(false).without_time().boxed()
    };

    let file_layer = log_file.map(|path| {
        let path = Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "resmon.log".into());
        tracing_fmt::layer()
            .with_writer(tracing_appender::rolling::never(dir, name))
            .with_ansi(false)
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::info!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::warn!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::error!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(source: DataSource, site_id: Option<&str>, message: &str) {
    tracing::debug!(source = %source, site = site_id.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify a chart download failure
pub fn classify_fetch_failure(err: &FetchError) -> FailureType {
    match err {
        FetchError::HttpStatus(code) if *code >= 500 => FailureType::Unknown,
        FetchError::HttpStatus(_) => FailureType::Unexpected,
        FetchError::Request(e) if e.is_timeout() || e.is_connect() => FailureType::Unknown,
        FetchError::Request(_) => FailureType::Unexpected,
        FetchError::Io { .. } => FailureType::Unexpected,
    }
}

/// Classify a chart decode failure
pub fn classify_image_failure(err: &ImageError) -> FailureType {
    match err {
        // A truncated body decodes as an empty or broken image
        ImageError::Empty { .. } => FailureType::Unknown,
        ImageError::Decode(_) => FailureType::Unexpected,
    }
}

/// Classify an OCR engine failure
pub fn classify_ocr_failure(err: &OcrError) -> FailureType {
    match err {
        // No engine linked: nothing can be read until the build changes
        OcrError::Unavailable(_) => FailureType::Unknown,
        OcrError::Timeout(_) => FailureType::Unknown,
        OcrError::Init(_) | OcrError::Recognition(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a feed failure with its classification
pub fn log_feed_failure(
    source: DataSource,
    site_id: &str,
    operation: &str,
    failure_type: FailureType,
    err: &dyn std::error::Error,
) {
    let message = format!("{} failed [{}]: {}", operation, failure_type, err);

    match failure_type {
        FailureType::Unexpected => error(source, Some(site_id), &message),
        FailureType::Unknown => warn(source, Some(site_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Write Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one reconciliation batch
pub fn log_write_summary(source: DataSource, site_id: &str, report: &WriteReport) {
    let message = format!(
        "Write complete: {} records, {} inserted, {} updated, {} unchanged",
        report.len(),
        report.inserted(),
        report.updated(),
        report.unchanged()
    );
    info(source, Some(site_id), &message);
}
