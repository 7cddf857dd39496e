/// Pipeline configuration.
///
/// Everything the pipeline used to take from process-wide state (chart URLs,
/// OCR engine location, plausibility bounds) lives in `PipelineConfig`, which
/// is built once and passed into `pipeline::Pipeline` at construction time.
/// Every field has a default, so an empty TOML file is a valid configuration.

use crate::feeds::{DEFAULT_STATION_NAME, find_feed};
use crate::logging::LogLevel;
use crate::model::{ConfigError, FeedKind};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./resmon.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub station: StationConfig,
    pub feeds: FeedsConfig,
    pub ocr: OcrConfig,
    pub imaging: ImagingConfig,
    pub logging: LoggingConfig,
}

/// The reservoir whose capacity table resolves level readings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Capacity-table key (`iot_capacity.station_name`).
    pub name: String,
    /// Exclusive lower plausibility bound for water level, metres.
    pub min_level: Decimal,
    /// Exclusive upper plausibility bound for water level, metres.
    pub max_level: Decimal,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_STATION_NAME.to_string(),
            min_level: Decimal::ZERO,
            max_level: Decimal::new(40, 0),
        }
    }
}

impl StationConfig {
    /// `true` when `level` lies strictly between the bounds.
    pub fn level_is_plausible(&self, level: Decimal) -> bool {
        self.min_level < level && level < self.max_level
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub level_url: String,
    pub rain_url: String,
    pub http_timeout_secs: u64,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            level_url: find_feed(FeedKind::Level).default_url(),
            rain_url: find_feed(FeedKind::Rain).default_url(),
            http_timeout_secs: 10,
        }
    }
}

impl FeedsConfig {
    /// Chart URL of a feed, without the cache-busting parameter.
    pub fn url(&self, kind: FeedKind) -> &str {
        match kind {
            FeedKind::Level => &self.level_url,
            FeedKind::Rain => &self.rain_url,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Settings handed to the OCR engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Directory containing `<language>.traineddata`. Falls back to
    /// `TESSDATA_PREFIX` and then the engine's built-in search path.
    pub tessdata_dir: Option<String>,
    pub language: String,
    /// Characters the engine may emit.
    pub char_whitelist: String,
    /// Page segmentation mode; 6 is "single uniform block of text".
    pub page_seg_mode: i32,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tessdata_dir: None,
            language: "eng".to_string(),
            char_whitelist: "0123456789.:- ".to_string(),
            page_seg_mode: 6,
            timeout_secs: 30,
        }
    }
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImagingConfig {
    /// Linear upscale factor applied before binarization.
    pub scale_factor: u32,
    /// Median filter radius; 1 gives a 3x3 window.
    pub median_radius: u32,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self { scale_factor: 3, median_radius: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `debug`, `info`, `warn`, `error`.
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None, timestamps: true }
    }
}

impl LoggingConfig {
    pub fn min_level(&self) -> Result<LogLevel, ConfigError> {
        self.level.parse()
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses and validates a configuration document.
pub fn parse_config(text: &str, origin: &str) -> Result<PipelineConfig, ConfigError> {
    let cfg: PipelineConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: origin.to_string(),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Reads the configuration file at `path`.
pub fn load_config(path: &str) -> Result<PipelineConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    parse_config(&text, path)
}

/// Like `load_config`, but a missing file yields the defaults.
pub fn load_config_or_default(path: &str) -> Result<PipelineConfig, ConfigError> {
    if Path::new(path).exists() {
        load_config(path)
    } else {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        Ok(cfg)
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.station.name.trim().is_empty() {
            return Err(ConfigError::Invalid("station.name must not be empty".to_string()));
        }
        if self.station.min_level >= self.station.max_level {
            return Err(ConfigError::Invalid(format!(
                "station.min_level ({}) must be below station.max_level ({})",
                self.station.min_level, self.station.max_level
            )));
        }
        for kind in [FeedKind::Level, FeedKind::Rain] {
            if self.feeds.url(kind).trim().is_empty() {
                return Err(ConfigError::Invalid(format!("feeds.{kind}_url must not be empty")));
            }
        }
        if self.feeds.http_timeout_secs == 0 || self.ocr.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be at least one second".to_string()));
        }
        if self.imaging.scale_factor == 0 {
            return Err(ConfigError::Invalid("imaging.scale_factor must be at least 1".to_string()));
        }
        if self.ocr.language.trim().is_empty() {
            return Err(ConfigError::Invalid("ocr.language must not be empty".to_string()));
        }
        self.logging.min_level()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
