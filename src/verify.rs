//! Feed and database verification.
//!
//! Checks, without writing anything, that each configured chart feed can be
//! fetched, decoded and read, and that the database has the expected tables.
//! Run this after changing feed URLs or OCR settings, before trusting a
//! scheduled `run`.

use crate::capacity::MemoryCapacityTable;
use crate::config::PipelineConfig;
use crate::db;
use crate::feeds::find_feed;
use crate::imaging;
use crate::ingest::chart::{ChartSource, HttpChartSource};
use crate::model::{FeedKind, FetchError};
use crate::ocr::{self, TextRecognizer};
use crate::parse;
use chrono::{Datelike, Local, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::sync::Arc;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub feeds: Vec<FeedVerification>,
    pub database: Option<DatabaseVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub feeds_total: usize,
    pub feeds_working: usize,
    pub feeds_failed: usize,
    pub database_ok: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedVerification {
    pub feed: String,
    pub name: String,
    pub location: String,
    pub status: VerificationStatus,
    pub bytes_received: usize,
    pub image_size: Option<(u32, u32)>,
    pub ocr_lines: usize,
    pub valid_lines: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseVerification {
    pub status: VerificationStatus,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Feed Verification
// ============================================================================

/// Fetch, decode, OCR and parse one feed. Volumes are not resolved and
/// nothing is written.
pub fn verify_feed<S: ChartSource>(
    source: &S,
    kind: FeedKind,
    config: &PipelineConfig,
    recognizer: &Arc<dyn TextRecognizer>,
    year: i32,
) -> FeedVerification {
    let mut result = FeedVerification {
        feed: kind.to_string(),
        name: find_feed(kind).name.to_string(),
        location: source.location(kind),
        status: VerificationStatus::Failed,
        bytes_received: 0,
        image_size: None,
        ocr_lines: 0,
        valid_lines: 0,
        error_message: None,
    };

    let bytes = match source.fetch(kind) {
        Ok(bytes) => bytes,
        Err(e) => {
            result.error_message = Some(format!("Fetch failed: {}", e));
            return result;
        }
    };
    result.bytes_received = bytes.len();

    let normalized = match imaging::decode_chart(&bytes).and_then(|img| imaging::normalize(&img, &config.imaging)) {
        Ok(img) => img,
        Err(e) => {
            result.error_message = Some(format!("Image failed: {}", e));
            return result;
        }
    };
    result.image_size = Some(normalized.dimensions());

    let site = config.station.name.as_str();
    let text = ocr::extract_text(recognizer, normalized, config.ocr.timeout(), site);
    result.ocr_lines = parse::tokenize(&text).len();

    result.valid_lines = match kind {
        FeedKind::Level => {
            // Without capacity rows only line validity is measured here.
            let mut no_capacity = MemoryCapacityTable::default();
            parse::parse_level_text(&text, year, &config.station, &mut no_capacity).records.len()
        }
        FeedKind::Rain => parse::parse_rain_text(&text, year, site).records.len(),
    };

    if result.valid_lines > 0 {
        result.status = VerificationStatus::Success;
    } else {
        result.status = VerificationStatus::PartialSuccess;
        result.error_message = Some(if result.ocr_lines == 0 {
            format!("Chart decoded but {} returned no text", recognizer.name())
        } else {
            format!("{} OCR lines, none valid", result.ocr_lines)
        });
    }

    result
}

/// Connects with `DATABASE_URL` and checks the required tables.
pub fn verify_database() -> DatabaseVerification {
    match db::connect_and_verify() {
        Ok(_) => DatabaseVerification { status: VerificationStatus::Success, error_message: None },
        Err(e) => DatabaseVerification {
            status: VerificationStatus::Failed,
            error_message: Some(e.to_string()),
        },
    }
}

// ============================================================================
// Full Verification Runner
// ============================================================================

/// Verify feeds from `source`; summary counts partial successes as working.
pub fn verify_feeds<S: ChartSource>(
    source: &S,
    config: &PipelineConfig,
    recognizer: &Arc<dyn TextRecognizer>,
    year: i32,
) -> VerificationReport {
    let mut report = VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        feeds: Vec::new(),
        database: None,
        summary: VerificationSummary {
            feeds_total: 0,
            feeds_working: 0,
            feeds_failed: 0,
            database_ok: None,
        },
    };

    for kind in [FeedKind::Level, FeedKind::Rain] {
        print!("  {} ... ", kind);
        let result = verify_feed(source, kind, config, recognizer, year);

        match result.status {
            VerificationStatus::Success => {
                println!("✓ OK ({} valid lines of {})", result.valid_lines, result.ocr_lines);
                report.summary.feeds_working += 1;
            }
            VerificationStatus::PartialSuccess => {
                println!("⚠ Partial ({})", result.error_message.as_deref().unwrap_or("no valid lines"));
                report.summary.feeds_working += 1;
            }
            VerificationStatus::Failed => {
                println!("✗ FAILED: {}", result.error_message.as_deref().unwrap_or("Unknown"));
                report.summary.feeds_failed += 1;
            }
        }

        report.summary.feeds_total += 1;
        report.feeds.push(result);
    }

    report
}

/// Live feeds plus the database.
pub fn run_full_verification(
    config: &PipelineConfig,
    recognizer: &Arc<dyn TextRecognizer>,
) -> Result<VerificationReport, FetchError> {
    let source = HttpChartSource::new(&config.feeds)?;

    println!("Verifying chart feeds...");
    let mut report = verify_feeds(&source, config, recognizer, Local::now().year());

    println!("\nVerifying database...");
    let database = verify_database();
    match &database.error_message {
        None => println!("  schema ... ✓ OK"),
        Some(e) => println!("  schema ... ✗ FAILED: {}", e),
    }
    report.summary.database_ok = Some(database.status == VerificationStatus::Success);
    report.database = Some(database);

    Ok(report)
}

pub fn save_report(report: &VerificationReport, path: &str) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)?;
    Ok(())
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n===========================================================");
    println!("VERIFICATION SUMMARY");
    println!("===========================================================");
    println!();
    println!("Chart feeds:  {}/{} working  ({} failed)",
        report.summary.feeds_working, report.summary.feeds_total, report.summary.feeds_failed);
    match report.summary.database_ok {
        Some(true) => println!("Database:     OK"),
        Some(false) => println!("Database:     FAILED"),
        None => println!("Database:     not checked"),
    }
    println!("===========================================================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OcrError;
    use image::{GrayImage, Luma};

    struct StaticCharts {
        png: Vec<u8>,
    }

    impl ChartSource for StaticCharts {
        fn fetch(&self, kind: FeedKind) -> Result<Vec<u8>, FetchError> {
            match kind {
                FeedKind::Level => Ok(self.png.clone()),
                FeedKind::Rain => Err(FetchError::HttpStatus(404)),
            }
        }

        fn location(&self, kind: FeedKind) -> String {
            format!("static/{kind}.png")
        }
    }

    struct Fixed(&'static str);

    impl TextRecognizer for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn recognize(&self, _image: &GrayImage) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    fn charts() -> StaticCharts {
        let img = GrayImage::from_fn(8, 8, |x, _| if x < 4 { Luma([0]) } else { Luma([255]) });
        StaticCharts { png: imaging::encode_png(&img).unwrap() }
    }

    #[test]
    fn test_feed_with_valid_lines_is_success() {
        let engine: Arc<dyn TextRecognizer> = Arc::new(Fixed("06-1508:00 12.34\n06-1509:00 99.99"));
        let result = verify_feed(&charts(), FeedKind::Level, &PipelineConfig::default(), &engine, 2026);
        assert_eq!(result.status, VerificationStatus::Success);
        assert_eq!(result.ocr_lines, 2);
        assert_eq!(result.valid_lines, 1);
        assert_eq!(result.image_size, Some((24, 24)));
    }

    #[test]
    fn test_unreadable_chart_is_partial_success() {
        let engine: Arc<dyn TextRecognizer> = Arc::new(Fixed(""));
        let result = verify_feed(&charts(), FeedKind::Level, &PipelineConfig::default(), &engine, 2026);
        assert_eq!(result.status, VerificationStatus::PartialSuccess);
        assert!(result.error_message.unwrap().contains("no text"));
    }

    #[test]
    fn test_summary_counts_failed_fetch() {
        let engine: Arc<dyn TextRecognizer> = Arc::new(Fixed("06-1508:00 12.34"));
        let report = verify_feeds(&charts(), &PipelineConfig::default(), &engine, 2026);
        assert_eq!(report.summary.feeds_total, 2);
        assert_eq!(report.summary.feeds_working, 1);
        assert_eq!(report.summary.feeds_failed, 1);
        assert_eq!(report.feeds[1].status, VerificationStatus::Failed);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let engine: Arc<dyn TextRecognizer> = Arc::new(Fixed(""));
        let report = verify_feeds(&charts(), &PipelineConfig::default(), &engine, 2026);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        save_report(&report, path.to_str().unwrap()).unwrap();

        let loaded: VerificationReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.feeds.len(), 2);
        assert_eq!(loaded.summary.database_ok, None);
    }
}
