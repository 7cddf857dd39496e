/// One ingest cycle per feed:
///
///   fetch chart → decode → normalize → OCR → parse (+ volumes) → reconcile
///
/// Fetch, decode and OCR failures are logged and leave the feed with nothing
/// to write this cycle. A failed capacity lookup drops only its own line. A
/// store failure fails only the feed it happened in; the other feed still
/// runs.

use crate::capacity::CapacityTable;
use crate::config::PipelineConfig;
use crate::imaging;
use crate::ingest::chart::ChartSource;
use crate::logging::{self, DataSource, classify_fetch_failure, classify_image_failure, log_feed_failure};
use crate::model::{FeedKind, StoreError, WriteReport};
use crate::ocr::{self, TextRecognizer};
use crate::parse::{self, SkippedLine};
use crate::store::DeviceStore;
use crate::writer;
use chrono::{Datelike, NaiveDateTime};
use std::sync::Arc;
use thiserror::Error;

/// Why a feed's batch was abandoned.
#[derive(Debug, Error)]
pub enum FeedFailure {
    #[error("write failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub enum FeedOutcome {
    /// Nothing to write: no chart, no text, or no valid line.
    NoData,
    Written(WriteReport),
    Failed(FeedFailure),
}

/// What one feed run did.
#[derive(Debug)]
pub struct FeedReport {
    pub kind: FeedKind,
    /// Records accepted by the parser.
    pub parsed: usize,
    pub skipped: Vec<SkippedLine>,
    pub outcome: FeedOutcome,
}

impl FeedReport {
    fn no_data(kind: FeedKind) -> Self {
        Self { kind, parsed: 0, skipped: Vec::new(), outcome: FeedOutcome::NoData }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, FeedOutcome::Failed(_))
    }
}

pub struct Pipeline<S: ChartSource> {
    config: PipelineConfig,
    source: S,
    recognizer: Arc<dyn TextRecognizer>,
}

impl<S: ChartSource> Pipeline<S> {
    pub fn new(config: PipelineConfig, source: S, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { config, source, recognizer }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn site(&self) -> &str {
        &self.config.station.name
    }

    /// OCR text of the feed's current chart; empty on any failure.
    pub fn extract(&self, kind: FeedKind) -> String {
        let source = DataSource::from(kind);
        let site = self.site();
        let location = self.source.location(kind);

        let bytes = match self.source.fetch(kind) {
            Ok(bytes) => bytes,
            Err(e) => {
                log_feed_failure(source, site, &format!("Fetch {}", location), classify_fetch_failure(&e), &e);
                return String::new();
            }
        };
        logging::debug(source, Some(site), &format!("Fetched {} bytes from {}", bytes.len(), location));

        let normalized = imaging::decode_chart(&bytes)
            .and_then(|img| imaging::normalize(&img, &self.config.imaging));
        let normalized = match normalized {
            Ok(img) => img,
            Err(e) => {
                log_feed_failure(source, site, "Chart decode", classify_image_failure(&e), &e);
                return String::new();
            }
        };

        ocr::extract_text(&self.recognizer, normalized, self.config.ocr.timeout(), site)
    }

    /// Parse OCR text for `kind` and reconcile the records into `store`.
    ///
    /// `now` supplies the year for chart timestamps.
    pub fn ingest_text(
        &self,
        kind: FeedKind,
        text: &str,
        now: NaiveDateTime,
        capacity: &mut dyn CapacityTable,
        store: &mut dyn DeviceStore,
    ) -> FeedReport {
        let site = self.site();
        let year = now.year();

        let (parsed, skipped, written) = match kind {
            FeedKind::Level => {
                let out = parse::parse_level_text(text, year, &self.config.station, capacity);
                let written = writer::reconcile(store, site, &out.records);
                (out.records.len(), out.skipped, written)
            }
            FeedKind::Rain => {
                let out = parse::parse_rain_text(text, year, site);
                let written = writer::reconcile(store, site, &out.records);
                (out.records.len(), out.skipped, written)
            }
        };

        let outcome = match written {
            Ok(report) if report.is_empty() => FeedOutcome::NoData,
            Ok(report) => {
                logging::log_write_summary(DataSource::from(kind), site, &report);
                FeedOutcome::Written(report)
            }
            Err(e) => FeedOutcome::Failed(e.into()),
        };

        FeedReport { kind, parsed, skipped, outcome }
    }

    /// Full run for one feed.
    pub fn run_feed(
        &self,
        kind: FeedKind,
        now: NaiveDateTime,
        capacity: &mut dyn CapacityTable,
        store: &mut dyn DeviceStore,
    ) -> FeedReport {
        let text = self.extract(kind);
        if text.trim().is_empty() {
            logging::info(DataSource::from(kind), Some(self.site()), "No chart text this cycle");
            return FeedReport::no_data(kind);
        }
        self.ingest_text(kind, &text, now, capacity, store)
    }

    /// Level feed, then rain feed. Each runs regardless of the other's
    /// outcome.
    pub fn run_cycle(
        &self,
        now: NaiveDateTime,
        capacity: &mut dyn CapacityTable,
        store: &mut dyn DeviceStore,
    ) -> Vec<FeedReport> {
        let mut reports = Vec::with_capacity(2);
        for kind in [FeedKind::Level, FeedKind::Rain] {
            reports.push(self.run_feed(kind, now, capacity, store));
        }
        reports
    }
}
