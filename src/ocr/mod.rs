//! Chart text extraction.
//!
//! A `TextRecognizer` turns a normalized binary chart into raw table text.
//! `extract_text` bounds each call with a timeout and maps every engine
//! failure to an empty string after logging it.

#[cfg(feature = "tesseract")]
pub mod tesseract;

use crate::config::OcrConfig;
use crate::logging::{self, DataSource, classify_ocr_failure, log_feed_failure};
use crate::model::OcrError;
use image::GrayImage;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Recognizers
// ---------------------------------------------------------------------------

/// Every OCR backend implements this.
///
/// `recognize` receives the normalized binary chart and returns the raw
/// multi-line text, one table row per line. Backends are configured at
/// construction with the character whitelist and the "single uniform block
/// of text" layout hint; the extractor never changes them per call.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError>;
}

/// Stand-in used when the service is built without an OCR engine.
pub struct UnavailableRecognizer;

impl TextRecognizer for UnavailableRecognizer {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn recognize(&self, _image: &GrayImage) -> Result<String, OcrError> {
        Err(OcrError::Unavailable(
            "built without the `tesseract` feature".to_string(),
        ))
    }
}

/// The engine this build links, configured from `cfg`.
pub fn default_recognizer(cfg: &OcrConfig) -> Arc<dyn TextRecognizer> {
    #[cfg(feature = "tesseract")]
    {
        Arc::new(tesseract::TesseractRecognizer::new(cfg.clone()))
    }
    #[cfg(not(feature = "tesseract"))]
    {
        let _ = cfg;
        Arc::new(UnavailableRecognizer)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Run OCR on a normalized chart, bounded by `timeout`.
///
/// Any engine failure, including a timeout, is logged against `site` and
/// turned into an empty string: an empty extraction is a valid outcome that
/// simply produces no records. On timeout the engine thread is left to
/// finish on its own; its result is discarded.
pub fn extract_text(
    recognizer: &Arc<dyn TextRecognizer>,
    image: GrayImage,
    timeout: Duration,
    site: &str,
) -> String {
    match recognize_with_timeout(recognizer, image, timeout) {
        Ok(text) => {
            logging::debug(
                DataSource::Ocr,
                Some(site),
                &format!("{} returned {} lines", recognizer.name(), text.lines().count()),
            );
            text
        }
        Err(e) => {
            log_feed_failure(DataSource::Ocr, site, "Text extraction", classify_ocr_failure(&e), &e);
            String::new()
        }
    }
}

fn recognize_with_timeout(
    recognizer: &Arc<dyn TextRecognizer>,
    image: GrayImage,
    timeout: Duration,
) -> Result<String, OcrError> {
    let (tx, rx) = mpsc::channel();
    let engine = Arc::clone(recognizer);
    thread::Builder::new()
        .name("ocr".to_string())
        .spawn(move || {
            let _ = tx.send(engine.recognize(&image));
        })
        .map_err(|e| OcrError::Recognition(format!("cannot start OCR thread: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(OcrError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(OcrError::Recognition("OCR thread panicked".to_string()))
        }
    }
}
