//! Tesseract backend, compiled with the `tesseract` feature.
//!
//! Reads the chart as a single uniform block with a digits-and-separators
//! whitelist.

use image::GrayImage;
use kreuzberg_tesseract::{TessPageSegMode, TesseractAPI};
use std::env;
use std::path::Path;

use super::TextRecognizer;
use crate::config::OcrConfig;
use crate::model::OcrError;

/// Common tessdata locations, tried when neither the config nor
/// `TESSDATA_PREFIX` names one.
const FALLBACK_TESSDATA: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
    r"C:\Program Files\Tesseract-OCR\tessdata",
];

/// Tesseract configured for the chart tables: digit whitelist and a single
/// uniform text block per image.
pub struct TesseractRecognizer {
    cfg: OcrConfig,
}

impl TesseractRecognizer {
    pub fn new(cfg: OcrConfig) -> Self {
        Self { cfg }
    }

    fn tessdata_dir(&self) -> String {
        self.cfg
            .tessdata_dir
            .clone()
            .or_else(|| env::var("TESSDATA_PREFIX").ok())
            .or_else(|| {
                FALLBACK_TESSDATA
                    .iter()
                    .find(|p| Path::new(p).exists())
                    .map(|p| (*p).to_string())
            })
            .unwrap_or_default()
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage) -> Result<String, OcrError> {
        let tessdata = self.tessdata_dir();
        let language = self.cfg.language.trim();

        // Tesseract aborts instead of erroring on a missing language file
        if !tessdata.is_empty() {
            let traineddata = Path::new(&tessdata).join(format!("{language}.traineddata"));
            if !traineddata.exists() {
                return Err(OcrError::Init(format!(
                    "traineddata not found: {}",
                    traineddata.display()
                )));
            }
        }

        let api = TesseractAPI::new();
        api.init(&tessdata, language)
            .map_err(|e| OcrError::Init(format!("language '{language}' in '{tessdata}': {e}")))?;
        api.set_page_seg_mode(TessPageSegMode::from_int(self.cfg.page_seg_mode))
            .map_err(|e| OcrError::Init(format!("page segmentation mode: {e}")))?;
        api.set_variable("tessedit_char_whitelist", &self.cfg.char_whitelist)
            .map_err(|e| OcrError::Init(format!("character whitelist: {e}")))?;

        let (w, h) = image.dimensions();
        api.set_image(image.as_raw(), w as i32, h as i32, 1, w as i32)
            .map_err(|e| OcrError::Recognition(format!("set image: {e}")))?;
        api.recognize()
            .map_err(|e| OcrError::Recognition(format!("recognize: {e}")))?;

        api.get_utf8_text()
            .map_err(|e| OcrError::Recognition(format!("read text: {e}")))
    }
}
