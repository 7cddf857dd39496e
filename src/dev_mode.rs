/// Development mode utilities for replaying saved chart images
///
/// When the live chart service is unreachable, or a chart that produced bad
/// records needs to be investigated, save the PNGs and run the pipeline
/// against them with `FileChartSource`. Combined with `MemoryDeviceStore`
/// this gives a dry run that never touches the database.

use crate::ingest::chart::ChartSource;
use crate::model::{DeviceDataRow, FeedKind, FetchError};
use std::fs;
use std::path::PathBuf;

/// Serves chart bytes from local files instead of the chart service.
pub struct FileChartSource {
    pub level_image: PathBuf,
    pub rain_image: PathBuf,
}

impl FileChartSource {
    pub fn new(level_image: impl Into<PathBuf>, rain_image: impl Into<PathBuf>) -> Self {
        Self {
            level_image: level_image.into(),
            rain_image: rain_image.into(),
        }
    }

    fn path(&self, kind: FeedKind) -> &PathBuf {
        match kind {
            FeedKind::Level => &self.level_image,
            FeedKind::Rain => &self.rain_image,
        }
    }
}

impl ChartSource for FileChartSource {
    fn fetch(&self, kind: FeedKind) -> Result<Vec<u8>, FetchError> {
        let path = self.path(kind);
        fs::read(path).map_err(|source| FetchError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn location(&self, kind: FeedKind) -> String {
        self.path(kind).display().to_string()
    }
}

/// Render rows as a fixed-width table for dry-run output.
pub fn format_rows(rows: &[DeviceDataRow]) -> String {
    fn cell(v: Option<rust_decimal::Decimal>) -> String {
        v.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
    }

    let mut out = format!(
        "{:<20} {:>10} {:>12} {:>10} {:>10}\n",
        "dttime", "a1", "a2", "a3", "a4"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<20} {:>10} {:>12} {:>10} {:>10}\n",
            row.dttime.format("%Y-%m-%d %H:%M:%S").to_string(),
            cell(row.a1),
            cell(row.a2),
            cell(row.a3),
            cell(row.a4)
        ));
    }
    out
}
