/// Reservoir chart ingest service.
///
/// Scrapes the hourly water-level and rainfall chart images published for a
/// reservoir, reads them with OCR, resolves storage volumes from the
/// reservoir's capacity table and merges the readings into the shared
/// device-data table without duplicating rows or clobbering the other feed's
/// columns.

pub mod capacity;
pub mod config;
pub mod db;
pub mod dev_mode;
pub mod feeds;
pub mod imaging;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod ocr;
pub mod parse;
pub mod pipeline;
pub mod store;
pub mod verify;
pub mod writer;
