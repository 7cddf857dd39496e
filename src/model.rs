/// Core data types for the reservoir chart ingest service.
///
/// This module defines the shared domain model imported by all other modules:
/// the transient records produced from one OCR pass, the persisted device-data
/// row they are merged into, and the error taxonomy of the pipeline.
/// It contains no logic beyond small accessors and no I/O.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Feed kinds and storage slots
// ---------------------------------------------------------------------------

/// The two chart feeds published by the hydrological service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Reservoir water level, one reading per hour.
    Level,
    /// Hourly and cumulative rainfall, one reading per hour.
    Rain,
}

impl FeedKind {
    /// Number of whitespace-separated tokens one chart row produces.
    pub fn tokens_per_line(self) -> usize {
        match self {
            FeedKind::Level => 2,
            FeedKind::Rain => 3,
        }
    }

    /// The slot pair this feed owns in the shared device-data row.
    pub fn slot_pair(self) -> SlotPair {
        match self {
            FeedKind::Level => SlotPair::Level,
            FeedKind::Rain => SlotPair::Rain,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKind::Level => write!(f, "level"),
            FeedKind::Rain => write!(f, "rain"),
        }
    }
}

/// A named pair of value columns in `DeviceDataRow` owned by one record kind.
///
/// Level batches write `a1, a2` (water level, storage volume); rain batches
/// write `a3, a4` (hourly rainfall, cumulative rainfall). A batch never
/// touches the other pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotPair {
    Level,
    Rain,
}

impl SlotPair {
    /// Column names of the pair, in write order.
    pub fn columns(self) -> [&'static str; 2] {
        match self {
            SlotPair::Level => ["a1", "a2"],
            SlotPair::Rain => ["a3", "a4"],
        }
    }
}

impl fmt::Display for SlotPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [first, second] = self.columns();
        write!(f, "{first},{second}")
    }
}

// ---------------------------------------------------------------------------
// Transient records
// ---------------------------------------------------------------------------

/// One OCR text line split into whitespace-delimited tokens, before any
/// validation. `line_no` is 1-based within the OCR text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    pub line_no: usize,
    pub timestamp_text: String,
    pub value_fields: Vec<String>,
}

/// An hourly reservoir water-level reading enriched with its storage volume.
///
/// `water_level` is strictly between the station's plausibility bounds;
/// `water_volume` is always derived from the capacity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelRecord {
    pub time: NaiveDateTime,
    pub water_level: Decimal,   // metres
    pub water_volume: Decimal,  // 10^4 m^3, as stored in the capacity table
}

/// An hourly rainfall reading. No plausibility bound applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RainRecord {
    pub time: NaiveDateTime,
    pub hourly_rainfall: Decimal,      // mm
    pub cumulative_rainfall: Decimal,  // mm
}

/// The values one record contributes to its slot pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotWrite {
    pub dttime: NaiveDateTime,
    pub values: [Decimal; 2],
}

/// A record that can be merged into the shared device-data row.
pub trait SlotRecord {
    const PAIR: SlotPair;

    fn slot_write(&self) -> SlotWrite;
}

impl SlotRecord for LevelRecord {
    const PAIR: SlotPair = SlotPair::Level;

    fn slot_write(&self) -> SlotWrite {
        SlotWrite {
            dttime: self.time,
            values: [self.water_level, self.water_volume],
        }
    }
}

impl SlotRecord for RainRecord {
    const PAIR: SlotPair = SlotPair::Rain;

    fn slot_write(&self) -> SlotWrite {
        SlotWrite {
            dttime: self.time,
            values: [self.hourly_rainfall, self.cumulative_rainfall],
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

/// One row of the time-indexed device-data table, keyed by `dttime`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDataRow {
    pub dttime: NaiveDateTime,
    pub a1: Option<Decimal>,
    pub a2: Option<Decimal>,
    pub a3: Option<Decimal>,
    pub a4: Option<Decimal>,
}

impl DeviceDataRow {
    /// An empty row for `dttime` with every slot unset.
    pub fn empty(dttime: NaiveDateTime) -> Self {
        Self { dttime, a1: None, a2: None, a3: None, a4: None }
    }

    /// Current values of one slot pair.
    pub fn slots(&self, pair: SlotPair) -> [Option<Decimal>; 2] {
        match pair {
            SlotPair::Level => [self.a1, self.a2],
            SlotPair::Rain => [self.a3, self.a4],
        }
    }

    /// Overwrites one slot pair, leaving the other untouched.
    pub fn set_slots(&mut self, pair: SlotPair, values: [Decimal; 2]) {
        match pair {
            SlotPair::Level => {
                self.a1 = Some(values[0]);
                self.a2 = Some(values[1]);
            }
            SlotPair::Rain => {
                self.a3 = Some(values[0]);
                self.a4 = Some(values[1]);
            }
        }
    }
}

/// The result of upserting a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for the timestamp.
    Inserted,
    /// The row existed and the slot pair changed.
    Updated,
    /// The row already held identical values for the slot pair.
    Unchanged,
}

/// Per-record outcomes of one reconciliation batch, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub outcomes: Vec<(NaiveDateTime, UpsertOutcome)>,
}

impl WriteReport {
    pub fn inserted(&self) -> usize {
        self.count(UpsertOutcome::Inserted)
    }

    pub fn updated(&self) -> usize {
        self.count(UpsertOutcome::Updated)
    }

    pub fn unchanged(&self) -> usize {
        self.count(UpsertOutcome::Unchanged)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    fn count(&self, outcome: UpsertOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure to obtain chart bytes. Non-fatal: the cycle writes nothing.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx HTTP response from the chart service.
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    /// Connection, TLS, timeout or body-read failure.
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// A local chart file could not be read (replay mode).
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Corrupt, undecodable or empty chart image. Non-fatal.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Decode error: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Empty image: {width}x{height}")]
    Empty { width: u32, height: u32 },
}

/// Failure inside the OCR capability. Never escapes the text extractor,
/// which turns it into an empty result.
#[derive(Debug, Error)]
pub enum OcrError {
    /// The service was built without an OCR engine.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR initialization failed: {0}")]
    Init(String),
    #[error("OCR recognition failed: {0}")]
    Recognition(String),
    #[error("OCR timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure while resolving a water level into a storage volume.
#[derive(Debug, Error)]
pub enum CapacityError {
    /// The fractional part of the level did not decompose into two digits.
    #[error("Cannot decompose fractional part of level {0} into two digits")]
    Fraction(Decimal),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of the storage backend. Fatal for the batch being written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("Required table '{0}' is missing")]
    MissingTable(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("{0} must be set")]
    MissingEnv(&'static str),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 6, 15)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_slot_pairs_use_disjoint_columns() {
        let level = SlotPair::Level.columns();
        let rain = SlotPair::Rain.columns();
        for column in level {
            assert!(!rain.contains(&column), "column {column} is owned by both pairs");
        }
    }

    #[test]
    fn test_feed_kind_token_counts() {
        assert_eq!(FeedKind::Level.tokens_per_line(), 2);
        assert_eq!(FeedKind::Rain.tokens_per_line(), 3);
        assert_eq!(FeedKind::Level.slot_pair(), SlotPair::Level);
        assert_eq!(FeedKind::Rain.slot_pair(), SlotPair::Rain);
    }

    #[test]
    fn test_set_slots_leaves_other_pair_untouched() {
        let mut row = DeviceDataRow::empty(at(8));
        row.set_slots(SlotPair::Rain, [Decimal::new(15, 1), Decimal::new(230, 1)]);
        row.set_slots(SlotPair::Level, [Decimal::new(1234, 2), Decimal::new(5678, 2)]);

        assert_eq!(row.slots(SlotPair::Rain), [Some(Decimal::new(15, 1)), Some(Decimal::new(230, 1))]);
        assert_eq!(row.slots(SlotPair::Level), [Some(Decimal::new(1234, 2)), Some(Decimal::new(5678, 2))]);
    }

    #[test]
    fn test_records_map_to_their_own_slot_pair() {
        let level = LevelRecord {
            time: at(8),
            water_level: Decimal::new(1234, 2),
            water_volume: Decimal::new(100, 0),
        };
        let rain = RainRecord {
            time: at(8),
            hourly_rainfall: Decimal::new(15, 1),
            cumulative_rainfall: Decimal::new(230, 1),
        };

        assert_eq!(<LevelRecord as SlotRecord>::PAIR, SlotPair::Level);
        assert_eq!(<RainRecord as SlotRecord>::PAIR, SlotPair::Rain);
        assert_eq!(level.slot_write().values, [Decimal::new(1234, 2), Decimal::new(100, 0)]);
        assert_eq!(rain.slot_write().values, [Decimal::new(15, 1), Decimal::new(230, 1)]);
    }

    #[test]
    fn test_write_report_counts_outcomes() {
        let report = WriteReport {
            outcomes: vec![
                (at(1), UpsertOutcome::Inserted),
                (at(2), UpsertOutcome::Inserted),
                (at(3), UpsertOutcome::Updated),
                (at(4), UpsertOutcome::Unchanged),
            ],
        };
        assert_eq!(report.len(), 4);
        assert_eq!(report.inserted(), 2);
        assert_eq!(report.updated(), 1);
        assert_eq!(report.unchanged(), 1);
    }

    #[test]
    fn test_error_messages_carry_context() {
        assert_eq!(FetchError::HttpStatus(404).to_string(), "HTTP error: 404");
        assert_eq!(
            ImageError::Empty { width: 0, height: 12 }.to_string(),
            "Empty image: 0x12"
        );
    }
}
