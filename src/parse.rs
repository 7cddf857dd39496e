/// OCR text → typed hourly records.
///
/// The chart tables OCR into one line per row, tokens separated by spaces:
///
///   level feed:  `06-1508:00 12.34`          (time, water level)
///   rain feed:   `06-1508:00 1.5 23.0`       (time, hourly, cumulative)
///
/// The time token is the chart's `MM-DD HH:MM` label with the separating
/// space lost in recognition. Charts carry no year; the caller supplies it.
///
/// Bad lines never abort a batch. Each one is logged with its content and
/// returned in `ParseOutcome::skipped`; the remaining lines still produce
/// records.

use crate::capacity::{CapacityTable, VolumeLookup, lookup_volume};
use crate::config::StationConfig;
use crate::logging::{self, DataSource};
use crate::model::{CapacityError, FeedKind, LevelRecord, RainRecord, RawReading};
use chrono::{NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Length of the compact `MM-DDHH:MM` time token.
pub const COMPACT_TIME_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Parse results
// ---------------------------------------------------------------------------

/// Why a line was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TokenCount { expected: usize, found: usize },
    TimeFormat(String),
    Number { field: &'static str, text: String },
    OutOfRange(Decimal),
    Volume(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TokenCount { expected, found } => {
                write!(f, "expected {} tokens, found {}", expected, found)
            }
            SkipReason::TimeFormat(token) => write!(f, "unparseable time '{}'", token),
            SkipReason::Number { field, text } => write!(f, "unparseable {} '{}'", field, text),
            SkipReason::OutOfRange(level) => write!(f, "water level {} outside plausible range", level),
            SkipReason::Volume(msg) => write!(f, "volume lookup failed: {}", msg),
        }
    }
}

/// A dropped OCR line, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_no: usize,
    pub content: String,
    pub reason: SkipReason,
}

/// Accepted records in ascending time order, plus every dropped line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome<R> {
    pub records: Vec<R>,
    pub skipped: Vec<SkippedLine>,
}

impl<R> Default for ParseOutcome<R> {
    fn default() -> Self {
        Self { records: Vec::new(), skipped: Vec::new() }
    }
}

impl<R> ParseOutcome<R> {
    fn skip(&mut self, feed: FeedKind, site: &str, raw: &RawReading, reason: SkipReason) {
        let content = raw_line(raw);
        logging::warn(
            DataSource::from(feed),
            Some(site),
            &format!("Skipping line {} '{}': {}", raw.line_no, content, reason),
        );
        self.skipped.push(SkippedLine { line_no: raw.line_no, content, reason });
    }
}

// ---------------------------------------------------------------------------
// Tokenizing
// ---------------------------------------------------------------------------

/// Split OCR text into tokenized lines, dropping blank ones.
///
/// Line numbers count from 1 after trimming the whole text, so they match
/// what a person sees when reading the OCR output.
pub fn tokenize(text: &str) -> Vec<RawReading> {
    text.trim()
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let mut tokens = line.split_whitespace().map(str::to_string);
            let first = tokens.next()?;
            Some(RawReading {
                line_no: i + 1,
                timestamp_text: first,
                value_fields: tokens.collect(),
            })
        })
        .collect()
}

fn raw_line(raw: &RawReading) -> String {
    std::iter::once(raw.timestamp_text.as_str())
        .chain(raw.value_fields.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn check_token_count(raw: &RawReading, feed: FeedKind) -> Result<(), SkipReason> {
    let expected = feed.tokens_per_line();
    let found = raw.value_fields.len() + 1;
    if found == expected {
        Ok(())
    } else {
        Err(SkipReason::TokenCount { expected, found })
    }
}

// ---------------------------------------------------------------------------
// Field parsing
// ---------------------------------------------------------------------------

/// Rebuild a compact `MM-DDHH:MM` token as an hour-resolution timestamp in
/// `year`. Minutes are validated and then truncated: readings are hourly
/// buckets.
pub fn parse_compact_time(token: &str, year: i32) -> Result<NaiveDateTime, SkipReason> {
    let bad = || SkipReason::TimeFormat(token.to_string());

    let bytes = token.as_bytes();
    if bytes.len() != COMPACT_TIME_LEN || !token.is_ascii() {
        return Err(bad());
    }
    if bytes[2] != b'-' || bytes[7] != b':' {
        return Err(bad());
    }
    let digits_ok = [0, 1, 3, 4, 5, 6, 8, 9].iter().all(|&i| bytes[i].is_ascii_digit());
    if !digits_ok {
        return Err(bad());
    }

    let minutes: u32 = token[8..10].parse().map_err(|_| bad())?;
    if minutes > 59 {
        return Err(bad());
    }

    let full = format!("{}-{} {}:00", year, &token[..5], &token[5..7]);
    let time = NaiveDateTime::parse_from_str(&full, "%Y-%m-%d %H:%M").map_err(|_| bad())?;
    debug_assert_eq!(time.minute(), 0);
    Ok(time)
}

/// Numbers may only use characters the OCR whitelist can produce.
fn parse_decimal(field: &'static str, text: &str) -> Result<Decimal, SkipReason> {
    let bad = || SkipReason::Number { field, text: text.to_string() };
    let charset_ok = text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-');
    if !charset_ok || !text.chars().any(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    Decimal::from_str(text).map_err(|_| bad())
}

fn log_empty(feed: FeedKind, site: &str, text: &str) -> bool {
    if text.trim().is_empty() {
        logging::info(DataSource::from(feed), Some(site), "OCR result empty");
        true
    } else {
        false
    }
}

// ---------------------------------------------------------------------------
// Level variant
// ---------------------------------------------------------------------------

/// Parse the level feed's OCR text and resolve each level into a volume.
///
/// Lines are rejected individually for a wrong token count, a malformed time
/// or number, a level outside `station`'s exclusive bounds, or a volume that
/// cannot be resolved. A capacity table failure costs only the line whose
/// lookup hit it.
pub fn parse_level_text(
    text: &str,
    year: i32,
    station: &StationConfig,
    capacity: &mut dyn CapacityTable,
) -> ParseOutcome<LevelRecord> {
    let feed = FeedKind::Level;
    let site = station.name.as_str();
    let mut outcome = ParseOutcome::default();
    if log_empty(feed, site, text) {
        return outcome;
    }

    for raw in tokenize(text) {
        let parsed = check_token_count(&raw, feed)
            .and_then(|_| parse_compact_time(&raw.timestamp_text, year))
            .and_then(|time| Ok((time, parse_decimal("water level", &raw.value_fields[0])?)))
            .and_then(|(time, level)| {
                if station.level_is_plausible(level) {
                    Ok((time, level))
                } else {
                    Err(SkipReason::OutOfRange(level))
                }
            });

        let (time, water_level) = match parsed {
            Ok(v) => v,
            Err(reason) => {
                outcome.skip(feed, site, &raw, reason);
                continue;
            }
        };

        let water_volume = match lookup_volume(capacity, site, water_level) {
            Ok(VolumeLookup::Found(volume)) => volume,
            Ok(VolumeLookup::Missing { integer_level }) => {
                logging::info(
                    DataSource::Capacity,
                    Some(site),
                    &format!(
                        "No capacity row for level {} (integer level {}), volume recorded as 0",
                        water_level, integer_level
                    ),
                );
                Decimal::ZERO
            }
            Err(e @ CapacityError::Fraction(_)) => {
                outcome.skip(feed, site, &raw, SkipReason::Volume(e.to_string()));
                continue;
            }
            Err(e @ CapacityError::Store(_)) => {
                logging::error(
                    DataSource::Capacity,
                    Some(site),
                    &format!("Capacity lookup for level {} failed: {}", water_level, e),
                );
                outcome.skip(feed, site, &raw, SkipReason::Volume(e.to_string()));
                continue;
            }
        };

        logging::debug(
            DataSource::LevelFeed,
            Some(site),
            &format!("Parsed {}: level {} m, volume {}", time, water_level, water_volume),
        );
        outcome.records.push(LevelRecord { time, water_level, water_volume });
    }

    outcome.records.sort_by_key(|r| r.time);
    outcome
}

// ---------------------------------------------------------------------------
// Rain variant
// ---------------------------------------------------------------------------

/// Parse the rain feed's OCR text. No bound applies to rainfall values.
///
/// Records come back in ascending time order, the same as the level variant;
/// the sort is stable, so repeated timestamps keep their chart order.
pub fn parse_rain_text(text: &str, year: i32, site: &str) -> ParseOutcome<RainRecord> {
    let feed = FeedKind::Rain;
    let mut outcome = ParseOutcome::default();
    if log_empty(feed, site, text) {
        return outcome;
    }

    for raw in tokenize(text) {
        let parsed = check_token_count(&raw, feed).and_then(|_| {
            let time = parse_compact_time(&raw.timestamp_text, year)?;
            let hourly = parse_decimal("rainfall", &raw.value_fields[0])?;
            let cumulative = parse_decimal("cumulative rainfall", &raw.value_fields[1])?;
            Ok(RainRecord {
                time,
                hourly_rainfall: hourly,
                cumulative_rainfall: cumulative,
            })
        });

        match parsed {
            Ok(record) => {
                logging::debug(
                    DataSource::RainFeed,
                    Some(site),
                    &format!(
                        "Parsed {}: rainfall {} mm, cumulative {} mm",
                        record.time, record.hourly_rainfall, record.cumulative_rainfall
                    ),
                );
                outcome.records.push(record);
            }
            Err(reason) => outcome.skip(feed, site, &raw, reason),
        }
    }

    outcome.records.sort_by_key(|r| r.time);
    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::{CapacityRow, MemoryCapacityTable};
    use crate::model::StoreError;
    use chrono::NaiveDate;

    const YEAR: i32 = 2026;

    fn at(month: u32, day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(YEAR, month, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn station() -> StationConfig {
        StationConfig { name: "test reservoir".to_string(), ..StationConfig::default() }
    }

    /// Row for integer level 12: F<n> = 100 + n, l<n> = n / 100.
    fn table() -> MemoryCapacityTable {
        let mut table = MemoryCapacityTable::default();
        table.insert(CapacityRow {
            station_name: "test reservoir".to_string(),
            integer_level: 12,
            tenths: std::array::from_fn(|n| Decimal::new(100 + n as i64, 0)),
            hundredths: std::array::from_fn(|n| Decimal::new(n as i64, 2)),
        });
        table
    }

    struct BrokenTable;

    impl CapacityTable for BrokenTable {
        fn row(&mut self, _station: &str, _integer_level: i64) -> Result<Option<CapacityRow>, StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }
    }

    // --- Time reconstruction -------------------------------------------------

    #[test]
    fn test_compact_time_rebuilds_hour_bucket() {
        assert_eq!(parse_compact_time("06-1508:00", YEAR).unwrap(), at(6, 15, 8));
    }

    #[test]
    fn test_compact_time_truncates_minutes() {
        assert_eq!(parse_compact_time("06-1508:45", YEAR).unwrap(), at(6, 15, 8));
    }

    #[test]
    fn test_compact_time_rejects_malformed_tokens() {
        for token in ["06-15 08:00", "06-158:00", "0615-08:00", "13-0108:00", "06-1525:00", "06-1508:75", "O6-1508:00", ""] {
            assert!(
                parse_compact_time(token, YEAR).is_err(),
                "'{token}' should not parse as a compact time"
            );
        }
    }

    #[test]
    fn test_compact_time_respects_leap_years() {
        assert!(parse_compact_time("02-2908:00", 2028).is_ok());
        assert!(parse_compact_time("02-2908:00", 2026).is_err());
    }

    // --- Tokenizing ---------------------------------------------------------

    #[test]
    fn test_tokenize_drops_blank_lines_and_numbers_from_one() {
        let raws = tokenize("\n\n06-1508:00 12.34\n   \n06-1509:00  12.35\n");
        assert_eq!(raws.len(), 2);
        assert_eq!(raws[0].line_no, 1);
        assert_eq!(raws[1].line_no, 3);
        assert_eq!(raws[1].timestamp_text, "06-1509:00");
        assert_eq!(raws[1].value_fields, vec!["12.35".to_string()]);
    }

    // --- Level variant ------------------------------------------------------

    #[test]
    fn test_level_line_parses_and_resolves_volume() {
        let out = parse_level_text("06-1508:00 12.34", YEAR, &station(), &mut table());
        assert!(out.skipped.is_empty());
        assert_eq!(
            out.records,
            vec![LevelRecord {
                time: at(6, 15, 8),
                water_level: dec("12.34"),
                water_volume: dec("103.04"),
            }]
        );
    }

    #[test]
    fn test_level_line_with_three_tokens_is_skipped() {
        let out = parse_level_text("06-1508:00 12.34 5.0", YEAR, &station(), &mut table());
        assert!(out.records.is_empty());
        assert_eq!(out.skipped[0].reason, SkipReason::TokenCount { expected: 2, found: 3 });
    }

    #[test]
    fn test_level_bounds_are_exclusive() {
        let text = "06-1508:00 40.00\n06-1509:00 0.00\n06-1510:00 39.99\n06-1511:00 0.01";
        let out = parse_level_text(text, YEAR, &station(), &mut table());
        let levels: Vec<_> = out.records.iter().map(|r| r.water_level).collect();
        assert_eq!(levels, vec![dec("39.99"), dec("0.01")]);
        assert_eq!(out.skipped.len(), 2);
        assert!(matches!(out.skipped[0].reason, SkipReason::OutOfRange(_)));
        assert!(matches!(out.skipped[1].reason, SkipReason::OutOfRange(_)));
    }

    #[test]
    fn test_level_missing_capacity_row_records_zero_volume() {
        let out = parse_level_text("06-1508:00 7.25", YEAR, &station(), &mut table());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].water_volume, Decimal::ZERO);
    }

    #[test]
    fn test_level_records_sorted_ascending() {
        let text = "06-1510:00 12.30\n06-1508:00 12.10\n06-1509:00 12.20";
        let out = parse_level_text(text, YEAR, &station(), &mut table());
        let times: Vec<_> = out.records.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![at(6, 15, 8), at(6, 15, 9), at(6, 15, 10)]);
    }

    #[test]
    fn test_one_malformed_line_among_valid_lines() {
        let text = "06-1508:00 12.10\n06-1509:00 12.2O\n06-1510:00 12.30\n06-1511:00 12.40";
        let out = parse_level_text(text, YEAR, &station(), &mut table());
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].line_no, 2);
        assert_eq!(out.skipped[0].content, "06-1509:00 12.2O");
        assert!(matches!(out.skipped[0].reason, SkipReason::Number { field: "water level", .. }));
    }

    #[test]
    fn test_level_rejects_characters_outside_ocr_charset() {
        let text = "06-1508:00 1_2.5\n06-1509:00 +12.5\n06-1510:00 1e1\n06-1511:00 12.50";
        let out = parse_level_text(text, YEAR, &station(), &mut table());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].water_level, dec("12.50"));
        let rejected: Vec<_> = out.skipped.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(rejected, vec!["06-1508:00 1_2.5", "06-1509:00 +12.5", "06-1510:00 1e1"]);
        assert!(out.skipped.iter().all(|s| matches!(s.reason, SkipReason::Number { .. })));
    }

    #[test]
    fn test_level_empty_text_yields_nothing() {
        let out = parse_level_text("  \n ", YEAR, &station(), &mut table());
        assert_eq!(out, ParseOutcome::default());
    }

    /// Healthy row for integer level 12; the backend fails for every other level.
    struct OneBadBand(MemoryCapacityTable);

    impl CapacityTable for OneBadBand {
        fn row(&mut self, station: &str, integer_level: i64) -> Result<Option<CapacityRow>, StoreError> {
            if integer_level == 12 {
                self.0.row(station, integer_level)
            } else {
                Err(StoreError::Backend("NULL in l7".to_string()))
            }
        }
    }

    #[test]
    fn test_level_capacity_failure_skips_only_that_line() {
        let text = "06-1508:00 12.34\n06-1509:00 12.35\n06-1510:00 13.10";
        let out = parse_level_text(text, YEAR, &station(), &mut OneBadBand(table()));

        let levels: Vec<_> = out.records.iter().map(|r| r.water_level).collect();
        assert_eq!(levels, vec![dec("12.34"), dec("12.35")]);
        assert_eq!(out.records[1].water_volume, dec("103.05"));
        assert_eq!(out.skipped.len(), 1);
        assert_eq!(out.skipped[0].line_no, 3);
        assert!(matches!(&out.skipped[0].reason, SkipReason::Volume(msg) if msg.contains("NULL in l7")));
    }

    #[test]
    fn test_level_capacity_backend_down_skips_every_line() {
        let out = parse_level_text("06-1508:00 12.34\n06-1509:00 12.35", YEAR, &station(), &mut BrokenTable);
        assert!(out.records.is_empty());
        assert_eq!(out.skipped.len(), 2);
        assert!(out.skipped.iter().all(|s| matches!(s.reason, SkipReason::Volume(_))));
    }

    #[test]
    fn test_level_store_not_queried_for_rejected_lines() {
        // Out-of-range and malformed lines must be rejected before lookup.
        let text = "06-1508:00 45.00\nbad line\n06-1509:00 abc";
        let out = parse_level_text(text, YEAR, &station(), &mut BrokenTable);
        assert!(out.records.is_empty());
        assert_eq!(out.skipped.len(), 3);
    }

    // --- Rain variant -------------------------------------------------------

    #[test]
    fn test_rain_line_parses_without_bounds() {
        let out = parse_rain_text("06-1508:00 1.5 23.0\n06-1509:00 0.0 23.0", YEAR, "test");
        assert!(out.skipped.is_empty());
        assert_eq!(
            out.records[0],
            RainRecord {
                time: at(6, 15, 8),
                hourly_rainfall: dec("1.5"),
                cumulative_rainfall: dec("23.0"),
            }
        );
        assert_eq!(out.records[1].hourly_rainfall, Decimal::ZERO);
    }

    #[test]
    fn test_rain_line_with_two_tokens_is_skipped() {
        let out = parse_rain_text("06-1508:00 1.5", YEAR, "test");
        assert!(out.records.is_empty());
        assert_eq!(out.skipped[0].reason, SkipReason::TokenCount { expected: 3, found: 2 });
    }

    #[test]
    fn test_rain_bad_cumulative_value_is_skipped() {
        let out = parse_rain_text("06-1508:00 1.5 2..3\n06-1509:00 0.5 24.0", YEAR, "test");
        assert_eq!(out.records.len(), 1);
        assert_eq!(
            out.skipped[0].reason,
            SkipReason::Number { field: "cumulative rainfall", text: "2..3".to_string() }
        );
    }

    #[test]
    fn test_rain_records_sorted_ascending() {
        let out = parse_rain_text("06-1509:00 0.5 24.0\n06-1508:00 1.5 23.5", YEAR, "test");
        let times: Vec<_> = out.records.iter().map(|r| r.time).collect();
        assert_eq!(times, vec![at(6, 15, 8), at(6, 15, 9)]);
    }
}
