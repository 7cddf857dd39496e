/// Level → storage volume resolution.
///
/// The capacity table holds one row per (station, whole metre). Each row has
/// ten tenth-of-metre band values `F0..F9` and ten hundredths corrections
/// `l0..l9`. A level `N.d1d2` resolves to
///
///   F{d1}               when d2 == 0
///   F{d1} + l{d2}       otherwise
///
/// taken from the row for `N`. Columns are addressed by digit index, never
/// by building column names.

use crate::logging::{self, DataSource};
use crate::model::{CapacityError, StoreError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Reference data
// ---------------------------------------------------------------------------

/// One capacity-table row (`iot_capacity`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapacityRow {
    pub station_name: String,
    /// Whole-metre level this row covers (`sw`).
    pub integer_level: i64,
    /// Band values `F0..F9`.
    pub tenths: [Decimal; 10],
    /// Hundredths corrections `l0..l9`.
    pub hundredths: [Decimal; 10],
}

impl CapacityRow {
    /// Volume for the given tenths and hundredths digits.
    pub fn volume(&self, d1: usize, d2: usize) -> Decimal {
        if d2 == 0 {
            self.tenths[d1]
        } else {
            self.tenths[d1] + self.hundredths[d2]
        }
    }
}

/// Read-only access to capacity rows.
pub trait CapacityTable {
    /// The row for `(station, integer_level)`, or `None` when the table has
    /// no data for that level.
    fn row(&mut self, station: &str, integer_level: i64) -> Result<Option<CapacityRow>, StoreError>;
}

/// Capacity rows held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapacityTable {
    rows: HashMap<(String, i64), CapacityRow>,
}

impl MemoryCapacityTable {
    /// Adds or replaces a row.
    pub fn insert(&mut self, row: CapacityRow) {
        self.rows.insert((row.station_name.clone(), row.integer_level), row);
    }
}

impl CapacityTable for MemoryCapacityTable {
    fn row(&mut self, station: &str, integer_level: i64) -> Result<Option<CapacityRow>, StoreError> {
        Ok(self.rows.get(&(station.to_string(), integer_level)).cloned())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// A water level split into its table coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDigits {
    pub integer_level: i64,
    /// Tenths digit, 0..=9.
    pub d1: usize,
    /// Hundredths digit, 0..=9.
    pub d2: usize,
}

/// Outcome of a capacity lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLookup {
    Found(Decimal),
    /// No row for the level's whole-metre part. Not the same as a zero
    /// capacity, although `resolve_volume` records it as zero.
    Missing { integer_level: i64 },
}

impl VolumeLookup {
    pub fn volume_or_zero(self) -> Decimal {
        match self {
            VolumeLookup::Found(v) => v,
            VolumeLookup::Missing { .. } => Decimal::ZERO,
        }
    }
}

/// Split a level into floor, tenths and hundredths.
///
/// The fractional part is rounded half-to-even to two places. A fraction
/// that rounds up to a whole metre (e.g. `12.996`) cannot be addressed in
/// the row for the floor and is reported as `CapacityError::Fraction`.
pub fn decompose(level: Decimal) -> Result<LevelDigits, CapacityError> {
    let floor = level.floor();
    let fraction = (level - floor).round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
    if fraction >= Decimal::ONE {
        return Err(CapacityError::Fraction(level));
    }

    let integer_level = floor.to_i64().ok_or(CapacityError::Fraction(level))?;
    let hundredths = (fraction * Decimal::ONE_HUNDRED)
        .to_u32()
        .ok_or(CapacityError::Fraction(level))? as usize;

    Ok(LevelDigits {
        integer_level,
        d1: hundredths / 10,
        d2: hundredths % 10,
    })
}

/// Look up the volume for `level`, keeping a missing row distinguishable
/// from a real value.
pub fn lookup_volume(
    table: &mut dyn CapacityTable,
    station: &str,
    level: Decimal,
) -> Result<VolumeLookup, CapacityError> {
    let digits = decompose(level)?;
    match table.row(station, digits.integer_level)? {
        Some(row) => Ok(VolumeLookup::Found(row.volume(digits.d1, digits.d2))),
        None => Ok(VolumeLookup::Missing { integer_level: digits.integer_level }),
    }
}

/// Volume for `level`, with a missing row recorded as exactly zero.
pub fn resolve_volume(
    table: &mut dyn CapacityTable,
    station: &str,
    level: Decimal,
) -> Result<Decimal, CapacityError> {
    let lookup = lookup_volume(table, station, level)?;
    if let VolumeLookup::Missing { integer_level } = lookup {
        logging::info(
            DataSource::Capacity,
            Some(station),
            &format!("No capacity row for integer level {}, level {} resolves to 0", integer_level, level),
        );
    }
    Ok(lookup.volume_or_zero())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
