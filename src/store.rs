/// Device-data storage abstraction.
///
/// The device-data table is keyed by `dttime` and carries two independently
/// owned slot pairs. A backend must upsert one record per statement
/// (insert, or update only the batch's pair on key conflict) and apply a
/// whole batch atomically: either every record lands or none does.

use crate::model::{DeviceDataRow, SlotPair, SlotWrite, StoreError, UpsertOutcome};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};

pub trait DeviceStore {
    /// Upsert `writes` into `pair`, in order, as one atomic batch.
    ///
    /// Returns one outcome per write. On error nothing from the batch is
    /// visible.
    fn upsert_slots(&mut self, pair: SlotPair, writes: &[SlotWrite]) -> Result<Vec<UpsertOutcome>, StoreError>;

    /// The stored row for `dttime`, if any.
    fn row(&mut self, dttime: NaiveDateTime) -> Result<Option<DeviceDataRow>, StoreError>;
}

/// Applies one write to a row map and reports what happened.
fn apply_write(
    rows: &mut BTreeMap<NaiveDateTime, DeviceDataRow>,
    pair: SlotPair,
    write: &SlotWrite,
) -> UpsertOutcome {
    match rows.get_mut(&write.dttime) {
        None => {
            let mut row = DeviceDataRow::empty(write.dttime);
            row.set_slots(pair, write.values);
            rows.insert(write.dttime, row);
            UpsertOutcome::Inserted
        }
        Some(row) => {
            if row.slots(pair) == write.values.map(Some) {
                UpsertOutcome::Unchanged
            } else {
                row.set_slots(pair, write.values);
                UpsertOutcome::Updated
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Device-data rows held in memory. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDeviceStore {
    rows: BTreeMap<NaiveDateTime, DeviceDataRow>,
    rejected: HashSet<NaiveDateTime>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any batch containing a write for `dttime` fail, as a database
    /// constraint violation would.
    pub fn reject_writes_at(&mut self, dttime: NaiveDateTime) {
        self.rejected.insert(dttime);
    }

    /// All rows in ascending time order.
    pub fn rows(&self) -> Vec<DeviceDataRow> {
        self.rows.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn upsert_slots(&mut self, pair: SlotPair, writes: &[SlotWrite]) -> Result<Vec<UpsertOutcome>, StoreError> {
        // Stage on a copy so a failing write leaves the committed rows as they were.
        let mut staged = self.rows.clone();
        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            if self.rejected.contains(&write.dttime) {
                return Err(StoreError::Backend(format!(
                    "write for {} into ({}) rejected",
                    write.dttime, pair
                )));
            }
            outcomes.push(apply_write(&mut staged, pair, write));
        }
        self.rows = staged;
        Ok(outcomes)
    }

    fn row(&mut self, dttime: NaiveDateTime) -> Result<Option<DeviceDataRow>, StoreError> {
        Ok(self.rows.get(&dttime).cloned())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
