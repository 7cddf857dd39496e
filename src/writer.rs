/// Reconciliation of parsed records into the device-data table.
///
/// One batch targets exactly one slot pair, chosen by the record type. Rows
/// are upserted in the order given, so for repeated timestamps the last
/// record wins.

use crate::logging::{self, DataSource};
use crate::model::{SlotRecord, SlotWrite, StoreError, UpsertOutcome, WriteReport};
use crate::store::DeviceStore;

/// Write `records` into their slot pair as one atomic batch.
///
/// A failed batch is logged and returned as an error with nothing applied.
pub fn reconcile<R: SlotRecord>(
    store: &mut dyn DeviceStore,
    site: &str,
    records: &[R],
) -> Result<WriteReport, StoreError> {
    let source = DataSource::Database;
    if records.is_empty() {
        return Ok(WriteReport::default());
    }

    let writes: Vec<SlotWrite> = records.iter().map(SlotRecord::slot_write).collect();
    let outcomes = store.upsert_slots(R::PAIR, &writes).inspect_err(|e| {
        logging::error(
            source,
            Some(site),
            &format!(
                "Write of {} records into ({}) rolled back: {}",
                writes.len(),
                R::PAIR,
                e
            ),
        );
    })?;

    if outcomes.len() != writes.len() {
        return Err(StoreError::Backend(format!(
            "store reported {} outcomes for {} writes",
            outcomes.len(),
            writes.len()
        )));
    }

    for (write, outcome) in writes.iter().zip(&outcomes) {
        if *outcome == UpsertOutcome::Unchanged {
            logging::debug(
                source,
                Some(site),
                &format!("{} ({}) already up to date, skipped", write.dttime, R::PAIR),
            );
        }
    }

    Ok(WriteReport {
        outcomes: writes.iter().map(|w| w.dttime).zip(outcomes).collect(),
    })
}
