/// Postgres access for the capacity table and the device-data table.
///
/// Connection settings come from `DATABASE_URL` (a `.env` file in the
/// working directory is honored). The expected schema ships in
/// `sql/001_reservoir_schema.sql`.

use crate::capacity::{CapacityRow, CapacityTable};
use crate::model::{ConfigError, DeviceDataRow, SlotPair, SlotWrite, StoreError, UpsertOutcome};
use crate::store::DeviceStore;
use chrono::NaiveDateTime;
use postgres::{Client, NoTls, Row};
use rust_decimal::Decimal;
use std::env;

/// Tables this service reads or writes.
pub const REQUIRED_TABLES: &[&str] = &["iot_capacity", "iot_device_data_f001"];

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

pub fn connect(url: &str) -> Result<Client, StoreError> {
    Ok(Client::connect(url, NoTls)?)
}

/// Connects using `DATABASE_URL`.
pub fn connect_from_env() -> Result<Client, StoreError> {
    dotenv::dotenv().ok();
    let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;
    connect(&url)
}

/// Fails with `StoreError::MissingTable` naming the first absent table.
pub fn verify_schema(client: &mut Client) -> Result<(), StoreError> {
    for table in REQUIRED_TABLES {
        let exists: bool = client
            .query_one(
                "SELECT EXISTS (
                     SELECT 1 FROM information_schema.tables
                     WHERE table_schema = current_schema() AND table_name = $1
                 )",
                &[table],
            )?
            .get(0);
        if !exists {
            return Err(StoreError::MissingTable(table.to_string()));
        }
    }
    Ok(())
}

/// `connect_from_env` followed by `verify_schema`.
pub fn connect_and_verify() -> Result<Client, StoreError> {
    let mut client = connect_from_env()?;
    verify_schema(&mut client)?;
    Ok(client)
}

// ---------------------------------------------------------------------------
// Capacity table
// ---------------------------------------------------------------------------

const CAPACITY_QUERY: &str = "
    SELECT f0, f1, f2, f3, f4, f5, f6, f7, f8, f9,
           l0, l1, l2, l3, l4, l5, l6, l7, l8, l9
    FROM iot_capacity
    WHERE station_name = $1 AND sw = $2";

pub struct PgCapacityTable {
    client: Client,
}

impl PgCapacityTable {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl CapacityTable for PgCapacityTable {
    fn row(&mut self, station: &str, integer_level: i64) -> Result<Option<CapacityRow>, StoreError> {
        // `sw` is INTEGER; a level outside its range cannot have a row.
        let Ok(sw) = i32::try_from(integer_level) else {
            return Ok(None);
        };
        let Some(row) = self.client.query_opt(CAPACITY_QUERY, &[&station, &sw])? else {
            return Ok(None);
        };

        let mut values = [Decimal::ZERO; 20];
        for (i, value) in values.iter_mut().enumerate() {
            *value = row.try_get(i)?;
        }
        let mut tenths = [Decimal::ZERO; 10];
        let mut hundredths = [Decimal::ZERO; 10];
        tenths.copy_from_slice(&values[..10]);
        hundredths.copy_from_slice(&values[10..]);

        Ok(Some(CapacityRow {
            station_name: station.to_string(),
            integer_level,
            tenths,
            hundredths,
        }))
    }
}

// ---------------------------------------------------------------------------
// Device-data table
// ---------------------------------------------------------------------------

/// Upsert for one slot pair. The `WHERE` turns an identical rewrite into a
/// no-op that returns no row; `xmax = 0` holds only for a fresh insert.
pub fn upsert_sql(pair: SlotPair) -> &'static str {
    match pair {
        SlotPair::Level => {
            "INSERT INTO iot_device_data_f001 (dttime, a1, a2) VALUES ($1, $2, $3)
             ON CONFLICT (dttime) DO UPDATE SET a1 = EXCLUDED.a1, a2 = EXCLUDED.a2
             WHERE (iot_device_data_f001.a1, iot_device_data_f001.a2)
                   IS DISTINCT FROM (EXCLUDED.a1, EXCLUDED.a2)
             RETURNING (xmax = 0) AS inserted"
        }
        SlotPair::Rain => {
            "INSERT INTO iot_device_data_f001 (dttime, a3, a4) VALUES ($1, $2, $3)
             ON CONFLICT (dttime) DO UPDATE SET a3 = EXCLUDED.a3, a4 = EXCLUDED.a4
             WHERE (iot_device_data_f001.a3, iot_device_data_f001.a4)
                   IS DISTINCT FROM (EXCLUDED.a3, EXCLUDED.a4)
             RETURNING (xmax = 0) AS inserted"
        }
    }
}

pub struct PgDeviceStore {
    client: Client,
}

impl PgDeviceStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn device_row(row: &Row) -> Result<DeviceDataRow, StoreError> {
    Ok(DeviceDataRow {
        dttime: row.try_get(0)?,
        a1: row.try_get(1)?,
        a2: row.try_get(2)?,
        a3: row.try_get(3)?,
        a4: row.try_get(4)?,
    })
}

impl DeviceStore for PgDeviceStore {
    fn upsert_slots(&mut self, pair: SlotPair, writes: &[SlotWrite]) -> Result<Vec<UpsertOutcome>, StoreError> {
        // Dropping the transaction without commit rolls the batch back.
        let mut tx = self.client.transaction()?;
        let stmt = tx.prepare(upsert_sql(pair))?;

        let mut outcomes = Vec::with_capacity(writes.len());
        for write in writes {
            let returned = tx.query_opt(&stmt, &[&write.dttime, &write.values[0], &write.values[1]])?;
            let outcome = match returned {
                None => UpsertOutcome::Unchanged,
                Some(row) if row.try_get::<_, bool>(0)? => UpsertOutcome::Inserted,
                Some(_) => UpsertOutcome::Updated,
            };
            outcomes.push(outcome);
        }

        tx.commit()?;
        Ok(outcomes)
    }

    fn row(&mut self, dttime: NaiveDateTime) -> Result<Option<DeviceDataRow>, StoreError> {
        let row = self.client.query_opt(
            "SELECT dttime, a1, a2, a3, a4 FROM iot_device_data_f001 WHERE dttime = $1",
            &[&dttime],
        )?;
        row.as_ref().map(device_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_sql_touches_only_its_pair() {
        let level = upsert_sql(SlotPair::Level);
        assert!(level.contains("a1 = EXCLUDED.a1") && level.contains("a2 = EXCLUDED.a2"));
        assert!(!level.contains("a3") && !level.contains("a4"), "level upsert must not touch rain slots");

        let rain = upsert_sql(SlotPair::Rain);
        assert!(rain.contains("a3 = EXCLUDED.a3") && rain.contains("a4 = EXCLUDED.a4"));
        assert!(!rain.contains("a1") && !rain.contains("a2"), "rain upsert must not touch level slots");
    }

    #[test]
    fn test_upsert_sql_conflicts_on_dttime() {
        for pair in [SlotPair::Level, SlotPair::Rain] {
            assert!(upsert_sql(pair).contains("ON CONFLICT (dttime)"));
        }
    }
}
