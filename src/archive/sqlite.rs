use chrono::NaiveDate;
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::debug;

use super::{RawSample, SampleSource};
use crate::error::{Result, StorageContext};
use crate::model::Sample;
use crate::period::day_instants;

/// Table holding the raw samples inside a day archive.
pub const ARCHIVE_TABLE: &str = "archived_samples";

/// Schema name a day archive is attached under, e.g. `samples_20240304`.
pub fn archive_schema_name(day: NaiveDate) -> String {
    format!("samples_{}", day.format("%Y%m%d"))
}

/// File name of a day archive inside the data directory.
pub fn archive_file_name(day: NaiveDate) -> String {
    format!("{}.db", archive_schema_name(day))
}

/// Reads samples from a day archive attached to `conn` as `schema`.
pub struct SqliteArchive<'c> {
    conn: &'c Connection,
    schema: String,
}

impl<'c> SqliteArchive<'c> {
    pub fn new(conn: &'c Connection, schema: impl Into<String>) -> Self {
        Self {
            conn,
            schema: schema.into(),
        }
    }

    fn read(&self, day: NaiveDate, ordered: bool) -> Result<Vec<Sample>> {
        let (start, end) = day_instants(day);
        let order = if ordered {
            "ORDER BY timestamp ASC, contract_id ASC, station_number ASC"
        } else {
            ""
        };
        let sql = format!(
            "SELECT timestamp, contract_id, station_number, available_bikes, available_bike_stands
             FROM {}.{}
             WHERE timestamp >= ?1 AND timestamp < ?2
             {}",
            self.schema, ARCHIVE_TABLE, order
        );
        let context = || format!("reading samples from [{}.{}]", self.schema, ARCHIVE_TABLE);

        let mut stmt = self.conn.prepare(&sql).storage_context(context)?;
        let rows = stmt
            .query_map(params![start.timestamp(), end.timestamp()], |row| {
                Ok(RawSample {
                    timestamp: row.get(0)?,
                    operator_id: row.get(1)?,
                    station_id: row.get(2)?,
                    available_vehicles: row.get(3)?,
                    available_docks: row.get(4)?,
                })
            })
            .storage_context(context)?;

        let mut samples = Vec::new();
        for raw in rows {
            samples.push(raw.storage_context(context)?.validate(day)?);
        }

        debug!(schema = %self.schema, day = %day, ordered, count = samples.len(), "Samples read");
        Ok(samples)
    }
}

impl SampleSource for SqliteArchive<'_> {
    fn read_samples_unordered(&self, day: NaiveDate) -> Result<Vec<Sample>> {
        self.read(day, false)
    }

    fn read_samples_ordered(&self, day: NaiveDate) -> Result<Vec<Sample>> {
        self.read(day, true)
    }
}

/// Writes `samples` into a fresh day archive at `path`.
///
/// The collector normally produces these files; this builds one with the same
/// layout, for seeding and tests.
pub fn create_archive_file(path: &Path, samples: &[Sample]) -> Result<()> {
    let context = || format!("writing archive [{}]", path.display());
    let mut conn = Connection::open(path).storage_context(context)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {ARCHIVE_TABLE} (
            timestamp INTEGER NOT NULL,
            contract_id INTEGER NOT NULL,
            station_number INTEGER NOT NULL,
            available_bikes INTEGER,
            available_bike_stands INTEGER,
            PRIMARY KEY (timestamp, contract_id, station_number)
        ) WITHOUT ROWID;"
    ))
    .storage_context(context)?;

    let tx = conn.transaction().storage_context(context)?;
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT OR REPLACE INTO {ARCHIVE_TABLE} VALUES (?1, ?2, ?3, ?4, ?5)"
            ))
            .storage_context(context)?;
        for s in samples {
            stmt.execute(params![
                s.timestamp.timestamp(),
                s.operator_id,
                s.station_id,
                s.available_vehicles,
                s.available_docks,
            ])
            .storage_context(context)?;
        }
    }
    tx.commit().storage_context(context)?;
    Ok(())
}
