//! SQLite-backed stats store.
//!
//! Tables are described once in [`catalog`]; every read and write below goes
//! through those definitions. All inserts are `INSERT OR REPLACE`, so
//! re-processing a day overwrites its rows instead of duplicating them.

pub mod catalog;

use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, params};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, StorageContext};
use crate::model::{DayExtrema, NetworkActivity, OperatorActivity, Scope, StationActivity};
use crate::period::Granularity;
use catalog::{TableDef, activity_table};

pub struct StatsStore {
    conn: Connection,
}

impl StatsStore {
    /// Opens (creating if needed) `dbname` inside `datadir`.
    pub fn open(datadir: &Path, dbname: &str) -> Result<Self> {
        let path = datadir.join(dbname);
        std::fs::create_dir_all(datadir)
            .storage_context(|| format!("creating data directory [{}]", datadir.display()))?;
        let conn = Connection::open(&path)
            .storage_context(|| format!("opening stats store [{}]", path.display()))?;
        info!(path = %path.display(), "Stats store opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().storage_context(|| "opening in-memory store")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn has_table(&self, name: &str) -> Result<bool> {
        self.conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")
            .and_then(|mut stmt| stmt.exists([name]))
            .storage_context(|| format!("checking for table [{name}]"))
    }

    /// Creates every catalog table that does not exist yet.
    ///
    /// Returns the number of tables created.
    pub fn ensure_schema(&self) -> Result<usize> {
        let mut created = 0;
        for table in catalog::all_tables() {
            if self.has_table(table.name)? {
                continue;
            }
            debug!(table = table.name, "Creating table");
            self.conn
                .execute(&table.create_sql(), [])
                .storage_context(|| format!("creating table [{}]", table.name))?;
            created += 1;
        }
        Ok(created)
    }

    /// Attaches a day archive read-only under `schema`.
    pub fn attach_archive(&self, path: &Path, schema: &str) -> Result<()> {
        let uri = format!("file:{}?mode=ro", uri_escape(&path.to_string_lossy()));
        self.conn
            .execute(&format!("ATTACH DATABASE ?1 AS {schema}"), [&uri])
            .storage_context(|| format!("attaching archive [{}]", path.display()))?;
        debug!(schema, path = %path.display(), "Archive attached");
        Ok(())
    }

    pub fn detach_archive(&self, schema: &str) -> Result<()> {
        self.conn
            .execute(&format!("DETACH DATABASE {schema}"), [])
            .storage_context(|| format!("detaching archive [{schema}]"))?;
        debug!(schema, "Archive detached");
        Ok(())
    }

    /// Runs `f` inside one transaction, committing only if it succeeds.
    ///
    /// The store is single-writer; transactions are never nested.
    pub fn with_transaction<T, F>(&self, context: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .storage_context(|| format!("starting transaction for {context}"))?;
        let value = f(&tx)?;
        tx.commit()
            .storage_context(|| format!("committing {context}"))?;
        Ok(value)
    }

    /// Upserts all extrema of one day in a single transaction.
    pub fn write_day_extrema(&self, extrema: &DayExtrema) -> Result<usize> {
        self.with_transaction("day extrema", |tx| {
            let mut written = 0;

            let table = &catalog::STATION_DAY_EXTREMA;
            let mut stmt = prepare(tx, table)?;
            for e in &extrema.stations {
                written += stmt
                    .execute(params![
                        e.day,
                        e.operator_id,
                        e.station_id,
                        e.min_vehicles,
                        e.max_vehicles,
                        e.min_docks,
                        e.max_docks,
                        e.sample_count,
                    ])
                    .storage_context(|| write_context(table))?;
            }

            let table = &catalog::OPERATOR_DAY_EXTREMA;
            let mut stmt = prepare(tx, table)?;
            for e in &extrema.operators {
                written += stmt
                    .execute(params![
                        e.day,
                        e.operator_id,
                        e.min_total_vehicles,
                        e.max_total_vehicles,
                    ])
                    .storage_context(|| write_context(table))?;
            }

            if let Some(e) = &extrema.network {
                let table = &catalog::NETWORK_DAY_EXTREMA;
                written += prepare(tx, table)?
                    .execute(params![e.day, e.min_total_vehicles, e.max_total_vehicles])
                    .storage_context(|| write_context(table))?;
            }

            Ok(written)
        })
    }

    /// Upserts station activity rows at `granularity`.
    pub fn write_station_activity(
        &self,
        granularity: Granularity,
        rows: &[StationActivity],
    ) -> Result<usize> {
        let table = activity_table(Scope::Station, granularity);
        self.with_transaction(table.name, |tx| {
            let mut stmt = prepare(tx, table)?;
            let mut written = 0;
            for r in rows {
                written += stmt
                    .execute(params![
                        r.period_start,
                        r.operator_id,
                        r.station_id,
                        r.change_count,
                        r.rank_operator,
                        r.rank_network,
                    ])
                    .storage_context(|| write_context(table))?;
            }
            Ok(written)
        })
    }

    /// Sums `source` rows in `[from, to)` into period `period_start` of `target`.
    pub fn rollup(
        &self,
        target: &TableDef,
        source: &TableDef,
        group: &[&str],
        period_start: NaiveDate,
        (from, to): (NaiveDate, NaiveDate),
    ) -> Result<usize> {
        let sql = target.rollup_sql(source, group);
        self.with_transaction(target.name, |tx| {
            tx.execute(&sql, params![period_start, from, to])
                .storage_context(|| {
                    format!("rolling up [{}] into [{}]", source.name, target.name)
                })
        })
    }

    /// Station activity of one period, highest `change_count` first.
    pub fn station_activity(
        &self,
        granularity: Granularity,
        period_start: NaiveDate,
    ) -> Result<Vec<StationActivity>> {
        let table = activity_table(Scope::Station, granularity);
        self.select_period(table, period_start, |row| {
            Ok(StationActivity {
                period_start: row.get(0)?,
                operator_id: row.get(1)?,
                station_id: row.get(2)?,
                change_count: row.get(3)?,
                rank_operator: row.get(4)?,
                rank_network: row.get(5)?,
            })
        })
    }

    pub fn operator_activity(
        &self,
        granularity: Granularity,
        period_start: NaiveDate,
    ) -> Result<Vec<OperatorActivity>> {
        let table = activity_table(Scope::Operator, granularity);
        self.select_period(table, period_start, |row| {
            Ok(OperatorActivity {
                period_start: row.get(0)?,
                operator_id: row.get(1)?,
                change_count: row.get(2)?,
                rank_network: row.get(3)?,
            })
        })
    }

    pub fn network_activity(
        &self,
        granularity: Granularity,
        period_start: NaiveDate,
    ) -> Result<Vec<NetworkActivity>> {
        let table = activity_table(Scope::Network, granularity);
        self.select_period(table, period_start, |row| {
            Ok(NetworkActivity {
                period_start: row.get(0)?,
                change_count: row.get(1)?,
            })
        })
    }

    fn select_period<T, F>(&self, table: &TableDef, period_start: NaiveDate, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let context = || format!("reading table [{}]", table.name);
        let mut stmt = self
            .conn
            .prepare(&table.select_period_sql())
            .storage_context(context)?;
        let rows = stmt
            .query_map([period_start], map)
            .storage_context(context)?;
        rows.collect::<rusqlite::Result<Vec<T>>>()
            .storage_context(context)
    }

    /// Writes both ranks of ranked station rows; vanished keys are skipped.
    pub fn update_station_ranks(
        &self,
        granularity: Granularity,
        rows: &[StationActivity],
    ) -> Result<usize> {
        let table = activity_table(Scope::Station, granularity);
        let sql = table.update_sql(&["rank_operator", "rank_network"]);
        self.with_transaction(table.name, |tx| {
            let mut stmt = tx.prepare(&sql).storage_context(|| write_context(table))?;
            let mut updated = 0;
            for r in rows {
                updated += stmt
                    .execute(params![
                        r.rank_operator,
                        r.rank_network,
                        r.period_start,
                        r.operator_id,
                        r.station_id,
                    ])
                    .storage_context(|| write_context(table))?;
            }
            Ok(updated)
        })
    }

    pub fn update_operator_ranks(
        &self,
        granularity: Granularity,
        rows: &[OperatorActivity],
    ) -> Result<usize> {
        let table = activity_table(Scope::Operator, granularity);
        let sql = table.update_sql(&["rank_network"]);
        self.with_transaction(table.name, |tx| {
            let mut stmt = tx.prepare(&sql).storage_context(|| write_context(table))?;
            let mut updated = 0;
            for r in rows {
                updated += stmt
                    .execute(params![r.rank_network, r.period_start, r.operator_id])
                    .storage_context(|| write_context(table))?;
            }
            Ok(updated)
        })
    }
}

fn prepare<'t>(tx: &'t Transaction<'_>, table: &TableDef) -> Result<rusqlite::Statement<'t>> {
    tx.prepare(&table.upsert_sql())
        .storage_context(|| write_context(table))
}

fn write_context(table: &TableDef) -> String {
    format!("writing table [{}]", table.name)
}

/// Escapes the characters with a meaning in SQLite `file:` URIs.
fn uri_escape(path: &str) -> String {
    path.replace('%', "%25")
        .replace('?', "%3f")
        .replace('#', "%23")
}
