//! Access to archived availability samples.
//!
//! [`SampleSource`] is the seam the engines read through. [`SqliteArchive`]
//! reads a per-day archive attached to the stats store, [`MemorySource`] serves
//! samples already held in memory.

mod memory;
mod sqlite;

pub use memory::MemorySource;
pub use sqlite::{ARCHIVE_TABLE, SqliteArchive, archive_file_name, archive_schema_name, create_archive_file};

use chrono::{DateTime, NaiveDate};

use crate::error::{Result, StatsError};
use crate::model::Sample;

/// Yields the samples of exactly one archived day.
pub trait SampleSource {
    /// Samples of `day` in no particular order.
    fn read_samples_unordered(&self, day: NaiveDate) -> Result<Vec<Sample>>;

    /// Samples of `day` sorted by ascending timestamp.
    fn read_samples_ordered(&self, day: NaiveDate) -> Result<Vec<Sample>>;
}

/// A sample row as stored, before validation.
#[derive(Debug, Clone, Copy)]
pub struct RawSample {
    pub timestamp: i64,
    pub operator_id: i64,
    pub station_id: i64,
    pub available_vehicles: Option<i64>,
    pub available_docks: Option<i64>,
}

impl RawSample {
    /// Checks counts and timestamp, turning the row into a [`Sample`].
    pub fn validate(self, day: NaiveDate) -> Result<Sample> {
        let invalid = |reason: String| StatsError::InvalidSample {
            day,
            operator_id: self.operator_id,
            station_id: self.station_id,
            reason,
        };

        let timestamp = DateTime::from_timestamp(self.timestamp, 0)
            .ok_or_else(|| invalid(format!("timestamp {} out of range", self.timestamp)))?;
        let available_vehicles = count(self.available_vehicles, "vehicle").map_err(invalid)?;
        let available_docks = count(self.available_docks, "dock").map_err(invalid)?;

        Ok(Sample {
            timestamp,
            operator_id: self.operator_id,
            station_id: self.station_id,
            available_vehicles,
            available_docks,
        })
    }
}

fn count(value: Option<i64>, what: &str) -> std::result::Result<u32, String> {
    match value {
        None => Err(format!("missing {what} count")),
        Some(v) if v < 0 => Err(format!("negative {what} count {v}")),
        Some(v) => u32::try_from(v).map_err(|_| format!("{what} count {v} too large")),
    }
}
