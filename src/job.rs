//! Daily batch job: extrema, then rollups, then ranks.
//!
//! Stages run strictly in sequence and each commits its own writes, so a
//! failure leaves earlier stages of the day in place. Every write is an
//! upsert; re-running the day replaces them.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

use crate::archive::{SampleSource, SqliteArchive, archive_file_name, archive_schema_name};
use crate::error::{Result, StatsError};
use crate::extrema::compute_day_extrema;
use crate::period::Granularity;
use crate::rank::{rank_operator_period, rank_station_period};
use crate::rollup::{
    LevelReport, compute_day_activity, compute_month_activity, compute_week_activity,
    compute_year_activity,
};
use crate::store::StatsStore;

/// What one day's run wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayReport {
    pub day: NaiveDate,
    pub extrema_rows: usize,
    pub day_activity: LevelReport,
    pub week_activity: LevelReport,
    pub month_activity: LevelReport,
    pub year_activity: LevelReport,
    pub station_ranks: usize,
    pub operator_ranks: usize,
}

/// Runs every stage for `day` against samples from `source`.
pub fn process_day<S: SampleSource + ?Sized>(
    store: &StatsStore,
    source: &S,
    day: NaiveDate,
) -> Result<DayReport> {
    let extrema = compute_day_extrema(source, day)?;
    let extrema_rows = store.write_day_extrema(&extrema)?;
    info!(
        day = %day,
        stations = extrema.stations.len(),
        operators = extrema.operators.len(),
        rows = extrema_rows,
        "Extrema stored"
    );

    let day_activity = compute_day_activity(store, source, day)?;
    let week_activity = compute_week_activity(store, day)?;
    let month_activity = compute_month_activity(store, day)?;
    let year_activity = compute_year_activity(store, day)?;

    let mut station_ranks = 0;
    let mut operator_ranks = 0;
    for granularity in Granularity::ALL {
        let period_start = granularity.period_start(day);
        station_ranks += rank_station_period(store, granularity, period_start)?;
        operator_ranks += rank_operator_period(store, granularity, period_start)?;
    }

    Ok(DayReport {
        day,
        extrema_rows,
        day_activity,
        week_activity,
        month_activity,
        year_activity,
        station_ranks,
        operator_ranks,
    })
}

/// Processes days whose sample archives live in `datadir`.
pub struct DayJob {
    datadir: PathBuf,
}

impl DayJob {
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
        }
    }

    /// Attaches the archive of `day`, processes it, and detaches it again,
    /// also when processing fails.
    #[tracing::instrument(skip_all, fields(day = %day))]
    pub fn run(&self, store: &StatsStore, day: NaiveDate) -> Result<DayReport> {
        let schema = archive_schema_name(day);
        let path = self.datadir.join(archive_file_name(day));

        store.attach_archive(&path, &schema)?;
        let outcome = {
            let archive = SqliteArchive::new(store.connection(), schema.as_str());
            process_day(store, &archive, day)
        };
        let detached = store.detach_archive(&schema);

        let report = outcome?;
        detached?;
        info!(
            extrema_rows = report.extrema_rows,
            station_ranks = report.station_ranks,
            operator_ranks = report.operator_ranks,
            "Day processed"
        );
        Ok(report)
    }

    /// Processes `days` in order, carrying on past failed days.
    pub fn run_days(&self, store: &StatsStore, days: &[NaiveDate]) -> RunSummary {
        let mut summary = RunSummary::default();
        for &day in days {
            info!(day = %day, "Processing");
            match self.run(store, day) {
                Ok(report) => summary.processed.push(report),
                Err(e) => {
                    error!(day = %day, error = %e, "Day failed");
                    summary.failed.push((day, e));
                }
            }
        }
        summary
    }
}

/// Outcome of a multi-day run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: Vec<DayReport>,
    pub failed: Vec<(NaiveDate, StatsError)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{MemorySource, create_archive_file};
    use crate::model::Sample;
    use chrono::{DateTime, NaiveTime};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample(day: NaiveDate, minute: i64, station_id: i64, vehicles: u32) -> Sample {
        let midnight = day.and_time(NaiveTime::MIN).and_utc().timestamp();
        Sample {
            timestamp: DateTime::from_timestamp(midnight + minute * 60, 0).unwrap(),
            operator_id: 1,
            station_id,
            available_vehicles: vehicles,
            available_docks: 10 - vehicles,
        }
    }

    #[test]
    fn test_process_day_runs_all_stages() {
        let day = d(2024, 3, 4);
        let store = StatsStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        let source = MemorySource::new(vec![
            sample(day, 0, 1, 2),
            sample(day, 10, 1, 4),
            sample(day, 5, 2, 6),
        ]);

        let report = process_day(&store, &source, day).unwrap();
        assert_eq!(report.day, day);
        // two stations, one operator, one network
        assert_eq!(report.extrema_rows, 4);
        assert_eq!(report.day_activity.stations, 2);
        assert_eq!(report.year_activity.network, 1);
        // two station rows ranked at each of the four granularities
        assert_eq!(report.station_ranks, 8);
        assert_eq!(report.operator_ranks, 4);
    }

    #[test]
    fn test_run_days_continues_after_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let present = d(2024, 3, 5);
        create_archive_file(
            &dir.path().join(archive_file_name(present)),
            &[sample(present, 0, 1, 3)],
        )
        .unwrap();

        let store = StatsStore::open(dir.path(), "stats.db").unwrap();
        store.ensure_schema().unwrap();
        let job = DayJob::new(dir.path());
        let summary = job.run_days(&store, &[d(2024, 3, 4), present]);

        assert!(!summary.is_success());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, d(2024, 3, 4));
        assert_eq!(summary.processed.len(), 1);

        // archive was detached again
        let attached: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM pragma_database_list", [], |row| row.get(0))
            .unwrap();
        assert_eq!(attached, 1);
    }
}
