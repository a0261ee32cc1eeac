use bikeshare_stats::archive::{archive_file_name, create_archive_file};
use bikeshare_stats::error::StatsError;
use bikeshare_stats::job::DayJob;
use bikeshare_stats::model::Sample;
use bikeshare_stats::period::Granularity;
use bikeshare_stats::store::StatsStore;
use bikeshare_stats::store::catalog::all_tables;
use chrono::{DateTime, NaiveDate, NaiveTime};
use rusqlite::types::Value;
use std::collections::BTreeMap;
use std::path::Path;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn sample(day: NaiveDate, minute: i64, operator_id: i64, station_id: i64, vehicles: u32) -> Sample {
    let midnight = day.and_time(NaiveTime::MIN).and_utc().timestamp();
    Sample {
        timestamp: DateTime::from_timestamp(midnight + minute * 60, 0).unwrap(),
        operator_id,
        station_id,
        available_vehicles: vehicles,
        available_docks: 20 - vehicles,
    }
}

/// `changes` samples for each (operator, station), interleaved over the day.
fn day_samples(day: NaiveDate, stations: &[(i64, i64, i64)]) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut minute = 0;
    let max = stations.iter().map(|s| s.2).max().unwrap_or(0);
    for round in 0..max {
        for &(operator_id, station_id, changes) in stations {
            if round < changes {
                let vehicles = ((round * 3 + station_id) % 10) as u32;
                samples.push(sample(day, minute, operator_id, station_id, vehicles));
                minute += 1;
            }
        }
    }
    samples
}

fn write_archive(dir: &Path, day: NaiveDate, samples: &[Sample]) {
    create_archive_file(&dir.join(archive_file_name(day)), samples).unwrap();
}

fn open_store(dir: &Path) -> StatsStore {
    let store = StatsStore::open(dir, "stats.db").unwrap();
    store.ensure_schema().unwrap();
    store
}

fn dump(store: &StatsStore) -> BTreeMap<&'static str, Vec<Vec<Value>>> {
    all_tables()
        .map(|table| {
            let n = table.columns.len();
            let order: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
            let sql = format!("SELECT * FROM {} ORDER BY {}", table.name, order.join(", "));
            let mut stmt = store.connection().prepare(&sql).unwrap();
            let rows = stmt
                .query_map([], |row| {
                    (0..n)
                        .map(|i| row.get::<_, Value>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
                .unwrap()
                .collect::<rusqlite::Result<Vec<_>>>()
                .unwrap();
            (table.name, rows)
        })
        .collect()
}

#[test]
fn test_full_pipeline_ranks_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let day = d(2024, 3, 4);
    // operator 1: A=5, B=5, C=2; operator 2: D=8
    write_archive(
        dir.path(),
        day,
        &day_samples(day, &[(1, 1, 5), (1, 2, 5), (1, 3, 2), (2, 4, 8)]),
    );

    let store = open_store(dir.path());
    let report = DayJob::new(dir.path()).run(&store, day).unwrap();
    assert_eq!(report.day_activity.stations, 4);
    assert_eq!(report.day_activity.operators, 2);
    assert_eq!(report.day_activity.network, 1);

    let ranks: BTreeMap<i64, (i64, Option<i64>, Option<i64>)> = store
        .station_activity(Granularity::Day, day)
        .unwrap()
        .into_iter()
        .map(|r| (r.station_id, (r.change_count, r.rank_operator, r.rank_network)))
        .collect();
    assert_eq!(ranks[&4], (8, Some(1), Some(1)));
    assert_eq!(ranks[&1], (5, Some(1), Some(2)));
    assert_eq!(ranks[&2], (5, Some(1), Some(2)));
    assert_eq!(ranks[&3], (2, Some(3), Some(4)));

    let operators = store.operator_activity(Granularity::Day, day).unwrap();
    assert_eq!(operators[0].operator_id, 1);
    assert_eq!(operators[0].change_count, 12);
    assert_eq!(operators[0].rank_network, Some(1));
    assert_eq!(operators[1].rank_network, Some(2));

    let network = store.network_activity(Granularity::Day, day).unwrap();
    assert_eq!(network[0].change_count, 20);

    // a single day fills its week, month and year with the same ranking
    for granularity in [Granularity::Week, Granularity::Month, Granularity::Year] {
        let rows = store
            .station_activity(granularity, granularity.period_start(day))
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].station_id, 4);
        assert_eq!(rows[0].rank_network, Some(1));
        assert_eq!(rows[3].rank_network, Some(4));
    }
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let days = [d(2024, 3, 4), d(2024, 3, 5)];
    write_archive(dir.path(), days[0], &day_samples(days[0], &[(1, 1, 3), (1, 2, 1), (2, 7, 2)]));
    write_archive(dir.path(), days[1], &day_samples(days[1], &[(1, 1, 1), (2, 7, 4)]));

    let store = open_store(dir.path());
    let job = DayJob::new(dir.path());
    assert!(job.run_days(&store, &days).is_success());
    let first = dump(&store);

    assert!(job.run_days(&store, &days).is_success());
    assert!(job.run_days(&store, &days).is_success());
    assert_eq!(dump(&store), first);

    let week = store.station_activity(Granularity::Week, d(2024, 3, 4)).unwrap();
    let counts: Vec<(i64, i64)> = week.iter().map(|r| (r.station_id, r.change_count)).collect();
    assert_eq!(counts, vec![(7, 6), (1, 4), (2, 1)]);
}

#[test]
fn test_rollups_across_year_boundary() {
    let dir = tempfile::tempdir().unwrap();
    // the week of Monday 2024-12-30 spans two months and two years
    let days = [d(2024, 12, 30), d(2024, 12, 31), d(2025, 1, 1), d(2025, 1, 2)];
    for (i, day) in days.iter().enumerate() {
        write_archive(dir.path(), *day, &day_samples(*day, &[(1, 1, i as i64 + 1)]));
    }

    let store = open_store(dir.path());
    let summary = DayJob::new(dir.path()).run_days(&store, &days);
    assert!(summary.is_success());
    assert_eq!(summary.processed.len(), 4);

    let week = store.network_activity(Granularity::Week, d(2024, 12, 30)).unwrap();
    assert_eq!(week[0].change_count, 1 + 2 + 3 + 4);

    let dec = store.station_activity(Granularity::Month, d(2024, 12, 1)).unwrap();
    let jan = store.station_activity(Granularity::Month, d(2025, 1, 1)).unwrap();
    assert_eq!(dec[0].change_count, 3);
    assert_eq!(jan[0].change_count, 7);

    let y2024 = store.operator_activity(Granularity::Year, d(2024, 1, 1)).unwrap();
    let y2025 = store.operator_activity(Granularity::Year, d(2025, 1, 1)).unwrap();
    assert_eq!(y2024[0].change_count, 3);
    assert_eq!(y2025[0].change_count, 7);
    assert_eq!(y2025[0].rank_network, Some(1));
}

#[test]
fn test_invalid_sample_aborts_day_without_extrema() {
    let dir = tempfile::tempdir().unwrap();
    let day = d(2024, 3, 4);
    let path = dir.path().join(archive_file_name(day));
    create_archive_file(&path, &day_samples(day, &[(1, 1, 3)])).unwrap();

    let midnight = day.and_time(NaiveTime::MIN).and_utc().timestamp();
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO archived_samples VALUES (?1, 1, 2, NULL, 4)",
        [midnight + 3600],
    )
    .unwrap();
    drop(conn);

    let store = open_store(dir.path());
    let err = DayJob::new(dir.path()).run(&store, day).unwrap_err();
    assert!(matches!(
        err,
        StatsError::InvalidSample {
            operator_id: 1,
            station_id: 2,
            ..
        }
    ));

    for (table, rows) in dump(&store) {
        assert!(rows.is_empty(), "{table} has rows");
    }
}

#[test]
fn test_missing_archive_is_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(dir.path());
    let err = DayJob::new(dir.path()).run(&store, d(2024, 3, 4)).unwrap_err();
    assert!(matches!(err, StatsError::Storage { .. }));
}
