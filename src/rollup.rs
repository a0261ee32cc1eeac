//! Activity counts per day, week, month and year.
//!
//! Only the day/station level looks at raw samples: one sample row counts as
//! one change, whether or not the values moved. Every other level is a sum of
//! rows already stored one level down, so rollups stay O(periods). Within a
//! granularity, operators sum that granularity's stations and the network
//! sums its operators.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::archive::SampleSource;
use crate::error::Result;
use crate::model::{Sample, Scope, StationActivity};
use crate::period::Granularity;
use crate::store::StatsStore;
use crate::store::catalog::activity_table;

/// Rows written per scope for one granularity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelReport {
    pub stations: usize,
    pub operators: usize,
    pub network: usize,
}

/// Counts the samples of each station as its day changes, ordered by key.
pub fn count_changes(day: NaiveDate, samples: &[Sample]) -> Vec<StationActivity> {
    let mut counts: BTreeMap<(i64, i64), i64> = BTreeMap::new();
    for s in samples {
        *counts.entry((s.operator_id, s.station_id)).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|((operator_id, station_id), change_count)| StationActivity {
            period_start: day,
            operator_id,
            station_id,
            change_count,
            rank_operator: None,
            rank_network: None,
        })
        .collect()
}

pub fn compute_day_activity<S: SampleSource + ?Sized>(
    store: &StatsStore,
    source: &S,
    day: NaiveDate,
) -> Result<LevelReport> {
    let samples = source.read_samples_unordered(day)?;
    let stations = store.write_station_activity(Granularity::Day, &count_changes(day, &samples))?;
    let (operators, network) = roll_scopes(store, Granularity::Day, day)?;
    Ok(report(Granularity::Day, day, stations, operators, network))
}

pub fn compute_week_activity(store: &StatsStore, day: NaiveDate) -> Result<LevelReport> {
    compute_rollup(store, Granularity::Week, day)
}

pub fn compute_month_activity(store: &StatsStore, day: NaiveDate) -> Result<LevelReport> {
    compute_rollup(store, Granularity::Month, day)
}

pub fn compute_year_activity(store: &StatsStore, day: NaiveDate) -> Result<LevelReport> {
    compute_rollup(store, Granularity::Year, day)
}

/// Rebuilds the `granularity` bucket containing `day` from the level below.
fn compute_rollup(
    store: &StatsStore,
    granularity: Granularity,
    day: NaiveDate,
) -> Result<LevelReport> {
    // day is the only level without a stored source
    let Some(below) = granularity.rolls_up_from() else {
        return Ok(LevelReport::default());
    };
    let bounds = granularity.bounds(day);
    let stations = store.rollup(
        activity_table(Scope::Station, granularity),
        activity_table(Scope::Station, below),
        &["operator_id", "station_id"],
        bounds.0,
        bounds,
    )?;
    let (operators, network) = roll_scopes(store, granularity, day)?;
    Ok(report(granularity, day, stations, operators, network))
}

/// Sums stations into operators and operators into the network.
fn roll_scopes(
    store: &StatsStore,
    granularity: Granularity,
    day: NaiveDate,
) -> Result<(usize, usize)> {
    let bounds = granularity.bounds(day);
    let operators = store.rollup(
        activity_table(Scope::Operator, granularity),
        activity_table(Scope::Station, granularity),
        &["operator_id"],
        bounds.0,
        bounds,
    )?;
    let network = store.rollup(
        activity_table(Scope::Network, granularity),
        activity_table(Scope::Operator, granularity),
        &[],
        bounds.0,
        bounds,
    )?;
    Ok((operators, network))
}

fn report(
    granularity: Granularity,
    day: NaiveDate,
    stations: usize,
    operators: usize,
    network: usize,
) -> LevelReport {
    info!(
        %granularity,
        day = %day,
        period = %granularity.period_start(day),
        stations,
        operators,
        network,
        "Activity rolled up"
    );
    LevelReport {
        stations,
        operators,
        network,
    }
}
