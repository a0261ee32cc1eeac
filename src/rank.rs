//! Tie-sharing ranks of activity aggregates.
//!
//! Ranks follow SQL `RANK()`: equal counts share a rank and the next distinct
//! count is ranked by its 1-based position, so `[10, 10, 7, 3]` ranks
//! `[1, 1, 3, 4]`.

use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::Result;
use crate::model::{OperatorActivity, StationActivity};
use crate::period::Granularity;
use crate::store::StatsStore;

/// Ranking state of one scope during a single descending pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankCounter {
    seen: i64,
    rank: i64,
    last: Option<i64>,
}

impl RankCounter {
    /// Rank of the next row, which must not exceed the previous count.
    pub fn next(&mut self, change_count: i64) -> i64 {
        self.seen += 1;
        if self.last != Some(change_count) {
            self.rank = self.seen;
            self.last = Some(change_count);
        }
        self.rank
    }
}

/// Assigns operator-local and network ranks in one pass.
pub fn rank_stations(mut rows: Vec<StationActivity>) -> Vec<StationActivity> {
    rows.sort_by_key(|r| Reverse(r.change_count));

    let mut network = RankCounter::default();
    let mut operators: BTreeMap<i64, RankCounter> = BTreeMap::new();
    for row in &mut rows {
        row.rank_operator = Some(operators.entry(row.operator_id).or_default().next(row.change_count));
        row.rank_network = Some(network.next(row.change_count));
    }
    rows
}

/// Assigns network ranks to operator rows.
pub fn rank_operators(mut rows: Vec<OperatorActivity>) -> Vec<OperatorActivity> {
    rows.sort_by_key(|r| Reverse(r.change_count));

    let mut network = RankCounter::default();
    for row in &mut rows {
        row.rank_network = Some(network.next(row.change_count));
    }
    rows
}

/// Ranks the station table of one period, returning the rows updated.
pub fn rank_station_period(
    store: &StatsStore,
    granularity: Granularity,
    period_start: NaiveDate,
) -> Result<usize> {
    let ranked = rank_stations(store.station_activity(granularity, period_start)?);
    if ranked.is_empty() {
        return Ok(0);
    }
    let updated = store.update_station_ranks(granularity, &ranked)?;
    info!(%granularity, period = %period_start, updated, "Station ranks updated");
    Ok(updated)
}

/// Ranks the operator table of one period, returning the rows updated.
pub fn rank_operator_period(
    store: &StatsStore,
    granularity: Granularity,
    period_start: NaiveDate,
) -> Result<usize> {
    let ranked = rank_operators(store.operator_activity(granularity, period_start)?);
    if ranked.is_empty() {
        return Ok(0);
    }
    let updated = store.update_operator_ranks(granularity, &ranked)?;
    info!(%granularity, period = %period_start, updated, "Operator ranks updated");
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn station(operator_id: i64, station_id: i64, change_count: i64) -> StationActivity {
        StationActivity {
            period_start: day(),
            operator_id,
            station_id,
            change_count,
            rank_operator: None,
            rank_network: None,
        }
    }

    fn operator(operator_id: i64, change_count: i64) -> OperatorActivity {
        OperatorActivity {
            period_start: day(),
            operator_id,
            change_count,
            rank_network: None,
        }
    }

    #[test]
    fn test_counter_rank_semantics() {
        let mut counter = RankCounter::default();
        let ranks: Vec<i64> = [10, 10, 7, 3].iter().map(|c| counter.next(*c)).collect();
        assert_eq!(ranks, vec![1, 1, 3, 4]);
    }

    #[test]
    fn test_three_way_tie_then_four() {
        let rows = vec![operator(1, 5), operator(2, 5), operator(3, 5), operator(4, 1)];
        let ranks: Vec<Option<i64>> = rank_operators(rows).iter().map(|r| r.rank_network).collect();
        assert_eq!(ranks, vec![Some(1), Some(1), Some(1), Some(4)]);
    }

    #[test]
    fn test_station_scenario() {
        // A=5, B=5, C=2 for operator 1; D=8 for operator 2
        let rows = vec![
            station(2, 4, 8),
            station(1, 1, 5),
            station(1, 2, 5),
            station(1, 3, 2),
        ];
        let ranked = rank_stations(rows);
        let by_station: BTreeMap<i64, (Option<i64>, Option<i64>)> = ranked
            .iter()
            .map(|r| (r.station_id, (r.rank_operator, r.rank_network)))
            .collect();

        assert_eq!(by_station[&1], (Some(1), Some(2)));
        assert_eq!(by_station[&2], (Some(1), Some(2)));
        assert_eq!(by_station[&3], (Some(3), Some(4)));
        assert_eq!(by_station[&4], (Some(1), Some(1)));
    }

    #[test]
    fn test_unsorted_input_is_ranked_descending() {
        let ranked = rank_operators(vec![operator(1, 1), operator(2, 9)]);
        assert_eq!(ranked[0].operator_id, 2);
        assert_eq!(ranked[0].rank_network, Some(1));
        assert_eq!(ranked[1].rank_network, Some(2));
    }

    #[test]
    fn test_empty_period() {
        assert!(rank_stations(Vec::new()).is_empty());
        let store = StatsStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        assert_eq!(rank_station_period(&store, Granularity::Week, day()).unwrap(), 0);
        assert_eq!(rank_operator_period(&store, Granularity::Week, day()).unwrap(), 0);
    }

    proptest! {
        #[test]
        fn rank_is_one_plus_count_strictly_greater(
            counts in prop::collection::vec((1i64..4, 0i64..20), 0..60)
        ) {
            let rows: Vec<StationActivity> = counts
                .iter()
                .enumerate()
                .map(|(i, (op, c))| station(*op, i as i64, *c))
                .collect();
            let ranked = rank_stations(rows);

            for r in &ranked {
                let greater = ranked.iter().filter(|o| o.change_count > r.change_count).count() as i64;
                prop_assert_eq!(r.rank_network, Some(greater + 1));

                let greater_local = ranked
                    .iter()
                    .filter(|o| o.operator_id == r.operator_id && o.change_count > r.change_count)
                    .count() as i64;
                prop_assert_eq!(r.rank_operator, Some(greater_local + 1));
            }
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].rank_network <= pair[1].rank_network);
            }
        }
    }
}
