//! Daily availability extrema.
//!
//! Station extrema are plain min/max/count folds. Operator and network
//! extrema track the instantaneous sum of available vehicles by replaying the
//! day's samples in timestamp order and applying per-station deltas, which is
//! O(samples) time and O(stations) space.

use chrono::NaiveDate;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::archive::SampleSource;
use crate::error::Result;
use crate::model::{DayExtrema, NetworkDayExtrema, OperatorDayExtrema, Sample, StationDayExtrema};

/// Folds `samples` into one [`StationDayExtrema`] per station, ordered by key.
pub fn station_extrema(day: NaiveDate, samples: &[Sample]) -> Vec<StationDayExtrema> {
    let mut stations: BTreeMap<(i64, i64), StationDayExtrema> = BTreeMap::new();

    for s in samples {
        stations
            .entry((s.operator_id, s.station_id))
            .and_modify(|e| {
                e.min_vehicles = e.min_vehicles.min(s.available_vehicles);
                e.max_vehicles = e.max_vehicles.max(s.available_vehicles);
                e.min_docks = e.min_docks.min(s.available_docks);
                e.max_docks = e.max_docks.max(s.available_docks);
                e.sample_count += 1;
            })
            .or_insert(StationDayExtrema {
                day,
                operator_id: s.operator_id,
                station_id: s.station_id,
                min_vehicles: s.available_vehicles,
                max_vehicles: s.available_vehicles,
                min_docks: s.available_docks,
                max_docks: s.available_docks,
                sample_count: 1,
            });
    }

    stations.into_values().collect()
}

/// Running total with the extrema it has reached so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunningSum {
    current: i64,
    min: i64,
    max: i64,
}

impl RunningSum {
    fn new(start: i64) -> Self {
        Self {
            current: start,
            min: start,
            max: start,
        }
    }

    fn apply(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        self.current += delta;
        // a new extremum can only be reached in the direction of the move
        if delta > 0 {
            self.max = self.max.max(self.current);
        } else {
            self.min = self.min.min(self.current);
        }
    }
}

/// Incremental tracker of summed vehicle availability.
///
/// Seeded from each station's first sample of the day; stations without any
/// sample are absent from the sums. Network extrema come from the same replay,
/// so they are exact simultaneous sums rather than sums of operator extrema.
#[derive(Debug, Clone, Default)]
pub struct ExtremaTracker {
    last_known: HashMap<(i64, i64), u32>,
    operators: BTreeMap<i64, RunningSum>,
    network: Option<RunningSum>,
}

impl ExtremaTracker {
    /// Seeds the tracker from the first sample of every station in `ordered`.
    pub fn seed(ordered: &[Sample]) -> Self {
        let mut last_known = HashMap::new();
        let mut initial: BTreeMap<i64, i64> = BTreeMap::new();

        for s in ordered {
            if let Entry::Vacant(slot) = last_known.entry((s.operator_id, s.station_id)) {
                slot.insert(s.available_vehicles);
                *initial.entry(s.operator_id).or_default() += i64::from(s.available_vehicles);
            }
        }

        let network = if last_known.is_empty() {
            None
        } else {
            Some(RunningSum::new(initial.values().sum()))
        };
        let operators = initial
            .into_iter()
            .map(|(op, total)| (op, RunningSum::new(total)))
            .collect();

        Self {
            last_known,
            operators,
            network,
        }
    }

    /// Applies one sample; samples must arrive in ascending timestamp order.
    pub fn observe(&mut self, s: &Sample) {
        let vehicles = s.available_vehicles;
        let previous = self
            .last_known
            .insert((s.operator_id, s.station_id), vehicles);

        let delta = match previous {
            Some(prev) => i64::from(vehicles) - i64::from(prev),
            None => {
                // station unseen at seeding time: it joins the sums now
                self.operators
                    .entry(s.operator_id)
                    .or_insert_with(|| RunningSum::new(0));
                self.network.get_or_insert_with(|| RunningSum::new(0));
                i64::from(vehicles)
            }
        };

        if let Some(sum) = self.operators.get_mut(&s.operator_id) {
            sum.apply(delta);
        }
        if let Some(sum) = self.network.as_mut() {
            sum.apply(delta);
        }
    }

    pub fn finish(self, day: NaiveDate) -> (Vec<OperatorDayExtrema>, Option<NetworkDayExtrema>) {
        let operators = self
            .operators
            .into_iter()
            .map(|(operator_id, sum)| OperatorDayExtrema {
                day,
                operator_id,
                min_total_vehicles: sum.min,
                max_total_vehicles: sum.max,
            })
            .collect();
        let network = self.network.map(|sum| NetworkDayExtrema {
            day,
            min_total_vehicles: sum.min,
            max_total_vehicles: sum.max,
        });
        (operators, network)
    }
}

/// Replays `ordered` samples through a freshly seeded [`ExtremaTracker`].
pub fn replay(
    day: NaiveDate,
    ordered: &[Sample],
) -> (Vec<OperatorDayExtrema>, Option<NetworkDayExtrema>) {
    let mut tracker = ExtremaTracker::seed(ordered);
    for s in ordered {
        tracker.observe(s);
    }
    tracker.finish(day)
}

/// Computes all extrema of `day`.
///
/// Both reads validate every sample before anything is returned, so an
/// invalid sample aborts the whole day.
pub fn compute_day_extrema<S: SampleSource + ?Sized>(source: &S, day: NaiveDate) -> Result<DayExtrema> {
    let unordered = source.read_samples_unordered(day)?;
    let stations = station_extrema(day, &unordered);
    drop(unordered);

    let ordered = source.read_samples_ordered(day)?;
    let (operators, network) = replay(day, &ordered);

    debug!(
        day = %day,
        samples = ordered.len(),
        stations = stations.len(),
        operators = operators.len(),
        "Extrema computed"
    );

    Ok(DayExtrema {
        stations,
        operators,
        network,
    })
}
