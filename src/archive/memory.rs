use chrono::NaiveDate;

use super::SampleSource;
use crate::error::Result;
use crate::model::Sample;
use crate::period::day_instants;

/// In-memory sample source, filtered per day on read.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    samples: Vec<Sample>,
}

impl MemorySource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    fn of_day(&self, day: NaiveDate) -> Vec<Sample> {
        let (start, end) = day_instants(day);
        self.samples
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp < end)
            .copied()
            .collect()
    }
}

impl SampleSource for MemorySource {
    fn read_samples_unordered(&self, day: NaiveDate) -> Result<Vec<Sample>> {
        Ok(self.of_day(day))
    }

    fn read_samples_ordered(&self, day: NaiveDate) -> Result<Vec<Sample>> {
        let mut samples = self.of_day(day);
        // stable: equal timestamps keep insertion order
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }
}
