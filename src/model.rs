//! Record types flowing through the statistics pipeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One availability reading for a station, as archived by the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub operator_id: i64,
    pub station_id: i64,
    pub available_vehicles: u32,
    pub available_docks: u32,
}

/// Plain min/max/count of a station's readings over one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StationDayExtrema {
    pub day: NaiveDate,
    pub operator_id: i64,
    pub station_id: i64,
    pub min_vehicles: u32,
    pub max_vehicles: u32,
    pub min_docks: u32,
    pub max_docks: u32,
    pub sample_count: u32,
}

/// Extrema of the instantaneous sum of vehicles over an operator's stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperatorDayExtrema {
    pub day: NaiveDate,
    pub operator_id: i64,
    pub min_total_vehicles: i64,
    pub max_total_vehicles: i64,
}

/// Extrema of the instantaneous sum of vehicles over the whole network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkDayExtrema {
    pub day: NaiveDate,
    pub min_total_vehicles: i64,
    pub max_total_vehicles: i64,
}

/// Everything the extrema pass produces for a single day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayExtrema {
    pub stations: Vec<StationDayExtrema>,
    pub operators: Vec<OperatorDayExtrema>,
    pub network: Option<NetworkDayExtrema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationActivity {
    pub period_start: NaiveDate,
    pub operator_id: i64,
    pub station_id: i64,
    pub change_count: i64,
    pub rank_operator: Option<i64>,
    pub rank_network: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorActivity {
    pub period_start: NaiveDate,
    pub operator_id: i64,
    pub change_count: i64,
    pub rank_network: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkActivity {
    pub period_start: NaiveDate,
    pub change_count: i64,
}

/// Aggregation scope of an activity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Scope {
    Station,
    Operator,
    Network,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Station, Scope::Operator, Scope::Network];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Station => "station",
            Scope::Operator => "operator",
            Scope::Network => "network",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
