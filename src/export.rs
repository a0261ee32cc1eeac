//! Ranking export for reporting.
//!
//! Supports CSV with a header row and pretty-printed JSON.

use anyhow::Result;
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

use crate::model::Scope;
use crate::period::Granularity;
use crate::store::StatsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

/// One ranked aggregate, flattened across scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingRow {
    pub granularity: &'static str,
    pub scope: &'static str,
    pub period_start: NaiveDate,
    pub operator_id: Option<i64>,
    pub station_id: Option<i64>,
    pub change_count: i64,
    pub rank_operator: Option<i64>,
    pub rank_network: Option<i64>,
}

/// Reads the ranking of the `granularity` bucket containing `date`.
///
/// A period with no rows yields an empty ranking.
pub fn ranking_rows(
    store: &StatsStore,
    granularity: Granularity,
    scope: Scope,
    date: NaiveDate,
) -> Result<Vec<RankingRow>> {
    let period_start = granularity.period_start(date);
    let row = |operator_id, station_id, change_count, rank_operator, rank_network| RankingRow {
        granularity: granularity.as_str(),
        scope: scope.as_str(),
        period_start,
        operator_id,
        station_id,
        change_count,
        rank_operator,
        rank_network,
    };

    let rows = match scope {
        Scope::Station => store
            .station_activity(granularity, period_start)?
            .into_iter()
            .map(|r| {
                row(
                    Some(r.operator_id),
                    Some(r.station_id),
                    r.change_count,
                    r.rank_operator,
                    r.rank_network,
                )
            })
            .collect(),
        Scope::Operator => store
            .operator_activity(granularity, period_start)?
            .into_iter()
            .map(|r| row(Some(r.operator_id), None, r.change_count, None, r.rank_network))
            .collect(),
        Scope::Network => store
            .network_activity(granularity, period_start)?
            .into_iter()
            .map(|r| row(None, None, r.change_count, None, None))
            .collect(),
    };
    Ok(rows)
}

/// Writes `rows` to `writer` in `format`.
pub fn write_rows<W: Write>(rows: &[RankingRow], format: ExportFormat, mut writer: W) -> Result<()> {
    debug!(rows = rows.len(), ?format, "Writing ranking");
    match format {
        ExportFormat::Csv => {
            let mut csv = WriterBuilder::new().has_headers(true).from_writer(writer);
            for row in rows {
                csv.serialize(row)?;
            }
            csv.flush()?;
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, rows)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}
