//! Declarative definitions of every persisted table.
//!
//! Statements are generated from these definitions so that the twelve
//! activity tables share one code path.

use crate::model::Scope;
use crate::period::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
}

impl ColumnType {
    fn sql(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Text,
        nullable: false,
    }
}

const fn int(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Integer,
        nullable: false,
    }
}

const fn rank(name: &'static str) -> Column {
    Column {
        name,
        ty: ColumnType::Integer,
        nullable: true,
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [Column],
    pub key: &'static [&'static str],
}

impl TableDef {
    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{}", c.name, c.ty.sql(), null)
            })
            .collect();
        format!(
            "CREATE TABLE {} ({}, PRIMARY KEY ({})) WITHOUT ROWID",
            self.name,
            columns.join(", "),
            self.key.join(", ")
        )
    }

    /// Replace-on-conflict insert binding every column in declaration order.
    pub fn upsert_sql(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            placeholders.join(", ")
        )
    }

    /// Updates `set` columns of one row; `set` binds first, then the key.
    pub fn update_sql(&self, set: &[&str]) -> String {
        let assignments: Vec<String> = set
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", i + 1))
            .collect();
        let conditions: Vec<String> = self
            .key
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{c} = ?{}", set.len() + i + 1))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {}",
            self.name,
            assignments.join(", "),
            conditions.join(" AND ")
        )
    }

    /// Selects all columns of one period, highest `change_count` first.
    ///
    /// Ties are broken by key so that reruns read rows in the same order.
    pub fn select_period_sql(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY change_count DESC, {}",
            names.join(", "),
            self.name,
            self.key[0],
            self.key.join(", ")
        )
    }

    /// Sums `change_count` of `source` over `[?2, ?3)` into period `?1`.
    ///
    /// `group` names the key columns kept from the source, rank columns are
    /// left unset so the ranking pass recomputes them.
    pub fn rollup_sql(&self, source: &TableDef, group: &[&str]) -> String {
        let period = self.key[0];
        let mut target_cols = vec![period];
        target_cols.extend_from_slice(group);
        target_cols.push("change_count");

        let mut select_cols = vec!["?1"];
        select_cols.extend_from_slice(group);
        select_cols.push("SUM(change_count)");

        let grouping = if group.is_empty() {
            "HAVING COUNT(*) > 0".to_string()
        } else {
            format!("GROUP BY {}", group.join(", "))
        };

        format!(
            "INSERT OR REPLACE INTO {} ({}) SELECT {} FROM {} WHERE {src} >= ?2 AND {src} < ?3 {}",
            self.name,
            target_cols.join(", "),
            select_cols.join(", "),
            source.name,
            grouping,
            src = source.key[0],
        )
    }
}

pub static STATION_DAY_EXTREMA: TableDef = TableDef {
    name: "station_day_extrema",
    columns: &[
        text("day"),
        int("operator_id"),
        int("station_id"),
        int("min_vehicles"),
        int("max_vehicles"),
        int("min_docks"),
        int("max_docks"),
        int("sample_count"),
    ],
    key: &["day", "operator_id", "station_id"],
};

pub static OPERATOR_DAY_EXTREMA: TableDef = TableDef {
    name: "operator_day_extrema",
    columns: &[
        text("day"),
        int("operator_id"),
        int("min_total_vehicles"),
        int("max_total_vehicles"),
    ],
    key: &["day", "operator_id"],
};

pub static NETWORK_DAY_EXTREMA: TableDef = TableDef {
    name: "network_day_extrema",
    columns: &[
        text("day"),
        int("min_total_vehicles"),
        int("max_total_vehicles"),
    ],
    key: &["day"],
};

const STATION_ACTIVITY_COLUMNS: &[Column] = &[
    text("period_start"),
    int("operator_id"),
    int("station_id"),
    int("change_count"),
    rank("rank_operator"),
    rank("rank_network"),
];
const STATION_ACTIVITY_KEY: &[&str] = &["period_start", "operator_id", "station_id"];

const OPERATOR_ACTIVITY_COLUMNS: &[Column] = &[
    text("period_start"),
    int("operator_id"),
    int("change_count"),
    rank("rank_network"),
];
const OPERATOR_ACTIVITY_KEY: &[&str] = &["period_start", "operator_id"];

const NETWORK_ACTIVITY_COLUMNS: &[Column] = &[text("period_start"), int("change_count")];
const NETWORK_ACTIVITY_KEY: &[&str] = &["period_start"];

macro_rules! activity_tables {
    ($granularity:literal) => {
        [
            TableDef {
                name: concat!("activity_station_", $granularity),
                columns: STATION_ACTIVITY_COLUMNS,
                key: STATION_ACTIVITY_KEY,
            },
            TableDef {
                name: concat!("activity_operator_", $granularity),
                columns: OPERATOR_ACTIVITY_COLUMNS,
                key: OPERATOR_ACTIVITY_KEY,
            },
            TableDef {
                name: concat!("activity_network_", $granularity),
                columns: NETWORK_ACTIVITY_COLUMNS,
                key: NETWORK_ACTIVITY_KEY,
            },
        ]
    };
}

static DAY_ACTIVITY: [TableDef; 3] = activity_tables!("day");
static WEEK_ACTIVITY: [TableDef; 3] = activity_tables!("week");
static MONTH_ACTIVITY: [TableDef; 3] = activity_tables!("month");
static YEAR_ACTIVITY: [TableDef; 3] = activity_tables!("year");

/// The activity table of `scope` at `granularity`.
pub fn activity_table(scope: Scope, granularity: Granularity) -> &'static TableDef {
    let tables = match granularity {
        Granularity::Day => &DAY_ACTIVITY,
        Granularity::Week => &WEEK_ACTIVITY,
        Granularity::Month => &MONTH_ACTIVITY,
        Granularity::Year => &YEAR_ACTIVITY,
    };
    match scope {
        Scope::Station => &tables[0],
        Scope::Operator => &tables[1],
        Scope::Network => &tables[2],
    }
}

/// Every table of the stats store, extrema first.
pub fn all_tables() -> impl Iterator<Item = &'static TableDef> {
    [&STATION_DAY_EXTREMA, &OPERATOR_DAY_EXTREMA, &NETWORK_DAY_EXTREMA]
        .into_iter()
        .chain(Granularity::ALL.into_iter().flat_map(|g| {
            Scope::ALL
                .into_iter()
                .map(move |scope| activity_table(scope, g))
        }))
}
