//! Error taxonomy for the statistics engine.

use chrono::NaiveDate;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building daily statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    /// A sample carried a missing or negative count.
    #[error("invalid sample on {day} for station {operator_id}/{station_id}: {reason}")]
    InvalidSample {
        day: NaiveDate,
        operator_id: i64,
        station_id: i64,
        reason: String,
    },

    /// Schema creation, read or write failure against the store.
    #[error("storage error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Unparseable date or missing required option.
    #[error("invalid argument: {0}")]
    Argument(String),
}

impl StatsError {
    pub fn storage(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StatsError::Storage {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// Attaches a human-readable context to store and filesystem results.
pub trait StorageContext<T> {
    fn storage_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> StorageContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn storage_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| StatsError::storage(f(), e))
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;
