//! Runtime settings: command-line flags, then environment, then defaults.

use std::path::{Path, PathBuf};

use crate::error::{Result, StatsError};

pub const DEFAULT_DATADIR: &str = "~/.jcd_v2";
pub const DEFAULT_DBNAME: &str = "stats.db";

pub const DATADIR_ENV: &str = "BIKESTATS_DATADIR";
pub const DBNAME_ENV: &str = "BIKESTATS_DBNAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Directory holding the stats store and the daily sample archives.
    pub datadir: PathBuf,
    /// File name of the stats store inside `datadir`.
    pub dbname: String,
    pub verbose: bool,
}

impl Settings {
    /// Resolves settings against the process environment.
    pub fn resolve(datadir: Option<String>, dbname: Option<String>, verbose: bool) -> Result<Self> {
        Self::resolve_with(datadir, dbname, verbose, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(
        datadir: Option<String>,
        dbname: Option<String>,
        verbose: bool,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let datadir = datadir
            .or_else(|| env(DATADIR_ENV))
            .unwrap_or_else(|| DEFAULT_DATADIR.to_string());
        let dbname = dbname
            .or_else(|| env(DBNAME_ENV))
            .unwrap_or_else(|| DEFAULT_DBNAME.to_string());

        if datadir.trim().is_empty() {
            return Err(StatsError::Argument("data directory must not be empty".into()));
        }
        if dbname.trim().is_empty() {
            return Err(StatsError::Argument("database file name must not be empty".into()));
        }

        let home = env("HOME");
        Ok(Self {
            datadir: expand_home(&datadir, home.as_deref()),
            dbname,
            verbose,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.datadir.join(&self.dbname)
    }
}

/// Expands a leading `~` against `home`; other paths are returned as is.
pub fn expand_home(path: &str, home: Option<&str>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => PathBuf::from(home),
        (Some(rest), Some(home)) if rest.starts_with('/') => {
            Path::new(home).join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}
