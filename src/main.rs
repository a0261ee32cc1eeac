//! CLI entry point for the bike-share stats job.
//!
//! Provides subcommands for processing daily sample archives into the stats
//! store and exporting one period's ranking.

use anyhow::{Context, Result, bail};
use bikeshare_stats::{
    config::Settings,
    export::{ExportFormat, ranking_rows, write_rows},
    job::DayJob,
    model::Scope,
    period::{Granularity, parse_date},
    store::StatsStore,
};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bikeshare_stats")]
#[command(about = "Daily statistics for bike-share station samples", long_about = None)]
struct Cli {
    /// Directory holding the stats store and the daily sample archives
    #[arg(long, global = true)]
    datadir: Option<String>,

    /// File name of the stats store inside the data directory
    #[arg(long, global = true)]
    dbname: Option<String>,

    /// Log debug output to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute extrema, activity rollups and ranks for each day
    Process {
        /// Days to process, in order
        #[arg(value_name = "YYYY-MM-DD", required = true)]
        dates: Vec<String>,
    },
    /// Export the ranking of the period containing a date
    Export {
        #[arg(short, long, value_enum)]
        granularity: Granularity,

        #[arg(short, long, value_enum)]
        scope: Scope,

        /// Any day inside the period
        #[arg(short, long, value_name = "YYYY-MM-DD")]
        date: String,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,

        /// File to write to instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bikeshare_stats.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare_stats.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(stderr_level.into()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive(LevelFilter::DEBUG.into()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let settings = Settings::resolve(cli.datadir, cli.dbname, cli.verbose)?;
    debug!(datadir = %settings.datadir.display(), dbname = %settings.dbname, "Settings resolved");

    match cli.command {
        Commands::Process { dates } => {
            // reject the whole run before touching the store
            let days = dates
                .iter()
                .map(|s| parse_date(s))
                .collect::<Result<Vec<_>, _>>()?;
            let store = open_store(&settings)?;

            let job = DayJob::new(&settings.datadir);
            let summary = job.run_days(&store, &days);
            for report in &summary.processed {
                debug!(report = %serde_json::to_string(report)?, "Day report");
            }

            info!(
                processed = summary.processed.len(),
                failed = summary.failed.len(),
                "Run finished"
            );
            if !summary.is_success() {
                for (day, e) in &summary.failed {
                    error!(day = %day, error = %e, "Day not processed");
                }
                bail!("{} of {} days failed", summary.failed.len(), days.len());
            }
        }
        Commands::Export {
            granularity,
            scope,
            date,
            format,
            output,
        } => {
            let date = parse_date(&date)?;
            let store = open_store(&settings)?;
            let rows = ranking_rows(&store, granularity, scope, date)?;

            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating export file {path}"))?;
                    let mut writer = BufWriter::new(file);
                    write_rows(&rows, format, &mut writer)?;
                    writer.flush()?;
                    info!(path = %path, rows = rows.len(), "Ranking exported");
                }
                None => write_rows(&rows, format, std::io::stdout().lock())?,
            }
        }
    }

    Ok(())
}

/// Opens the stats store and creates any missing table.
fn open_store(settings: &Settings) -> Result<StatsStore> {
    let store = StatsStore::open(&settings.datadir, &settings.dbname)
        .with_context(|| format!("opening {}", settings.store_path().display()))?;
    let created = store.ensure_schema()?;
    if created > 0 {
        info!(created, "Schema initialized");
    }
    Ok(store)
}
