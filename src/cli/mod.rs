//! CLI command definitions and handlers

mod ingest;
mod output;
mod report;
mod status;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use churnwatch::config::{load_settings, paths, Settings};
use churnwatch::git::GitHistorySource;
use churnwatch::mining::IngestService;
use churnwatch::store::RedbStore;

/// churnwatch - change hotspots and temporal coupling from git history
#[derive(Parser, Debug)]
#[command(name = "churnwatch")]
#[command(
    version,
    about = "Mine git history for change hotspots, temporal coupling and ownership",
    after_help = "\
Examples:
  churnwatch ingest api ./services/api              Ingest (incremental after the first run)
  churnwatch ingest api https://host/org/api.git --full
  churnwatch hotspots api --limit 10                Most frequently changed files
  churnwatch coupling api --min-score 0.5 --type rs Files that change together
  churnwatch owners api --files                     Files with concentrated authorship
  churnwatch status api --json                      Machine-readable status"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Directory holding the churnwatch database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a repository's history into a project
    ///
    /// Runs incrementally from the project's last checkpoint; the first run
    /// for a project ingests everything.
    Ingest {
        /// Project name
        project: String,

        /// Local path or remote URL (https://, ssh://, git://, file://, user@host:path)
        location: String,

        /// Re-walk the whole history (already-ingested commits are skipped)
        #[arg(long)]
        full: bool,

        /// Directory for remote clones
        #[arg(long)]
        scratch_dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank files by change frequency
    Hotspots {
        project: String,

        /// Maximum rows (0 = all)
        #[arg(long, short = 'n')]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Find files that change together
    Coupling {
        project: String,

        /// Maximum pairs (1-200)
        #[arg(long, short = 'n', allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Minimum commits a pair must share
        #[arg(long, allow_negative_numbers = true)]
        min_shared: Option<i64>,

        /// Minimum coupling score (0.0-1.0)
        #[arg(long)]
        min_score: Option<f64>,

        /// Only count commits at or after this date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_since)]
        since: Option<DateTime<Utc>>,

        /// Only count commits at or before this date (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_until)]
        until: Option<DateTime<Utc>>,

        /// Restrict to file extensions (repeatable)
        #[arg(long = "type", short = 't')]
        file_types: Vec<String>,

        /// Ignore commits touching more files than this when pairing (unset or 0 = no cap)
        #[arg(long)]
        max_files_per_commit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show who changes what
    Owners {
        project: String,

        /// Per-file ownership instead of per-author totals
        #[arg(long)]
        files: bool,

        /// Maximum rows (0 = all)
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show a project's ingestion status
    Status {
        project: String,

        #[arg(long)]
        json: bool,
    },

    /// List known projects
    Projects {
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    let mut settings = load_settings(&cwd);
    if cli.data_dir.is_some() {
        settings.data_dir = cli.data_dir;
    }

    match cli.command {
        Commands::Ingest {
            project,
            location,
            full,
            scratch_dir,
            json,
        } => {
            if scratch_dir.is_some() {
                settings.scratch_dir = scratch_dir;
            }
            let service = open_service(&settings)?;
            ingest::run(&service, &project, &location, full, json)
        }

        Commands::Hotspots {
            project,
            limit,
            json,
        } => {
            let service = open_service(&settings)?;
            let limit = limit.unwrap_or_else(|| settings.hotspot_limit());
            report::hotspots(&service, &project, limit, json)
        }

        Commands::Coupling {
            project,
            limit,
            min_shared,
            min_score,
            since,
            until,
            file_types,
            max_files_per_commit,
            json,
        } => {
            let service = open_service(&settings)?;
            let mut query = settings.coupling_query();
            if limit.is_some() {
                query.limit = limit;
            }
            if min_shared.is_some() {
                query.min_shared_commits = min_shared;
            }
            if let Some(score) = min_score {
                query.min_coupling_score = score;
            }
            if !file_types.is_empty() {
                query.file_types = file_types;
            }
            if max_files_per_commit.is_some() {
                query.max_files_per_commit = max_files_per_commit;
            }
            if since.is_some() || until.is_some() {
                query.date_range = Some(churnwatch::analytics::DateRange { since, until });
            }
            report::coupling(&service, &project, &query, json)
        }

        Commands::Owners {
            project,
            files,
            limit,
            json,
        } => {
            let service = open_service(&settings)?;
            if files {
                report::file_owners(&service, &project, limit, json)
            } else {
                report::authors(&service, &project, limit, json)
            }
        }

        Commands::Status { project, json } => {
            let service = open_service(&settings)?;
            status::run(&service, &project, json)
        }

        Commands::Projects { json } => {
            let service = open_service(&settings)?;
            status::projects(&service, json)
        }
    }
}

/// Open the on-disk store and wire up the service
fn open_service(settings: &Settings) -> Result<IngestService> {
    let data_dir = paths::ensure_dir(&settings.data_dir())
        .with_context(|| format!("Failed to create data directory {}", settings.data_dir().display()))?;
    let store = Arc::new(
        RedbStore::new(&data_dir)
            .with_context(|| format!("Failed to open database in {}", data_dir.display()))?,
    );
    let history = Arc::new(GitHistorySource::new(settings.scratch_dir()));
    debug!(
        "Using store {} with scratch clones in {}",
        store.path().display(),
        history.scratch_dir().display()
    );
    Ok(IngestService::new(store.clone(), store, history))
}

fn parse_date(s: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("'{}' is not a date (expected YYYY-MM-DD or RFC 3339)", s))?;
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| "invalid time of day".to_string())?;
    Ok(day.and_time(time).and_utc())
}

fn parse_since(s: &str) -> Result<DateTime<Utc>, String> {
    parse_date(s, false)
}

fn parse_until(s: &str) -> Result<DateTime<Utc>, String> {
    parse_date(s, true)
}
