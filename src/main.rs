//! CLI entry point for the civic rater.
//!
//! Provides subcommands for scoring entities from a file, database table or
//! API, finding related bills, inspecting a written report and listing the
//! runs recorded in a score database.

use anyhow::{Context, Result};
use civic_rater::analyzers::types::Summary;
use civic_rater::config::PipelineConfig;
use civic_rater::outcome::RunOutcome;
use civic_rater::output::{ReportDocument, read_report};
use civic_rater::pipeline::{Pipeline, PipelineOptions, RelatedOptions, StoreTarget, run_related};
use civic_rater::scoring::{Domain, TOTAL_KEY};
use civic_rater::source::{Filter, HttpContext, SourceSpec};
use civic_rater::store::{OnDuplicate, ScoreStore};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "civic_rater")]
#[command(about = "Scores politicians, districts and bills from public data", long_about = None)]
struct Cli {
    /// JSON config file; environment variables and flags override it
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// CSV, JSON or SQLite file, or an http(s) URL returning JSON
    #[arg(value_name = "FILE_OR_URL")]
    source: String,

    /// Table to read from a SQLite source
    #[arg(long)]
    table: Option<String>,

    /// Equality filter for a SQLite source, as column=value
    #[arg(long)]
    filter: Option<Filter>,

    /// JSON pointer to the array of records (e.g. /response/body/items)
    #[arg(long)]
    pointer: Option<String>,

    /// Number of API pages to request
    #[arg(long, default_value_t = 1)]
    pages: u32,
}

impl SourceArgs {
    fn spec(self) -> Result<SourceSpec> {
        Ok(SourceSpec::infer(
            &self.source,
            self.table,
            self.filter,
            self.pointer,
            self.pages,
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Score every entity in a source and write a report
    Score {
        #[command(flatten)]
        source: SourceArgs,

        /// Which scorer to apply
        #[arg(short, long, value_enum)]
        domain: Domain,

        /// Directory for the report (default from config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Report file name prefix (default: the domain)
        #[arg(long)]
        name: Option<String>,

        /// Report title
        #[arg(long)]
        title: Option<String>,

        /// Length of the ranking (default from config)
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Score key to rank by
        #[arg(long, default_value = TOTAL_KEY)]
        rank_by: String,

        /// SQLite score database to record results in
        #[arg(long)]
        db: Option<PathBuf>,

        /// What to do when an entity is already in the database
        #[arg(long, value_enum, default_value_t = OnDuplicate::Upsert)]
        on_duplicate: OnDuplicate,

        /// Also write a static HTML page next to the report
        #[arg(long, default_value_t = false)]
        html: bool,

        /// Gzip compress the report
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Find closely related bills
    Related {
        #[command(flatten)]
        source: SourceArgs,

        /// Minimum similarity for a pair to be reported
        #[arg(long, default_value_t = 0.3)]
        min_score: f64,

        /// Maximum number of pairs to report
        #[arg(short = 'n', long, default_value_t = 20)]
        top_n: usize,

        /// Directory for the report (default from config)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Report file name prefix
        #[arg(long, default_value = "related_bills")]
        name: String,

        /// Gzip compress the report
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Print the metadata and summary of a written report
    Inspect {
        #[arg(value_name = "REPORT")]
        report: PathBuf,
    },
    /// List runs recorded in a score database
    Runs {
        /// SQLite score database (default from config)
        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/civic_rater.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("civic_rater.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive(LevelFilter::INFO.into()));

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

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    let outcome = match cli.command {
        Commands::Score {
            source,
            domain,
            output_dir,
            name,
            title,
            top_n,
            rank_by,
            db,
            on_duplicate,
            html,
            gzip,
        } => {
            let spec = source.spec()?;
            let http = HttpContext::new(config.http.clone(), config.api_keys()?);
            let options = PipelineOptions {
                output_dir: output_dir.unwrap_or_else(|| config.output_dir.clone()),
                report_name: name.unwrap_or_else(|| domain.as_str().to_string()),
                title: title.unwrap_or_else(|| format!("{domain} scores")),
                top_n: top_n.unwrap_or(config.top_n),
                rank_by,
                identity: config.identity(),
                store: db
                    .or_else(|| config.db_path.clone())
                    .map(|path| StoreTarget { path, on_duplicate }),
                html,
                gzip,
            };
            let pipeline = Pipeline::new(domain.scorer(), config.lookup_tables(), options)?;

            let result = pipeline.run(&spec, &http).await;
            if let Some(Summary::Stats(stats)) = &result.summary {
                info!(
                    entities = stats.entity_count,
                    scored = stats.scored_count,
                    unscored = stats.unscored_count,
                    "Score summary"
                );
            }
            if let Some(saved) = result.saved {
                info!(inserted = saved.inserted, updated = saved.updated, "Database updated");
            }
            if let Some(path) = &result.report_path {
                info!(report = %path.display(), "Report ready");
            }
            result.outcome
        }
        Commands::Related {
            source,
            min_score,
            top_n,
            output_dir,
            name,
            gzip,
        } => {
            let spec = source.spec()?;
            let http = HttpContext::new(config.http.clone(), config.api_keys()?);
            let options = RelatedOptions {
                output_dir: output_dir.unwrap_or_else(|| config.output_dir.clone()),
                report_name: name,
                min_score,
                top_n,
                identity: config.identity(),
                gzip,
                ..RelatedOptions::default()
            };

            let result = run_related(&spec, &http, &options).await;
            if let Some(path) = &result.report_path {
                info!(report = %path.display(), "Report ready");
            }
            result.outcome
        }
        Commands::Inspect { report } => {
            inspect(&report)?;
            RunOutcome::Success
        }
        Commands::Runs { db, limit } => {
            let db = db
                .or(config.db_path)
                .context("no score database given; pass --db or set CIVIC_RATER_DB_PATH")?;
            list_runs(&db, limit)?;
            RunOutcome::Success
        }
    };

    log_outcome(&outcome);
    Ok(ExitCode::from(outcome.exit_code() as u8))
}

fn log_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Success => info!("Run succeeded"),
        RunOutcome::Partial { skipped } => {
            for skip in skipped {
                debug!(row = skip.row, reason = %skip.reason, detail = %skip.detail, "Row skipped");
            }
            warn!(skipped = skipped.len(), "Run partially succeeded");
        }
        RunOutcome::Failure { reason, message } => {
            error!(reason = %reason, message = %message, "Run failed");
        }
    }
}

/// Reads any report, whatever its domain, and prints its summary.
#[tracing::instrument(skip_all, fields(report = %path.display()))]
fn inspect(path: &Path) -> Result<()> {
    let doc: ReportDocument<serde_json::Value, serde_json::Value> = read_report(path)?;
    let meta = &doc.metadata;

    info!(
        title = %meta.title,
        domain = %meta.domain,
        source = %meta.source,
        created_at = %meta.created_at.to_rfc3339(),
        version = %meta.version,
        schema_version = meta.schema_version,
        outcome = meta.outcome.label(),
        results = doc.results.len(),
        "Report"
    );
    println!("{}", serde_json::to_string_pretty(&doc.summary)?);
    Ok(())
}

#[tracing::instrument(skip_all, fields(db = %db.display()))]
fn list_runs(db: &Path, limit: usize) -> Result<()> {
    if !db.exists() {
        anyhow::bail!("score database {} does not exist", db.display());
    }
    let store = ScoreStore::open(db)?;
    let runs = store.list_runs(limit)?;

    info!(total = runs.len(), "Run list fetched");

    for run in &runs {
        info!(
            run_id = run.run_id,
            domain = %run.domain,
            source = %run.source,
            started_at = %run.started_at.to_rfc3339(),
            outcome = run.outcome.as_deref().unwrap_or("unfinished"),
            report = run.report_path.as_deref().unwrap_or("-"),
            "Run"
        );
    }
    Ok(())
}
