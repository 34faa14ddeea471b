//! Report documents and their persistence.
//!
//! A report is one pretty-printed JSON file per run, optionally gzipped, with
//! an optional static HTML rendering of the ranking next to it.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzers::types::Summary;
use crate::outcome::RunOutcome;
use crate::scoring::ScoreBundle;
use crate::scoring::similarity::{BillPair, RelatedSummary};

/// Version of the report layout, bumped on breaking changes.
pub const REPORT_SCHEMA_VERSION: u8 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_NAME_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Version of the tool that wrote the report.
    pub version: String,
    pub schema_version: u8,
    pub domain: String,
    pub source: String,
    pub outcome: RunOutcome,
}

impl ReportMetadata {
    pub fn new(title: &str, domain: &str, source: &str, outcome: RunOutcome) -> Self {
        Self {
            title: title.to_string(),
            created_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: REPORT_SCHEMA_VERSION,
            domain: domain.to_string(),
            source: source.to_string(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument<R, S> {
    pub metadata: ReportMetadata,
    pub results: Vec<R>,
    pub summary: S,
}

pub type ScoreReport = ReportDocument<ScoreBundle, Summary>;
pub type RelatedReport = ReportDocument<BillPair, RelatedSummary>;

/// `{name}_{YYYYMMDD_HHMMSS}[_{attempt}].json[.gz]`
pub fn report_file_name(name: &str, at: DateTime<Utc>, attempt: usize, gzip: bool) -> String {
    let mut file_name = format!("{}_{}", name, at.format("%Y%m%d_%H%M%S"));
    if attempt > 0 {
        let _ = write!(file_name, "_{attempt}");
    }
    file_name.push_str(".json");
    if gzip {
        file_name.push_str(".gz");
    }
    file_name
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        bail!("invalid report name '{name}': must be a plain file name");
    }
    Ok(())
}

/// Creates a file in `dir` that did not exist before, adding a numeric
/// suffix when an earlier report took the same second.
fn create_exclusive(
    dir: &Path,
    name: &str,
    at: DateTime<Utc>,
    gzip: bool,
) -> Result<(File, PathBuf)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = dir.join(report_file_name(name, at, attempt, gzip));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %path.display(), "report name taken, trying next suffix");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to create {}", path.display()));
            }
        }
    }
    bail!(
        "no free report name for '{name}' in {} after {MAX_NAME_ATTEMPTS} attempts",
        dir.display()
    )
}

/// Serializes `doc`, gzip-compressed when asked.
fn encode_report<R, S>(doc: &ReportDocument<R, S>, gzip: bool) -> Result<Vec<u8>>
where
    R: Serialize,
    S: Serialize,
{
    let mut body = serde_json::to_vec_pretty(doc).context("failed to serialize report")?;
    body.push(b'\n');
    if !gzip {
        return Ok(body);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body).context("failed to compress report")?;
    encoder.finish().context("failed to compress report")
}

/// Writes `doc` under `dir` and returns the path of the new file.
///
/// The document is serialized before any file is created, so a
/// serialization failure leaves nothing behind.
pub fn write_report<R, S>(
    dir: &Path,
    name: &str,
    doc: &ReportDocument<R, S>,
    gzip: bool,
) -> Result<PathBuf>
where
    R: Serialize,
    S: Serialize,
{
    validate_name(name)?;

    let bytes = encode_report(doc, gzip)?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let (mut file, path) = create_exclusive(dir, name, doc.metadata.created_at, gzip)?;
    file.write_all(&bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), bytes = bytes.len(), gzip, "Report written");
    Ok(path)
}

/// Replaces a report this run already wrote, keeping its compression.
pub fn rewrite_report<R, S>(path: &Path, doc: &ReportDocument<R, S>) -> Result<()>
where
    R: Serialize,
    S: Serialize,
{
    let gzip = path.extension().is_some_and(|ext| ext == "gz");
    let bytes = encode_report(doc, gzip)?;
    std::fs::write(path, &bytes).with_context(|| format!("failed to rewrite {}", path.display()))?;

    debug!(path = %path.display(), "Report rewritten");
    Ok(())
}

/// Reads a report back, gunzipping when the file is compressed.
pub fn read_report<R, S>(path: &Path) -> Result<ReportDocument<R, S>>
where
    R: DeserializeOwned,
    S: DeserializeOwned,
{
    let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decoded)
            .with_context(|| format!("failed to decompress {}", path.display()))?;
        decoded
    } else {
        raw
    };

    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Renders the ranking and per-key statistics of a score report as HTML.
pub fn render_html(report: &ScoreReport) -> String {
    let meta = &report.metadata;
    let mut html = String::new();

    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, "<html lang=\"ko\">\n<head>\n<meta charset=\"utf-8\">");
    let _ = writeln!(html, "<title>{}</title>", escape_html(&meta.title));
    let _ = writeln!(html, "</head>\n<body>");
    let _ = writeln!(html, "<h1>{}</h1>", escape_html(&meta.title));
    let _ = writeln!(
        html,
        "<p>{} &middot; {} &middot; {} &middot; {}</p>",
        escape_html(&meta.domain),
        escape_html(&meta.source),
        meta.created_at.to_rfc3339(),
        meta.outcome.label()
    );

    match &report.summary {
        Summary::NoData => {
            let _ = writeln!(html, "<p>No data.</p>");
        }
        Summary::Stats(stats) => {
            let _ = writeln!(
                html,
                "<h2>Top {} by {}</h2>",
                stats.top.len(),
                escape_html(&stats.rank_by)
            );
            let _ = writeln!(
                html,
                "<table>\n<tr><th>Rank</th><th>Name</th><th>Key</th><th>Value</th><th>Grade</th></tr>"
            );
            for entry in &stats.top {
                let _ = writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    entry.rank,
                    escape_html(&entry.name),
                    escape_html(&entry.key),
                    entry.value,
                    entry.grade.map_or("-", |g| g.as_str())
                );
            }
            let _ = writeln!(html, "</table>");

            let _ = writeln!(html, "<h2>Scores</h2>");
            let _ = writeln!(
                html,
                "<table>\n<tr><th>Key</th><th>Known</th><th>Unknown</th><th>Mean</th><th>Std dev</th><th>Min</th><th>Max</th></tr>"
            );
            for (key, ks) in &stats.keys {
                let _ = writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape_html(key),
                    ks.known,
                    ks.unknown,
                    fmt_opt(ks.mean),
                    fmt_opt(ks.stddev),
                    fmt_opt(ks.min),
                    fmt_opt(ks.max)
                );
            }
            let _ = writeln!(html, "</table>");
        }
    }

    let _ = writeln!(html, "</body>\n</html>");
    html
}

/// Writes the HTML rendering next to the JSON report at `report_path`.
pub fn write_html(report_path: &Path, report: &ScoreReport) -> Result<PathBuf> {
    let file_name = report_path
        .file_name()
        .and_then(|n| n.to_str())
        .context("report path has no file name")?;
    let stem = file_name
        .trim_end_matches(".gz")
        .trim_end_matches(".json");
    let path = report_path.with_file_name(format!("{stem}.html"));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(render_html(report).as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), "HTML report written");
    Ok(path)
}
