//! Run orchestration: source, records, scores, summary, report, store.
//!
//! A run always ends in one [`RunOutcome`]. Source failures stop the run
//! before anything is written. Every later failure still leaves a report
//! whose metadata carries the failure.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::analyzers::aggregate::aggregate;
use crate::analyzers::types::Summary;
use crate::outcome::{ReasonCode, RunOutcome, Skip};
use crate::output::{ReportDocument, ReportMetadata, rewrite_report, write_html, write_report};
use crate::record::{Identity, RecordSet};
use crate::scoring::similarity::{RelatedSummary, related_pairs};
use crate::scoring::{LookupTables, ScoreBundle, Scorer, TOTAL_KEY, score_record};
use crate::source::{HttpContext, SourceBatch, SourceSpec, read_source};
use crate::store::{OnDuplicate, SaveStats, ScoreStore, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub struct StoreTarget {
    pub path: PathBuf,
    pub on_duplicate: OnDuplicate,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub output_dir: PathBuf,
    /// File name prefix of the report.
    pub report_name: String,
    pub title: String,
    pub top_n: usize,
    /// Score key to rank by; [`TOTAL_KEY`] or a key of the scorer's schema.
    pub rank_by: String,
    pub identity: Identity,
    pub store: Option<StoreTarget>,
    pub html: bool,
    pub gzip: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            report_name: "scores".to_string(),
            title: "Score report".to_string(),
            top_n: 10,
            rank_by: TOTAL_KEY.to_string(),
            identity: Identity::default(),
            store: None,
            html: false,
            gzip: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub report_path: Option<PathBuf>,
    pub html_path: Option<PathBuf>,
    /// `None` only when the source could not be read.
    pub summary: Option<Summary>,
    pub saved: Option<SaveStats>,
}

impl RunResult {
    fn unread(outcome: RunOutcome) -> Self {
        Self {
            outcome,
            report_path: None,
            html_path: None,
            summary: None,
            saved: None,
        }
    }
}

pub struct Pipeline {
    scorer: Box<dyn Scorer>,
    tables: LookupTables,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(scorer: Box<dyn Scorer>, tables: LookupTables, options: PipelineOptions) -> Result<Self> {
        if options.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        let schema = scorer.schema();
        if options.rank_by != TOTAL_KEY && !schema.iter().any(|k| k.name == options.rank_by) {
            let known: Vec<&str> = std::iter::once(TOTAL_KEY)
                .chain(schema.iter().map(|k| k.name))
                .collect();
            bail!(
                "cannot rank {} scores by '{}'; expected one of: {}",
                scorer.domain(),
                options.rank_by,
                known.join(", ")
            );
        }
        Ok(Self {
            scorer,
            tables,
            options,
        })
    }

    /// Reads `source` and processes it. An unreadable source is a failure
    /// with no report.
    #[tracing::instrument(skip_all, fields(domain = self.scorer.domain(), source = %source))]
    pub async fn run(&self, source: &SourceSpec, http: &HttpContext) -> RunResult {
        match read_source(source, http).await {
            Ok(batch) => self.process(batch, &source.to_string()),
            Err(e) => {
                error!(error = %e, "Source read failed");
                RunResult::unread(RunOutcome::failure(e.reason(), e.to_string()))
            }
        }
    }

    /// Scores an already-read batch and writes its report.
    pub fn process(&self, batch: SourceBatch, source: &str) -> RunResult {
        let domain = self.scorer.domain();
        let SourceBatch { rows, mut skipped } = batch;
        info!(rows = rows.len(), skipped = skipped.len(), "Source read");

        let set = RecordSet::from_rows(rows, &self.options.identity);
        // repeated keys only matter when they are persisted
        let persisting = self.options.store.is_some();
        skipped.extend(
            set.skipped
                .iter()
                .filter(|s| persisting || s.reason != ReasonCode::DuplicateKey)
                .cloned(),
        );
        skipped.sort_by_key(|s| s.row);

        let bundles: Vec<ScoreBundle> = set
            .records
            .iter()
            .map(|r| score_record(self.scorer.as_ref(), r, &self.tables))
            .collect();
        debug!(entities = bundles.len(), "Entities scored");

        let summary = aggregate(&bundles, &self.options.rank_by, self.options.top_n);

        let mut outcome = if set.is_empty() {
            warn!("No records to score");
            RunOutcome::failure(ReasonCode::NoRecords, "source yielded no usable records")
        } else {
            RunOutcome::from_skips(skipped)
        };

        let mut ledger = match &self.options.store {
            None => None,
            Some(target) => match open_run(&target.path, domain, source) {
                Ok(ledger) => Some(ledger),
                Err(e) => {
                    error!(error = %e, db = %target.path.display(), "Store unavailable");
                    outcome = store_failure(e);
                    None
                }
            },
        };

        let mut saved = None;
        if let (Some((store, run_id)), Some(target)) = (ledger.as_mut(), &self.options.store) {
            if !set.is_empty() {
                let unique: Vec<ScoreBundle> = bundles
                    .iter()
                    .filter(|b| !set.is_duplicate(b.entity))
                    .cloned()
                    .collect();
                match store.save_bundles(*run_id, domain, &unique, target.on_duplicate) {
                    Ok(stats) => saved = Some(stats),
                    Err(e) => {
                        error!(error = %e, "Store write failed");
                        outcome = store_failure(e);
                    }
                }
            }
        }

        let mut doc = ReportDocument {
            metadata: ReportMetadata::new(&self.options.title, domain, source, outcome.clone()),
            results: bundles,
            summary,
        };
        let report_path = write_or_fail(
            &self.options.output_dir,
            &self.options.report_name,
            &doc,
            self.options.gzip,
            &mut outcome,
        );

        let mut html_path = None;
        if let (true, Some(json_path)) = (self.options.html, &report_path) {
            match write_html(json_path, &doc) {
                Ok(path) => html_path = Some(path),
                Err(e) => {
                    error!(error = ?e, "HTML report failed");
                    outcome = RunOutcome::failure(ReasonCode::ReportFailed, format!("{e:#}"));
                    doc.metadata.outcome = outcome.clone();
                    if let Err(e) = rewrite_report(json_path, &doc) {
                        warn!(error = ?e, "Could not record HTML failure in report");
                    }
                }
            }
        }

        if let Some((store, run_id)) = &ledger {
            if let Err(e) = store.finish_run(*run_id, &outcome, report_path.as_deref()) {
                warn!(error = %e, run_id, "Could not close run log entry");
            }
        }

        info!(outcome = outcome.label(), entities = set.len(), "Run finished");

        RunResult {
            outcome,
            report_path,
            html_path,
            summary: Some(doc.summary),
            saved,
        }
    }
}

fn open_run(path: &Path, domain: &str, source: &str) -> Result<(ScoreStore, i64), StoreError> {
    let store = ScoreStore::open(path)?;
    let run_id = store.begin_run(domain, source)?;
    debug!(run_id, "Run logged");
    Ok((store, run_id))
}

fn store_failure(e: StoreError) -> RunOutcome {
    let reason = match e {
        StoreError::DuplicateKey { .. } => ReasonCode::DuplicateKey,
        _ => ReasonCode::StoreFailed,
    };
    RunOutcome::failure(reason, e.to_string())
}

/// Writes the report; a write error turns `outcome` into `ReportFailed`.
fn write_or_fail<R, S>(
    dir: &Path,
    name: &str,
    doc: &ReportDocument<R, S>,
    gzip: bool,
    outcome: &mut RunOutcome,
) -> Option<PathBuf>
where
    R: serde::Serialize,
    S: serde::Serialize,
{
    match write_report(dir, name, doc, gzip) {
        Ok(path) => Some(path),
        Err(e) => {
            error!(error = ?e, "Report write failed");
            *outcome = RunOutcome::failure(ReasonCode::ReportFailed, format!("{e:#}"));
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelatedOptions {
    pub output_dir: PathBuf,
    pub report_name: String,
    pub title: String,
    pub min_score: f64,
    pub top_n: usize,
    pub identity: Identity,
    pub gzip: bool,
}

impl Default for RelatedOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            report_name: "related_bills".to_string(),
            title: "Related bills".to_string(),
            min_score: 0.3,
            top_n: 20,
            identity: Identity::default(),
            gzip: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedResult {
    pub outcome: RunOutcome,
    pub report_path: Option<PathBuf>,
    pub summary: Option<RelatedSummary>,
}

/// Reads bills from `source` and reports the most closely related pairs.
#[tracing::instrument(skip_all, fields(source = %source, min_score = options.min_score))]
pub async fn run_related(source: &SourceSpec, http: &HttpContext, options: &RelatedOptions) -> RelatedResult {
    match read_source(source, http).await {
        Ok(batch) => process_related(batch, &source.to_string(), options),
        Err(e) => {
            error!(error = %e, "Source read failed");
            RelatedResult {
                outcome: RunOutcome::failure(e.reason(), e.to_string()),
                report_path: None,
                summary: None,
            }
        }
    }
}

pub fn process_related(batch: SourceBatch, source: &str, options: &RelatedOptions) -> RelatedResult {
    let SourceBatch { rows, mut skipped } = batch;
    let set = RecordSet::from_rows(rows, &options.identity);
    skipped.extend(
        set.skipped
            .iter()
            .filter(|s| s.reason != ReasonCode::DuplicateKey)
            .cloned(),
    );
    skipped.sort_by_key(|s: &Skip| s.row);

    let (pairs, summary) = related_pairs(&set.records, options.min_score, options.top_n);
    info!(
        bills = summary.bills,
        considered = summary.pairs_considered,
        kept = summary.pairs_kept,
        "Bill pairs compared"
    );

    let mut outcome = if set.is_empty() {
        RunOutcome::failure(ReasonCode::NoRecords, "source yielded no usable records")
    } else {
        RunOutcome::from_skips(skipped)
    };

    let doc = ReportDocument {
        metadata: ReportMetadata::new(&options.title, "bill", source, outcome.clone()),
        results: pairs,
        summary,
    };
    let report_path = write_or_fail(
        &options.output_dir,
        &options.report_name,
        &doc,
        options.gzip,
        &mut outcome,
    );

    RelatedResult {
        outcome,
        report_path,
        summary: Some(doc.summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{ScoreReport, read_report};
    use crate::scoring::Domain;
    use crate::source::parse_csv;

    const MEMBERS: &str = "\
code,name,bills_proposed,bills_passed,attendance_rate,committee
A01,홍길동,10,5,90,기획재정위원회
A02,이순신,20,4,80,환경노동위원회
A03,홍길동,30,30,100,교육위원회
";

    fn batch(text: &str) -> SourceBatch {
        parse_csv(Path::new("members.csv"), text).unwrap()
    }

    fn pipeline(dir: &Path, store: Option<StoreTarget>) -> Pipeline {
        let options = PipelineOptions {
            output_dir: dir.to_path_buf(),
            store,
            ..PipelineOptions::default()
        };
        Pipeline::new(Domain::Legislative.scorer(), LookupTables::default(), options).unwrap()
    }

    #[test]
    fn test_clean_run_writes_report() {
        let dir = tempfile::tempdir().unwrap();

        let result = pipeline(dir.path(), None).process(batch(MEMBERS), "csv:members.csv");

        assert_eq!(result.outcome, RunOutcome::Success);
        let report: ScoreReport = read_report(result.report_path.as_ref().unwrap()).unwrap();
        assert_eq!(report.results.len(), 3);
        assert_eq!(report.metadata.outcome, RunOutcome::Success);
        let stats = report.summary.stats().unwrap();
        assert_eq!(stats.entity_count, 3);
        // homonyms stay separate entities
        assert_eq!(stats.top.iter().filter(|e| e.name == "홍길동").count(), 2);
    }

    #[test]
    fn test_nameless_row_makes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!("{MEMBERS}A04,,5,1,70,\n");

        let result = pipeline(dir.path(), None).process(batch(&text), "csv:members.csv");

        match &result.outcome {
            RunOutcome::Partial { skipped } => {
                assert_eq!(skipped.len(), 1);
                assert_eq!(skipped[0].row, 3);
                assert_eq!(skipped[0].reason, ReasonCode::MissingIdentity);
            }
            other => panic!("expected partial, got {other:?}"),
        }
        assert_eq!(result.outcome.exit_code(), 2);
    }

    #[test]
    fn test_empty_source_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();

        let result = pipeline(dir.path(), None).process(SourceBatch::default(), "csv:empty.csv");

        assert!(matches!(
            result.outcome,
            RunOutcome::Failure { reason: ReasonCode::NoRecords, .. }
        ));
        assert_eq!(result.summary, Some(Summary::NoData));
        let report: ScoreReport = read_report(result.report_path.as_ref().unwrap()).unwrap();
        assert_eq!(report.summary, Summary::NoData);
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_unknown_rank_key_is_rejected() {
        let options = PipelineOptions {
            rank_by: "popularity".to_string(),
            ..PipelineOptions::default()
        };

        assert!(Pipeline::new(Domain::Legislative.scorer(), LookupTables::default(), options).is_err());
    }

    #[test]
    fn test_rank_by_sub_score() {
        let dir = tempfile::tempdir().unwrap();
        let options = PipelineOptions {
            output_dir: dir.path().to_path_buf(),
            rank_by: "activity".to_string(),
            ..PipelineOptions::default()
        };
        let pipeline =
            Pipeline::new(Domain::Legislative.scorer(), LookupTables::default(), options).unwrap();

        let result = pipeline.process(batch(MEMBERS), "csv:members.csv");
        let summary = result.summary.unwrap();
        let top = &summary.stats().unwrap().top;

        assert_eq!(top[0].key, "A03");
        assert_eq!(top[0].value, 0.6);
    }

    #[test]
    fn test_reject_duplicate_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let target = StoreTarget {
            path: dir.path().join("scores.sqlite"),
            on_duplicate: OnDuplicate::Reject,
        };
        let pipeline = pipeline(dir.path(), Some(target.clone()));

        let first = pipeline.process(batch(MEMBERS), "csv:members.csv");
        let second = pipeline.process(batch(MEMBERS), "csv:members.csv");

        assert_eq!(first.saved, Some(SaveStats { inserted: 3, updated: 0 }));
        match &second.outcome {
            RunOutcome::Failure { reason, message } => {
                assert_eq!(*reason, ReasonCode::DuplicateKey);
                assert!(message.contains("A01"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(second.report_path.is_some());

        let store = ScoreStore::open(&target.path).unwrap();
        let runs = store.list_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].outcome.as_deref(), Some("failure"));
        assert_eq!(runs[1].outcome.as_deref(), Some("success"));
    }

    #[test]
    fn test_duplicate_key_in_one_run_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let target = StoreTarget {
            path: dir.path().join("scores.sqlite"),
            on_duplicate: OnDuplicate::Upsert,
        };
        let text = format!("{MEMBERS}A01,홍길동,1,1,50,\n");

        let result = pipeline(dir.path(), Some(target.clone())).process(batch(&text), "csv:members.csv");

        assert_eq!(result.saved, Some(SaveStats { inserted: 3, updated: 0 }));
        match &result.outcome {
            RunOutcome::Partial { skipped } => {
                assert_eq!(skipped[0].reason, ReasonCode::DuplicateKey)
            }
            other => panic!("expected partial, got {other:?}"),
        }
        let report: ScoreReport = read_report(result.report_path.as_ref().unwrap()).unwrap();
        assert_eq!(report.results.len(), 4);
    }

    #[test]
    fn test_duplicate_key_without_store_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!("{MEMBERS}A01,홍길동,1,1,50,\n");

        let result = pipeline(dir.path(), None).process(batch(&text), "csv:members.csv");

        assert_eq!(result.outcome, RunOutcome::Success);
    }

    #[tokio::test]
    async fn test_unreadable_source_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let spec = SourceSpec::Csv {
            path: dir.path().join("missing.csv"),
        };

        let result = pipeline(&out, None).run(&spec, &HttpContext::default()).await;

        assert!(matches!(
            result.outcome,
            RunOutcome::Failure { reason: ReasonCode::SourceUnreadable, .. }
        ));
        assert_eq!(result.report_path, None);
        assert!(!out.exists());
    }

    #[test]
    fn test_html_written_next_to_report() {
        let dir = tempfile::tempdir().unwrap();
        let options = PipelineOptions {
            output_dir: dir.path().to_path_buf(),
            html: true,
            ..PipelineOptions::default()
        };
        let pipeline =
            Pipeline::new(Domain::Legislative.scorer(), LookupTables::default(), options).unwrap();

        let result = pipeline.process(batch(MEMBERS), "csv:members.csv");

        let html = result.html_path.unwrap();
        assert_eq!(html.parent(), result.report_path.as_deref().and_then(Path::parent));
        assert!(std::fs::read_to_string(html).unwrap().contains("이순신"));
    }

    #[test]
    fn test_html_failure_is_recorded_in_report() {
        let dir = tempfile::tempdir().unwrap();
        let options = PipelineOptions {
            output_dir: dir.path().to_path_buf(),
            html: true,
            ..PipelineOptions::default()
        };
        // occupy the HTML names for the next few seconds with directories
        let start = chrono::Utc::now();
        for offset in 0..30 {
            let at = start + chrono::Duration::seconds(offset);
            let json = crate::output::report_file_name(&options.report_name, at, 0, false);
            let stem = json.trim_end_matches(".json");
            std::fs::create_dir(dir.path().join(format!("{stem}.html"))).unwrap();
        }
        let pipeline =
            Pipeline::new(Domain::Legislative.scorer(), LookupTables::default(), options).unwrap();

        let result = pipeline.process(batch(MEMBERS), "csv:members.csv");

        assert!(matches!(
            result.outcome,
            RunOutcome::Failure {
                reason: ReasonCode::ReportFailed,
                ..
            }
        ));
        assert_eq!(result.html_path, None);
        let report: ScoreReport = read_report(result.report_path.as_ref().unwrap()).unwrap();
        assert_eq!(report.metadata.outcome, result.outcome);
        assert_eq!(report.results.len(), 3);
    }

    #[test]
    fn test_related_report() {
        let dir = tempfile::tempdir().unwrap();
        let text = "\
code,name,proposer,committee,proposed_date
B1,청년기본법 일부개정법률안,김의원,정무위원회,2024-01-10
B2,청년기본법 일부개정법률안,김의원,정무위원회,2024-01-20
B3,도로교통법 일부개정법률안,박의원,국토교통위원회,2023-02-01
";
        let options = RelatedOptions {
            output_dir: dir.path().to_path_buf(),
            min_score: 0.8,
            ..RelatedOptions::default()
        };

        let result = process_related(batch(text), "csv:bills.csv", &options);

        assert_eq!(result.outcome, RunOutcome::Success);
        let summary = result.summary.unwrap();
        assert_eq!(summary.pairs_considered, 3);
        assert_eq!(summary.pairs_kept, 1);
        assert!(result.report_path.unwrap().exists());
    }
}
