//! Bill scoring: co-sponsorship, legislative progress and processing speed.

use std::collections::BTreeMap;

use crate::record::Record;
use crate::scoring::{LookupTables, Measure, ScoreKey, Scorer};

pub const TITLE: &str = "title";
pub const PROPOSER: &str = "proposer";
pub const CO_SPONSORS: &str = "co_sponsors";
pub const COMMITTEE: &str = "committee";
pub const STATUS: &str = "status";
pub const PROPOSED_DATE: &str = "proposed_date";
pub const DECIDED_DATE: &str = "decided_date";

const SUPPORT_SATURATION: f64 = 30.0;
const SPEED_HORIZON_DAYS: f64 = 365.0;

/// Status fragments mapped to progress, checked in order. "대안반영폐기"
/// must match before the plain "폐기" entry.
static STATUS_PROGRESS: &[(&str, f64)] = &[
    ("대안반영", 0.75),
    ("가결", 1.0),
    ("공포", 1.0),
    ("passed", 1.0),
    ("부결", 0.0),
    ("폐기", 0.0),
    ("철회", 0.0),
    ("rejected", 0.0),
    ("discarded", 0.0),
    ("withdrawn", 0.0),
    ("심사", 0.5),
    ("위원회", 0.5),
    ("review", 0.5),
    ("계류", 0.25),
    ("접수", 0.25),
    ("pending", 0.25),
];

static SCHEMA: &[ScoreKey] = &[
    ScoreKey { name: "support", cap: 1.0, weight: 0.2 },
    ScoreKey { name: "progress", cap: 1.0, weight: 0.35 },
    ScoreKey { name: "speed", cap: 1.0, weight: 0.2 },
    ScoreKey { name: "topic_relevance", cap: 1.0, weight: 0.25 },
];

pub struct BillScorer;

impl Scorer for BillScorer {
    fn domain(&self) -> &'static str {
        "bill"
    }

    fn schema(&self) -> &'static [ScoreKey] {
        SCHEMA
    }

    fn measure(&self, record: &Record, tables: &LookupTables) -> BTreeMap<&'static str, Measure> {
        let mut out = BTreeMap::new();

        let support = match record.number(CO_SPONSORS) {
            None => Measure::missing(CO_SPONSORS),
            Some(n) if n < 0.0 => Measure::invalid(CO_SPONSORS),
            Some(n) => Measure::known(n / SUPPORT_SATURATION),
        };
        out.insert("support", support);

        let progress = match record.display(STATUS) {
            None => Measure::missing(STATUS),
            Some(status) => status_progress(&status).map_or(Measure::invalid(STATUS), Measure::known),
        };
        out.insert("progress", progress);

        out.insert("speed", processing_speed(record));

        let relevance = match title_of(record) {
            None => Measure::missing(TITLE),
            Some(title) => tables
                .breadth(&title)
                .map_or(Measure::no_baseline(TITLE), Measure::known),
        };
        out.insert("topic_relevance", relevance);

        out
    }
}

/// Progress for a free-text status, or `None` when it matches no known stage.
pub fn status_progress(status: &str) -> Option<f64> {
    let lowered = status.to_lowercase();
    STATUS_PROGRESS
        .iter()
        .find(|(fragment, _)| lowered.contains(fragment))
        .map(|(_, progress)| *progress)
}

/// Days between proposal and decision, or an explicit unknown.
pub fn processing_days(record: &Record) -> Result<i64, Measure> {
    let proposed = record
        .date(PROPOSED_DATE)
        .ok_or_else(|| unknown_date(record, PROPOSED_DATE))?;
    let decided = record
        .date(DECIDED_DATE)
        .ok_or_else(|| unknown_date(record, DECIDED_DATE))?;

    let days = (decided - proposed).num_days();
    if days < 0 {
        return Err(Measure::invalid(DECIDED_DATE));
    }
    Ok(days)
}

fn processing_speed(record: &Record) -> Measure {
    match processing_days(record) {
        Ok(days) => Measure::known(1.0 - days as f64 / SPEED_HORIZON_DAYS),
        Err(unknown) => unknown,
    }
}

// Present-but-unparseable dates are invalid rather than missing.
fn unknown_date(record: &Record, field: &str) -> Measure {
    if record.get(field).is_some() {
        Measure::invalid(field)
    } else {
        Measure::missing(field)
    }
}

/// The bill title, falling back to the record name.
pub fn title_of(record: &Record) -> Option<String> {
    record.display(TITLE).or_else(|| Some(record.name.clone()).filter(|n| !n.is_empty()))
}
