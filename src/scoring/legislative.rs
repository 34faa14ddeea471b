//! Politician scoring from legislative activity records.

use std::collections::BTreeMap;

use crate::record::Record;
use crate::scoring::{LookupTables, Measure, ScoreKey, Scorer, ratio};

pub const BILLS_PROPOSED: &str = "bills_proposed";
pub const BILLS_PASSED: &str = "bills_passed";
pub const ATTENDANCE_RATE: &str = "attendance_rate";
pub const ACTIVITY: &str = "activity";
pub const COMMITTEE: &str = "committee";

/// Proposals at which the activity sub-score saturates.
const ACTIVITY_SATURATION: f64 = 50.0;

static SCHEMA: &[ScoreKey] = &[
    ScoreKey { name: "productivity", cap: 1.0, weight: 0.3 },
    ScoreKey { name: "activity", cap: 1.0, weight: 0.2 },
    ScoreKey { name: "attendance", cap: 1.0, weight: 0.3 },
    ScoreKey { name: "policy_breadth", cap: 1.0, weight: 0.2 },
];

pub struct LegislativeScorer;

impl Scorer for LegislativeScorer {
    fn domain(&self) -> &'static str {
        "legislative"
    }

    fn schema(&self) -> &'static [ScoreKey] {
        SCHEMA
    }

    fn measure(&self, record: &Record, tables: &LookupTables) -> BTreeMap<&'static str, Measure> {
        let mut out = BTreeMap::new();

        out.insert("productivity", ratio(record, BILLS_PASSED, BILLS_PROPOSED));

        let activity = match record.number(BILLS_PROPOSED) {
            None => Measure::missing(BILLS_PROPOSED),
            Some(n) if n < 0.0 => Measure::invalid(BILLS_PROPOSED),
            Some(n) => Measure::known(n / ACTIVITY_SATURATION),
        };
        out.insert("activity", activity);

        let attendance = match record.number(ATTENDANCE_RATE) {
            None => Measure::missing(ATTENDANCE_RATE),
            Some(rate) if !(0.0..=100.0).contains(&rate) => Measure::invalid(ATTENDANCE_RATE),
            Some(rate) => Measure::known(rate / 100.0),
        };
        out.insert("attendance", attendance);

        let text: Vec<String> = [ACTIVITY, COMMITTEE]
            .iter()
            .filter_map(|f| record.display(f))
            .collect();
        let breadth = if text.is_empty() {
            Measure::missing(ACTIVITY)
        } else {
            tables
                .breadth(&text.join(" "))
                .map_or(Measure::no_baseline(ACTIVITY), Measure::known)
        };
        out.insert("policy_breadth", breadth);

        out
    }
}
