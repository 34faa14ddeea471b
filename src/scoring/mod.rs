//! Per-entity scoring.
//!
//! A [`Scorer`] is a strategy object for one domain: it declares a fixed
//! schema of [`ScoreKey`]s and measures a [`Record`] against it.
//! [`score_record`] enforces the schema so every bundle in a run has the same
//! key set, every value sits inside its cap, and missing inputs stay
//! [`Measure::Unknown`] instead of turning into a number.

pub mod bill;
pub mod keywords;
pub mod legislative;
pub mod regional;
pub mod similarity;

pub use keywords::LookupTables;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::analyzers::grade::Grade;
use crate::analyzers::utility::round_to;
use crate::record::{EntityId, Record};

/// Name under which the weighted total is reported and ranked.
pub const TOTAL_KEY: &str = "total";
/// Totals are scaled to `[0, TOTAL_CAP]`.
pub const TOTAL_CAP: f64 = 100.0;
/// Share of schema weight that must be known before a total is produced.
pub const MIN_COVERAGE: f64 = 0.5;

const SCORE_PLACES: i32 = 3;
const TOTAL_PLACES: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// The input field is absent or null.
    Missing,
    /// The input field is present but out of range or unparseable.
    Invalid,
    /// The ratio's denominator is zero.
    NoBaseline,
    /// Too few sub-scores are known to form a total.
    InsufficientData,
}

impl UnknownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownReason::Missing => "missing",
            UnknownReason::Invalid => "invalid",
            UnknownReason::NoBaseline => "no_baseline",
            UnknownReason::InsufficientData => "insufficient_data",
        }
    }
}

/// A sub-score that is either known or explicitly absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Measure {
    Known { value: f64 },
    Unknown { field: String, reason: UnknownReason },
}

impl Measure {
    pub fn known(value: f64) -> Self {
        Measure::Known { value }
    }

    pub fn unknown(field: &str, reason: UnknownReason) -> Self {
        Measure::Unknown {
            field: field.to_string(),
            reason,
        }
    }

    pub fn missing(field: &str) -> Self {
        Self::unknown(field, UnknownReason::Missing)
    }

    pub fn invalid(field: &str) -> Self {
        Self::unknown(field, UnknownReason::Invalid)
    }

    pub fn no_baseline(field: &str) -> Self {
        Self::unknown(field, UnknownReason::NoBaseline)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Measure::Known { value } => Some(*value),
            Measure::Unknown { .. } => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Measure::Known { .. })
    }
}

/// One entry of a domain's fixed score schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreKey {
    pub name: &'static str,
    /// Upper clamp for the sub-score; the lower bound is always 0.
    pub cap: f64,
    /// Weight in the total.
    pub weight: f64,
}

/// Strategy for scoring one domain's entities.
pub trait Scorer: Send + Sync {
    fn domain(&self) -> &'static str;

    fn schema(&self) -> &'static [ScoreKey];

    /// Raw sub-scores for `record`. Keys outside [`Scorer::schema`] are
    /// ignored and schema keys left out are reported as missing.
    fn measure(&self, record: &Record, tables: &LookupTables) -> BTreeMap<&'static str, Measure>;
}

/// Named sub-scores plus the derived total for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBundle {
    pub entity: EntityId,
    pub key: String,
    pub name: String,
    pub scores: BTreeMap<String, Measure>,
    pub total: Measure,
    /// Share of schema weight backed by known sub-scores.
    pub coverage: f64,
    pub grade: Option<Grade>,
}

impl ScoreBundle {
    /// Looks up a sub-score by name; [`TOTAL_KEY`] returns the total.
    pub fn measure(&self, key: &str) -> Option<&Measure> {
        if key == TOTAL_KEY {
            Some(&self.total)
        } else {
            self.scores.get(key)
        }
    }
}

/// Scores one record under `scorer`'s schema.
pub fn score_record(scorer: &dyn Scorer, record: &Record, tables: &LookupTables) -> ScoreBundle {
    let mut raw = scorer.measure(record, tables);

    let mut scores = BTreeMap::new();
    let mut weighted = 0.0;
    let mut known_weight = 0.0;
    let mut schema_weight = 0.0;

    for key in scorer.schema() {
        schema_weight += key.weight;

        let measure = match raw.remove(key.name) {
            Some(Measure::Known { value }) => settle(value, key),
            Some(unknown) => unknown,
            None => Measure::missing(key.name),
        };

        if let Some(value) = measure.value() {
            weighted += key.weight * value / key.cap;
            known_weight += key.weight;
        }

        scores.insert(key.name.to_string(), measure);
    }

    let coverage = if schema_weight > 0.0 {
        known_weight / schema_weight
    } else {
        0.0
    };

    let total = if known_weight > 0.0 && coverage >= MIN_COVERAGE {
        Measure::known(round_to(TOTAL_CAP * weighted / known_weight, TOTAL_PLACES))
    } else {
        Measure::unknown(TOTAL_KEY, UnknownReason::InsufficientData)
    };
    let grade = total.value().map(|v| Grade::from_ratio(v / TOTAL_CAP));

    ScoreBundle {
        entity: record.id,
        key: record.key.clone(),
        name: record.name.clone(),
        scores,
        total,
        coverage: round_to(coverage, SCORE_PLACES),
        grade,
    }
}

fn settle(value: f64, key: &ScoreKey) -> Measure {
    if !value.is_finite() {
        return Measure::invalid(key.name);
    }
    Measure::known(round_to(value.clamp(0.0, key.cap), SCORE_PLACES))
}

/// Domains with a built-in scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Domain {
    /// Politicians: legislative productivity and activity.
    Legislative,
    /// Districts: demographic and turnout indicators.
    Regional,
    /// Bills: support, progress and processing speed.
    Bill,
}

impl Domain {
    pub fn scorer(self) -> Box<dyn Scorer> {
        match self {
            Domain::Legislative => Box::new(legislative::LegislativeScorer),
            Domain::Regional => Box::new(regional::RegionalScorer),
            Domain::Bill => Box::new(bill::BillScorer),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Legislative => "legislative",
            Domain::Regional => "regional",
            Domain::Bill => "bill",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `numerator / denominator` with explicit unknowns for absent inputs,
/// negative values and a zero denominator.
pub(crate) fn ratio(
    record: &Record,
    numerator_field: &str,
    denominator_field: &str,
) -> Measure {
    let Some(denominator) = record.number(denominator_field) else {
        return Measure::missing(denominator_field);
    };
    let Some(numerator) = record.number(numerator_field) else {
        return Measure::missing(numerator_field);
    };
    if denominator < 0.0 {
        return Measure::invalid(denominator_field);
    }
    if numerator < 0.0 {
        return Measure::invalid(numerator_field);
    }
    if denominator == 0.0 {
        return Measure::no_baseline(denominator_field);
    }
    Measure::known(numerator / denominator)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::record::{EntityId, Record, Scalar};

    pub fn record(pairs: &[(&str, &str)]) -> Record {
        Record {
            id: EntityId(0),
            key: "K0".to_string(),
            name: "테스트".to_string(),
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), Scalar::from_text(v)))
                .collect(),
        }
    }
}
