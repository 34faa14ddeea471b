//! District scoring from demographic and turnout figures.

use std::collections::BTreeMap;

use crate::record::Record;
use crate::scoring::{LookupTables, Measure, ScoreKey, Scorer, ratio};

pub const POPULATION: &str = "population";
pub const YOUTH_POPULATION: &str = "youth_population";
pub const ELDERLY_POPULATION: &str = "elderly_population";
pub const TURNOUT: &str = "turnout";

const SCALE_SATURATION: f64 = 1_000_000.0;

static SCHEMA: &[ScoreKey] = &[
    ScoreKey { name: "youth_share", cap: 1.0, weight: 0.3 },
    ScoreKey { name: "vitality", cap: 1.0, weight: 0.3 },
    ScoreKey { name: "turnout", cap: 1.0, weight: 0.25 },
    ScoreKey { name: "scale", cap: 1.0, weight: 0.15 },
];

pub struct RegionalScorer;

impl Scorer for RegionalScorer {
    fn domain(&self) -> &'static str {
        "regional"
    }

    fn schema(&self) -> &'static [ScoreKey] {
        SCHEMA
    }

    fn measure(&self, record: &Record, _tables: &LookupTables) -> BTreeMap<&'static str, Measure> {
        let mut out = BTreeMap::new();

        out.insert("youth_share", share(record, YOUTH_POPULATION));

        let vitality = match share(record, ELDERLY_POPULATION) {
            Measure::Known { value } => Measure::known(1.0 - value),
            unknown => unknown,
        };
        out.insert("vitality", vitality);

        let turnout = match record.number(TURNOUT) {
            None => Measure::missing(TURNOUT),
            Some(t) if !(0.0..=100.0).contains(&t) => Measure::invalid(TURNOUT),
            Some(t) => Measure::known(t / 100.0),
        };
        out.insert("turnout", turnout);

        let scale = match record.number(POPULATION) {
            None => Measure::missing(POPULATION),
            Some(p) if p < 0.0 => Measure::invalid(POPULATION),
            Some(p) => Measure::known(p / SCALE_SATURATION),
        };
        out.insert("scale", scale);

        out
    }
}

/// Part of the population; a part larger than the whole is invalid.
fn share(record: &Record, part_field: &str) -> Measure {
    match ratio(record, part_field, POPULATION) {
        Measure::Known { value } if value > 1.0 => Measure::invalid(part_field),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::record;
    use crate::scoring::{UnknownReason, score_record};

    #[test]
    fn test_district_scores() {
        let r = record(&[
            (POPULATION, "250,000"),
            (YOUTH_POPULATION, "50,000"),
            (ELDERLY_POPULATION, "75,000"),
            (TURNOUT, "66.1"),
        ]);

        let bundle = score_record(&RegionalScorer, &r, &LookupTables::default());

        assert_eq!(bundle.scores["youth_share"], Measure::known(0.2));
        assert_eq!(bundle.scores["vitality"], Measure::known(0.7));
        assert_eq!(bundle.scores["turnout"], Measure::known(0.661));
        assert_eq!(bundle.scores["scale"], Measure::known(0.25));
    }

    #[test]
    fn test_part_exceeding_population_is_invalid() {
        let r = record(&[(POPULATION, "100"), (YOUTH_POPULATION, "150")]);

        let bundle = score_record(&RegionalScorer, &r, &LookupTables::default());

        assert_eq!(
            bundle.scores["youth_share"],
            Measure::unknown(YOUTH_POPULATION, UnknownReason::Invalid)
        );
    }

    #[test]
    fn test_empty_district_has_no_baseline() {
        let r = record(&[(POPULATION, "0"), (ELDERLY_POPULATION, "0")]);

        let bundle = score_record(&RegionalScorer, &r, &LookupTables::default());

        assert_eq!(bundle.scores["vitality"], Measure::no_baseline(POPULATION));
        assert_eq!(bundle.scores["scale"], Measure::known(0.0));
    }
}
