use crate::analyzers::grade::Grade;
use crate::analyzers::types::{AggregateStats, KeyStats, RankEntry, Summary};
use crate::analyzers::utility::{mean, round_to, stddev};
use crate::scoring::{ScoreBundle, TOTAL_KEY};
use std::collections::{BTreeMap, BTreeSet};

/// Decimal places kept for aggregate statistics.
const STAT_PLACES: i32 = 3;

/// Aggregates per-entity [`ScoreBundle`]s into a [`Summary`].
///
/// Returns [`Summary::NoData`] for an empty slice. The ranking is by
/// `rank_by` descending; ties go to the lower [`EntityId`](crate::record::EntityId),
/// so the same input always produces the same summary. Entities whose
/// `rank_by` value is unknown are left out of the ranking.
pub fn aggregate(bundles: &[ScoreBundle], rank_by: &str, top_n: usize) -> Summary {
    if bundles.is_empty() {
        return Summary::NoData;
    }

    let mut key_names: BTreeSet<&str> = BTreeSet::new();
    key_names.insert(TOTAL_KEY);
    for bundle in bundles {
        key_names.extend(bundle.scores.keys().map(String::as_str));
    }

    let mut keys = BTreeMap::new();
    for name in key_names {
        let values: Vec<f64> = bundles
            .iter()
            .filter_map(|b| b.measure(name).and_then(|m| m.value()))
            .collect();
        keys.insert(name.to_string(), key_stats(&values, bundles.len()));
    }

    let mut ranked: Vec<(&ScoreBundle, f64)> = bundles
        .iter()
        .filter_map(|b| b.measure(rank_by).and_then(|m| m.value()).map(|v| (b, v)))
        .collect();
    ranked.sort_by(|(a, av), (b, bv)| bv.total_cmp(av).then(a.entity.cmp(&b.entity)));

    let top = ranked
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, (bundle, value))| RankEntry {
            rank: i + 1,
            entity: bundle.entity,
            key: bundle.key.clone(),
            name: bundle.name.clone(),
            value,
            grade: bundle.grade,
        })
        .collect();

    let mut grades: BTreeMap<String, usize> =
        Grade::ALL.iter().map(|g| (g.as_str().to_string(), 0)).collect();
    for grade in bundles.iter().filter_map(|b| b.grade) {
        *grades.entry(grade.as_str().to_string()).or_default() += 1;
    }

    let scored_count = bundles.iter().filter(|b| b.total.is_known()).count();

    Summary::Stats(AggregateStats {
        entity_count: bundles.len(),
        scored_count,
        unscored_count: bundles.len() - scored_count,
        rank_by: rank_by.to_string(),
        keys,
        top,
        grades,
    })
}

fn key_stats(values: &[f64], population: usize) -> KeyStats {
    let avg = mean(values);
    let sd = avg.and_then(|m| stddev(values, m));
    let min = values.iter().copied().reduce(f64::min);
    let max = values.iter().copied().reduce(f64::max);

    KeyStats {
        known: values.len(),
        unknown: population - values.len(),
        mean: avg.map(|v| round_to(v, STAT_PLACES)),
        stddev: sd.map(|v| round_to(v, STAT_PLACES)),
        min,
        max,
    }
}
