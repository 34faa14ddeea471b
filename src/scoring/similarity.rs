//! Pairwise bill similarity ("connectivity") between records.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

use crate::analyzers::utility::{mean, round_to};
use crate::record::{EntityId, Record};
use crate::scoring::Measure;
use crate::scoring::bill::{COMMITTEE, PROPOSED_DATE, PROPOSER, title_of};

const TITLE_WEIGHT: f64 = 0.4;
const PROPOSER_WEIGHT: f64 = 0.2;
const COMMITTEE_WEIGHT: f64 = 0.2;
const TIMING_WEIGHT: f64 = 0.2;
const TIMING_HORIZON_DAYS: f64 = 365.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillPair {
    pub a: EntityId,
    pub a_name: String,
    pub b: EntityId,
    pub b_name: String,
    pub score: f64,
    pub title_similarity: f64,
    pub same_proposer: bool,
    pub same_committee: bool,
    pub timing: Measure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedSummary {
    pub bills: usize,
    pub pairs_considered: usize,
    pub pairs_kept: usize,
    pub min_score: f64,
    /// Mean score of the kept pairs; `None` when none were kept.
    pub mean_score: Option<f64>,
}

/// Jaccard index of the character bigrams of two titles, whitespace ignored.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let (ga, gb) = (bigrams(a), bigrams(b));
    if ga.is_empty() && gb.is_empty() {
        return 0.0;
    }
    let shared = ga.intersection(&gb).count();
    let union = ga.union(&gb).count();
    shared as f64 / union as f64
}

fn bigrams(text: &str) -> BTreeSet<String> {
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if chars.len() < 2 {
        return chars.iter().map(|c| c.to_string()).collect();
    }
    chars.windows(2).map(|w| w.iter().collect()).collect()
}

fn same_field(a: &Record, b: &Record, field: &str) -> bool {
    match (a.display(field), b.display(field)) {
        (Some(x), Some(y)) => x.trim() == y.trim(),
        _ => false,
    }
}

/// Scores how closely two bills are related.
///
/// The timing term is unknown when either proposal date is missing; the
/// remaining weights are then renormalized instead of assuming a distance.
pub fn bill_similarity(a: &Record, b: &Record) -> BillPair {
    let title = title_similarity(
        &title_of(a).unwrap_or_default(),
        &title_of(b).unwrap_or_default(),
    );
    let same_proposer = same_field(a, b, PROPOSER);
    let same_committee = same_field(a, b, COMMITTEE);

    let timing = match (a.date(PROPOSED_DATE), b.date(PROPOSED_DATE)) {
        (Some(x), Some(y)) => {
            let days = (x - y).num_days().abs() as f64;
            Measure::known(round_to((1.0 - days / TIMING_HORIZON_DAYS).max(0.0), 3))
        }
        (None, _) => Measure::missing(PROPOSED_DATE),
        (_, None) => Measure::missing(PROPOSED_DATE),
    };

    let mut weighted = TITLE_WEIGHT * title
        + PROPOSER_WEIGHT * f64::from(u8::from(same_proposer))
        + COMMITTEE_WEIGHT * f64::from(u8::from(same_committee));
    let mut weight = TITLE_WEIGHT + PROPOSER_WEIGHT + COMMITTEE_WEIGHT;
    if let Some(t) = timing.value() {
        weighted += TIMING_WEIGHT * t;
        weight += TIMING_WEIGHT;
    }

    BillPair {
        a: a.id,
        a_name: a.name.clone(),
        b: b.id,
        b_name: b.name.clone(),
        score: round_to(weighted / weight, 3),
        title_similarity: round_to(title, 3),
        same_proposer,
        same_committee,
        timing,
    }
}

/// Orders pairs best first: higher score, then lower `(a, b)` ids.
struct Ranked(BillPair);

impl Ranked {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then(other.0.a.cmp(&self.0.a))
            .then(other.0.b.cmp(&self.0.b))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_rank(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_rank(other)
    }
}

/// The `top_n` best unordered pairs scoring at least `min_score`, best first.
///
/// Ties are ordered by `(a, b)` entity ids. At most `top_n` pairs are held
/// at any time.
pub fn related_pairs(
    records: &[Record],
    min_score: f64,
    top_n: usize,
) -> (Vec<BillPair>, RelatedSummary) {
    // min-heap on rank: the worst kept pair sits on top
    let mut kept: BinaryHeap<Reverse<Ranked>> = BinaryHeap::new();
    let mut considered = 0;

    for (i, a) in records.iter().enumerate() {
        for b in &records[i + 1..] {
            considered += 1;
            let pair = bill_similarity(a, b);
            if pair.score < min_score {
                continue;
            }
            kept.push(Reverse(Ranked(pair)));
            if kept.len() > top_n {
                kept.pop();
            }
        }
    }

    let pairs: Vec<BillPair> = kept
        .into_sorted_vec()
        .into_iter()
        .map(|Reverse(Ranked(pair))| pair)
        .collect();

    let scores: Vec<f64> = pairs.iter().map(|p| p.score).collect();
    let summary = RelatedSummary {
        bills: records.len(),
        pairs_considered: considered,
        pairs_kept: pairs.len(),
        min_score,
        mean_score: mean(&scores).map(|m| round_to(m, 3)),
    };

    (pairs, summary)
}
