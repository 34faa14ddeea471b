//! Data types produced by the aggregation stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::analyzers::grade::Grade;
use crate::record::EntityId;

/// Statistics for one score key across the population.
///
/// The numeric fields are `None` when no entity had a known value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStats {
    pub known: usize,
    pub unknown: usize,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One row of the top-N ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankEntry {
    pub rank: usize,
    pub entity: EntityId,
    pub key: String,
    pub name: String,
    pub value: f64,
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub entity_count: usize,
    /// Entities with a known total.
    pub scored_count: usize,
    pub unscored_count: usize,
    pub rank_by: String,
    pub keys: BTreeMap<String, KeyStats>,
    pub top: Vec<RankEntry>,
    /// Count per grade label; every label is present, zero or not.
    pub grades: BTreeMap<String, usize>,
}

/// Aggregate result for a run. Empty input is `NoData`, never zeroed stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Summary {
    NoData,
    #[serde(rename = "ok")]
    Stats(AggregateStats),
}

impl Summary {
    pub fn stats(&self) -> Option<&AggregateStats> {
        match self {
            Summary::NoData => None,
            Summary::Stats(stats) => Some(stats),
        }
    }
}
