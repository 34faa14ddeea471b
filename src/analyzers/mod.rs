//! Population-level aggregation and grading.
//!
//! Folds per-entity [`ScoreBundle`](crate::scoring::ScoreBundle)s into a
//! [`Summary`](types::Summary): per-key means and spreads, a top-N ranking
//! with a fixed tie-break, and grade distribution counts.

pub mod aggregate;
pub mod grade;
pub mod types;
pub mod utility;
