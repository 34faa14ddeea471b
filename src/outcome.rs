//! Run outcome reporting.
//!
//! Every pipeline run ends in exactly one [`RunOutcome`]. Rows that could not
//! be used are listed individually as [`Skip`]s so a partial run is never
//! reported as a clean one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable reason attached to skips and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    SourceUnreadable,
    UnsupportedEncoding,
    MalformedRow,
    MissingIdentity,
    DuplicateKey,
    NoRecords,
    StoreFailed,
    ReportFailed,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReasonCode::SourceUnreadable => "source_unreadable",
            ReasonCode::UnsupportedEncoding => "unsupported_encoding",
            ReasonCode::MalformedRow => "malformed_row",
            ReasonCode::MissingIdentity => "missing_identity",
            ReasonCode::DuplicateKey => "duplicate_key",
            ReasonCode::NoRecords => "no_records",
            ReasonCode::StoreFailed => "store_failed",
            ReasonCode::ReportFailed => "report_failed",
        };
        f.write_str(s)
    }
}

/// A single source row that did not make it through the pipeline.
///
/// `row` is the zero-based position in the source batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skip {
    pub row: usize,
    pub reason: ReasonCode,
    pub detail: String,
}

impl Skip {
    pub fn new(row: usize, reason: ReasonCode, detail: impl Into<String>) -> Self {
        Self {
            row,
            reason,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Partial { skipped: Vec<Skip> },
    Failure { reason: ReasonCode, message: String },
}

impl RunOutcome {
    /// Builds `Success` or `Partial` depending on whether anything was skipped.
    pub fn from_skips(skipped: Vec<Skip>) -> Self {
        if skipped.is_empty() {
            RunOutcome::Success
        } else {
            RunOutcome::Partial { skipped }
        }
    }

    pub fn failure(reason: ReasonCode, message: impl Into<String>) -> Self {
        RunOutcome::Failure {
            reason,
            message: message.into(),
        }
    }

    /// Process exit code for the CLI: 0 success, 2 partial, 1 failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Partial { .. } => 2,
            RunOutcome::Failure { .. } => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial { .. } => "partial",
            RunOutcome::Failure { .. } => "failure",
        }
    }
}
