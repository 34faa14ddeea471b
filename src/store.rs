//! SQLite persistence for score bundles and the run log.
//!
//! Entities get an integer surrogate key. The natural key (code or name) is
//! unique per domain, and a second write under the same natural key is either
//! an explicit in-place update or a [`StoreError::DuplicateKey`], depending on
//! [`OnDuplicate`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::outcome::RunOutcome;
use crate::scoring::{Measure, ScoreBundle, TOTAL_KEY};

/// On-disk schema version, kept in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS runs (
  run_id INTEGER PRIMARY KEY AUTOINCREMENT,
  domain TEXT NOT NULL,
  source TEXT NOT NULL,
  started_at TEXT NOT NULL,
  finished_at TEXT,
  outcome TEXT,
  report_path TEXT
);

CREATE TABLE IF NOT EXISTS entities (
  entity_id INTEGER PRIMARY KEY AUTOINCREMENT,
  domain TEXT NOT NULL,
  natural_key TEXT NOT NULL,
  name TEXT NOT NULL,
  run_id INTEGER REFERENCES runs(run_id),
  UNIQUE(domain, natural_key)
);

CREATE TABLE IF NOT EXISTS scores (
  entity_id INTEGER NOT NULL REFERENCES entities(entity_id) ON DELETE CASCADE,
  score_key TEXT NOT NULL,
  value REAL,
  unknown_reason TEXT,
  PRIMARY KEY (entity_id, score_key),
  CHECK ((value IS NULL) <> (unknown_reason IS NULL))
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate key '{key}' in domain '{domain}'")]
    DuplicateKey { domain: String, key: String },

    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// What to do when a natural key is already stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OnDuplicate {
    /// Replace the stored name and scores in place.
    #[default]
    Upsert,
    /// Fail the whole batch with `DuplicateKey`.
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    pub inserted: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub run_id: i64,
    pub domain: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<String>,
    pub report_path: Option<String>,
}

/// A stored sub-score: `Ok(value)` or `Err(unknown_reason)`.
pub type StoredScore = Result<f64, String>;

pub struct ScoreStore {
    conn: Connection,
}

impl ScoreStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let found: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found,
                supported: SCHEMA_VERSION,
            });
        }
        if found < SCHEMA_VERSION {
            conn.execute_batch(SCHEMA_V1)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            debug!(from = found, to = SCHEMA_VERSION, "store schema migrated");
        }

        Ok(Self { conn })
    }

    pub fn begin_run(&self, domain: &str, source: &str) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO runs (domain, source, started_at) VALUES (?1, ?2, ?3)",
            params![domain, source, Utc::now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        outcome: &RunOutcome,
        report_path: Option<&Path>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE runs SET finished_at = ?1, outcome = ?2, report_path = ?3 WHERE run_id = ?4",
            params![
                Utc::now(),
                outcome.label(),
                report_path.map(|p| p.display().to_string()),
                run_id
            ],
        )?;
        Ok(())
    }

    /// Writes `bundles` in one transaction. Under [`OnDuplicate::Reject`] the
    /// first stored key aborts the batch and nothing is written.
    pub fn save_bundles(
        &mut self,
        run_id: i64,
        domain: &str,
        bundles: &[ScoreBundle],
        on_duplicate: OnDuplicate,
    ) -> Result<SaveStats, StoreError> {
        let tx = self.conn.transaction()?;
        let mut stats = SaveStats::default();

        for bundle in bundles {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT entity_id FROM entities WHERE domain = ?1 AND natural_key = ?2",
                    params![domain, bundle.key],
                    |row| row.get(0),
                )
                .optional()?;

            let entity_id = match (existing, on_duplicate) {
                (Some(_), OnDuplicate::Reject) => {
                    return Err(StoreError::DuplicateKey {
                        domain: domain.to_string(),
                        key: bundle.key.clone(),
                    });
                }
                (Some(entity_id), OnDuplicate::Upsert) => {
                    tx.execute(
                        "UPDATE entities SET name = ?1, run_id = ?2 WHERE entity_id = ?3",
                        params![bundle.name, run_id, entity_id],
                    )?;
                    tx.execute("DELETE FROM scores WHERE entity_id = ?1", params![entity_id])?;
                    stats.updated += 1;
                    entity_id
                }
                (None, _) => {
                    tx.execute(
                        "INSERT INTO entities (domain, natural_key, name, run_id) VALUES (?1, ?2, ?3, ?4)",
                        params![domain, bundle.key, bundle.name, run_id],
                    )?;
                    stats.inserted += 1;
                    tx.last_insert_rowid()
                }
            };

            let measures = bundle
                .scores
                .iter()
                .map(|(k, m)| (k.as_str(), m))
                .chain(std::iter::once((TOTAL_KEY, &bundle.total)));

            for (score_key, measure) in measures {
                let (value, reason) = match measure {
                    Measure::Known { value } => (Some(*value), None),
                    Measure::Unknown { reason, .. } => (None, Some(reason.as_str())),
                };
                tx.execute(
                    "INSERT INTO scores (entity_id, score_key, value, unknown_reason) VALUES (?1, ?2, ?3, ?4)",
                    params![entity_id, score_key, value, reason],
                )?;
            }
        }

        tx.commit()?;
        info!(domain, inserted = stats.inserted, updated = stats.updated, "scores saved");
        Ok(stats)
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, domain, source, started_at, finished_at, outcome, report_path
             FROM runs ORDER BY run_id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRow {
                    run_id: row.get(0)?,
                    domain: row.get(1)?,
                    source: row.get(2)?,
                    started_at: row.get(3)?,
                    finished_at: row.get(4)?,
                    outcome: row.get(5)?,
                    report_path: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn entity_count(&self, domain: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entities WHERE domain = ?1",
            params![domain],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Stored value of `score_key` for the entity with `natural_key`.
    pub fn score(
        &self,
        domain: &str,
        natural_key: &str,
        score_key: &str,
    ) -> Result<Option<StoredScore>, StoreError> {
        let row: Option<(Option<f64>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT s.value, s.unknown_reason
                 FROM scores s JOIN entities e ON e.entity_id = s.entity_id
                 WHERE e.domain = ?1 AND e.natural_key = ?2 AND s.score_key = ?3",
                params![domain, natural_key, score_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(row.map(|(value, reason)| match value {
            Some(v) => Ok(v),
            None => Err(reason.unwrap_or_default()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntityId;
    use crate::scoring::UnknownReason;
    use std::collections::BTreeMap;

    fn bundle(key: &str, name: &str, total: f64) -> ScoreBundle {
        let mut scores = BTreeMap::new();
        scores.insert("attendance".to_string(), Measure::known(0.9));
        scores.insert(
            "productivity".to_string(),
            Measure::unknown("bills_proposed", UnknownReason::NoBaseline),
        );
        ScoreBundle {
            entity: EntityId(0),
            key: key.to_string(),
            name: name.to_string(),
            scores,
            total: Measure::known(total),
            coverage: 0.5,
            grade: None,
        }
    }

    #[test]
    fn test_insert_then_upsert_updates_in_place() {
        let mut store = ScoreStore::open_in_memory().unwrap();
        let run = store.begin_run("legislative", "csv:a.csv").unwrap();

        let first = store
            .save_bundles(run, "legislative", &[bundle("A01", "홍길동", 40.0)], OnDuplicate::Upsert)
            .unwrap();
        let second = store
            .save_bundles(run, "legislative", &[bundle("A01", "홍길동", 55.0)], OnDuplicate::Upsert)
            .unwrap();

        assert_eq!(first, SaveStats { inserted: 1, updated: 0 });
        assert_eq!(second, SaveStats { inserted: 0, updated: 1 });
        assert_eq!(store.entity_count("legislative").unwrap(), 1);
        assert_eq!(
            store.score("legislative", "A01", TOTAL_KEY).unwrap(),
            Some(Ok(55.0))
        );
    }

    #[test]
    fn test_reject_names_the_duplicate_and_writes_nothing() {
        let mut store = ScoreStore::open_in_memory().unwrap();
        let run = store.begin_run("legislative", "csv:a.csv").unwrap();
        store
            .save_bundles(run, "legislative", &[bundle("A01", "홍길동", 40.0)], OnDuplicate::Reject)
            .unwrap();

        let err = store
            .save_bundles(
                run,
                "legislative",
                &[bundle("B02", "이순신", 70.0), bundle("A01", "홍길동", 55.0)],
                OnDuplicate::Reject,
            )
            .unwrap_err();

        match err {
            StoreError::DuplicateKey { domain, key } => {
                assert_eq!(domain, "legislative");
                assert_eq!(key, "A01");
            }
            other => panic!("expected DuplicateKey, got {other}"),
        }
        assert_eq!(store.entity_count("legislative").unwrap(), 1);
        assert_eq!(
            store.score("legislative", "A01", TOTAL_KEY).unwrap(),
            Some(Ok(40.0))
        );
    }

    #[test]
    fn test_same_key_in_other_domain_is_independent() {
        let mut store = ScoreStore::open_in_memory().unwrap();
        let run = store.begin_run("bill", "csv:b.csv").unwrap();

        store
            .save_bundles(run, "bill", &[bundle("X1", "법안", 10.0)], OnDuplicate::Reject)
            .unwrap();
        store
            .save_bundles(run, "regional", &[bundle("X1", "종로구", 10.0)], OnDuplicate::Reject)
            .unwrap();

        assert_eq!(store.entity_count("bill").unwrap(), 1);
        assert_eq!(store.entity_count("regional").unwrap(), 1);
    }

    #[test]
    fn test_unknown_scores_stored_as_reason() {
        let mut store = ScoreStore::open_in_memory().unwrap();
        let run = store.begin_run("legislative", "csv:a.csv").unwrap();
        store
            .save_bundles(run, "legislative", &[bundle("A01", "홍길동", 40.0)], OnDuplicate::Upsert)
            .unwrap();

        assert_eq!(
            store.score("legislative", "A01", "productivity").unwrap(),
            Some(Err("no_baseline".to_string()))
        );
        assert_eq!(store.score("legislative", "A01", "absent").unwrap(), None);
    }

    #[test]
    fn test_run_log() {
        let store = ScoreStore::open_in_memory().unwrap();
        let first = store.begin_run("bill", "json:a.json").unwrap();
        let second = store.begin_run("bill", "json:b.json").unwrap();
        store
            .finish_run(second, &RunOutcome::Success, Some(Path::new("reports/r.json")))
            .unwrap();

        let runs = store.list_runs(10).unwrap();

        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, second);
        assert_eq!(runs[0].outcome.as_deref(), Some("success"));
        assert_eq!(runs[0].report_path.as_deref(), Some("reports/r.json"));
        assert_eq!(runs[1].run_id, first);
        assert!(runs[1].finished_at.is_none());
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
                .unwrap();
        }

        let err = ScoreStore::open(&path).err().unwrap();

        assert!(matches!(err, StoreError::SchemaTooNew { .. }));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.sqlite");
        {
            let mut store = ScoreStore::open(&path).unwrap();
            let run = store.begin_run("bill", "csv:b.csv").unwrap();
            store
                .save_bundles(run, "bill", &[bundle("B1", "법안", 10.0)], OnDuplicate::Upsert)
                .unwrap();
        }

        let store = ScoreStore::open(&path).unwrap();

        assert_eq!(store.entity_count("bill").unwrap(), 1);
    }
}
