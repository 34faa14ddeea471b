//! Entity records shared by every source reader and scorer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::outcome::{ReasonCode, Skip};

/// Surrogate handle for an entity within one run.
///
/// Assigned in load order, so two politicians sharing a name still get
/// distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single field value as read from a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"];

impl Scalar {
    /// Coerces a raw text cell (CSV, SQLite TEXT) into the narrowest scalar.
    ///
    /// Thousands separators are accepted for numbers (`1,234`). Dates are only
    /// recognised with separators; bare `20240301` stays a number and is
    /// interpreted as a date by [`Record::date`] on request.
    pub fn from_text(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Scalar::Null;
        }

        if let Some(n) = parse_number(s) {
            return Scalar::Number(n);
        }

        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                return Scalar::Date(d);
            }
        }

        match s {
            "true" | "TRUE" => Scalar::Bool(true),
            "false" | "FALSE" => Scalar::Bool(false),
            _ => Scalar::Text(s.to_string()),
        }
    }

    /// Converts a JSON value. Nested arrays and objects are kept as compact
    /// JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Scalar::Null, Scalar::Number),
            serde_json::Value::String(s) => Scalar::from_text(s),
            other => Scalar::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Renders the value as display text; `None` for null.
    pub fn as_display(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{n:.0}")),
            Scalar::Number(n) => Some(n.to_string()),
            Scalar::Text(s) => Some(s.clone()),
            Scalar::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let looks_numeric = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | '+'));
    if !looks_numeric || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    // "2024-03-01" is all digits and dashes but is a date
    if s.matches('-').count() > 1 || s.matches('.').count() > 1 {
        return None;
    }
    if s.contains(',') && !has_thousands_grouping(s) {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok().filter(|n| n.is_finite())
}

/// True when every comma in `s` separates a group of three integer digits,
/// as in `1,234,567.5`.
fn has_thousands_grouping(s: &str) -> bool {
    let unsigned = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if fraction.contains(',') {
        return false;
    }

    let mut groups = integer.split(',');
    let lead_ok = groups
        .next()
        .is_some_and(|g| (1..=3).contains(&g.len()));
    lead_ok && groups.all(|g| g.len() == 3)
}

/// One row as produced by a source reader, before identity is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Zero-based position in the source.
    pub index: usize,
    pub fields: BTreeMap<String, Scalar>,
    /// Original text of cells that were coerced away from text, so `"007"`
    /// can still be used verbatim as a key.
    pub raw: BTreeMap<String, String>,
}

impl SourceRow {
    pub fn new(index: usize, fields: BTreeMap<String, Scalar>) -> Self {
        Self {
            index,
            fields,
            raw: BTreeMap::new(),
        }
    }

    /// Stores a text cell, coercing it and remembering the text it came from.
    pub fn insert_text(&mut self, field: &str, text: &str) {
        let value = Scalar::from_text(text);
        if !matches!(value, Scalar::Null | Scalar::Text(_)) {
            self.raw.insert(field.to_string(), text.trim().to_string());
        }
        self.fields.insert(field.to_string(), value);
    }

    /// The field as it appeared in the source, trimmed; `None` when blank.
    fn identity_text(&self, field: &str) -> Option<String> {
        self.raw
            .get(field)
            .cloned()
            .or_else(|| self.fields.get(field).and_then(Scalar::as_display))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Which fields carry an entity's name and natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub key_field: String,
    pub name_field: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            key_field: "code".to_string(),
            name_field: "name".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: EntityId,
    /// Natural key: the key field when present, otherwise the name.
    pub key: String,
    pub name: String,
    pub fields: BTreeMap<String, Scalar>,
}

impl Record {
    /// Returns the field value, treating explicit nulls as absent.
    pub fn get(&self, field: &str) -> Option<&Scalar> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        match self.get(field)? {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::Text(t) => parse_number(t),
            _ => None,
        }
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.get(field)? {
            Scalar::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        match self.get(field)? {
            Scalar::Date(d) => Some(*d),
            Scalar::Number(n) if n.fract() == 0.0 && (1e7..1e8).contains(n) => {
                NaiveDate::parse_from_str(&format!("{n:.0}"), "%Y%m%d").ok()
            }
            Scalar::Text(t) => DATE_FORMATS
                .iter()
                .chain(std::iter::once(&"%Y%m%d"))
                .find_map(|fmt| NaiveDate::parse_from_str(t.trim(), fmt).ok()),
            _ => None,
        }
    }

    /// Text content of a field regardless of its scalar kind.
    pub fn display(&self, field: &str) -> Option<String> {
        self.get(field).and_then(Scalar::as_display)
    }
}

/// Arena of records for one run.
#[derive(Debug, Default)]
pub struct RecordSet {
    pub records: Vec<Record>,
    /// Rows that could not become records.
    pub skipped: Vec<Skip>,
    /// Records whose natural key repeats an earlier record's key.
    pub duplicate_keys: Vec<EntityId>,
}

impl RecordSet {
    /// Assigns surrogate ids in row order.
    ///
    /// Rows without a usable name are skipped. Rows repeating a natural key
    /// are kept as records but also listed as `DuplicateKey` skips, since
    /// they cannot be persisted under their key.
    pub fn from_rows(rows: Vec<SourceRow>, identity: &Identity) -> Self {
        let mut set = RecordSet::default();
        let mut seen: HashMap<String, EntityId> = HashMap::new();

        for row in rows {
            let name = row.identity_text(&identity.name_field);

            let Some(name) = name else {
                set.skipped.push(Skip::new(
                    row.index,
                    ReasonCode::MissingIdentity,
                    format!("field '{}' is empty or missing", identity.name_field),
                ));
                continue;
            };

            let key = row
                .identity_text(&identity.key_field)
                .unwrap_or_else(|| name.clone());

            let id = EntityId(set.records.len() as u32);

            if let Some(first) = seen.get(&key) {
                set.duplicate_keys.push(id);
                set.skipped.push(Skip::new(
                    row.index,
                    ReasonCode::DuplicateKey,
                    format!("key '{key}' already used by entity {first}"),
                ));
            } else {
                seen.insert(key.clone(), id);
            }

            set.records.push(Record {
                id,
                key,
                name,
                fields: row.fields,
            });
        }

        set
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn get(&self, id: EntityId) -> Option<&Record> {
        self.records.get(id.0 as usize)
    }

    pub fn is_duplicate(&self, id: EntityId) -> bool {
        self.duplicate_keys.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: usize, pairs: &[(&str, &str)]) -> SourceRow {
        let mut row = SourceRow::new(index, BTreeMap::new());
        for (field, text) in pairs {
            row.insert_text(field, text);
        }
        row
    }

    #[test]
    fn test_from_text_coercion() {
        assert_eq!(Scalar::from_text(""), Scalar::Null);
        assert_eq!(Scalar::from_text(" 42 "), Scalar::Number(42.0));
        assert_eq!(Scalar::from_text("1,234"), Scalar::Number(1234.0));
        assert_eq!(Scalar::from_text("-0.5"), Scalar::Number(-0.5));
        assert_eq!(
            Scalar::from_text("2024-03-01"),
            Scalar::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            Scalar::from_text("2024.03.01"),
            Scalar::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(Scalar::from_text("기획재정위원회"), Scalar::Text("기획재정위원회".into()));
    }

    #[test]
    fn test_commas_must_group_thousands() {
        assert_eq!(Scalar::from_text("1,234,567"), Scalar::Number(1_234_567.0));
        assert_eq!(Scalar::from_text("-12,345.5"), Scalar::Number(-12_345.5));
        assert_eq!(Scalar::from_text("1,2,3"), Scalar::Text("1,2,3".into()));
        assert_eq!(Scalar::from_text("1234,567"), Scalar::Text("1234,567".into()));
        assert_eq!(Scalar::from_text(",123"), Scalar::Text(",123".into()));
        assert_eq!(Scalar::from_text("1.5,000"), Scalar::Text("1.5,000".into()));
    }

    #[test]
    fn test_numeric_looking_keys_keep_source_text() {
        let rows = vec![
            row(0, &[("code", "007"), ("name", "가")]),
            row(1, &[("code", "7"), ("name", "나")]),
            row(2, &[("code", "0.50"), ("name", "다")]),
            row(3, &[("code", "12345678901234567890"), ("name", "라")]),
            row(4, &[("name", "2024")]),
        ];
        let set = RecordSet::from_rows(rows, &Identity::default());

        let keys: Vec<&str> = set.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["007", "7", "0.50", "12345678901234567890", "2024"]);
        assert!(set.duplicate_keys.is_empty());
        assert!(set.skipped.is_empty());
        // the coerced value is still available for scoring
        assert_eq!(set.records[0].number("code"), Some(7.0));
    }

    #[test]
    fn test_date_accepts_compact_numbers() {
        let set = RecordSet::from_rows(
            vec![row(0, &[("name", "홍길동"), ("proposed", "20240301")])],
            &Identity::default(),
        );
        let record = &set.records[0];

        assert_eq!(record.number("proposed"), Some(20240301.0));
        assert_eq!(record.date("proposed"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(record.date("name"), None);
    }

    #[test]
    fn test_homonyms_get_distinct_ids() {
        let rows = vec![
            row(0, &[("code", "A1"), ("name", "김민수")]),
            row(1, &[("code", "B7"), ("name", "김민수")]),
        ];
        let set = RecordSet::from_rows(rows, &Identity::default());

        assert_eq!(set.len(), 2);
        assert_ne!(set.records[0].id, set.records[1].id);
        assert!(set.skipped.is_empty());
    }

    #[test]
    fn test_missing_name_is_skipped() {
        let rows = vec![row(0, &[("code", "A1")]), row(1, &[("name", "이영희")])];
        let set = RecordSet::from_rows(rows, &Identity::default());

        assert_eq!(set.len(), 1);
        assert_eq!(set.skipped.len(), 1);
        assert_eq!(set.skipped[0].row, 0);
        assert_eq!(set.skipped[0].reason, ReasonCode::MissingIdentity);
    }

    #[test]
    fn test_repeated_key_is_flagged() {
        let rows = vec![row(0, &[("name", "박철수")]), row(1, &[("name", "박철수")])];
        let set = RecordSet::from_rows(rows, &Identity::default());

        assert_eq!(set.len(), 2);
        assert_eq!(set.records[1].key, "박철수");
        assert!(set.is_duplicate(EntityId(1)));
        assert!(!set.is_duplicate(EntityId(0)));
        assert_eq!(set.skipped[0].reason, ReasonCode::DuplicateKey);
    }
}
