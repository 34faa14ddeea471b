use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use super::{SourceBatch, SourceError, io_error};
use crate::outcome::{ReasonCode, Skip};
use crate::record::{Scalar, SourceRow};

/// Reads a JSON file holding an array of objects, optionally at `pointer`.
pub fn read_json(path: &Path, pointer: Option<&str>) -> Result<SourceBatch, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
    parse_json_records(&path.display().to_string(), &bytes, pointer)
}

/// Extracts records from a JSON document.
///
/// Without a pointer the document itself must be an array. Elements that are
/// not objects are skipped as malformed rows.
pub fn parse_json_records(
    origin: &str,
    bytes: &[u8],
    pointer: Option<&str>,
) -> Result<SourceBatch, SourceError> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    let doc: Value = serde_json::from_slice(bytes).map_err(|source| SourceError::Json {
        origin: origin.to_string(),
        source,
    })?;

    let target = match pointer {
        Some(p) => doc.pointer(p),
        None => Some(&doc),
    };
    let Some(Value::Array(items)) = target else {
        return Err(SourceError::Shape {
            origin: origin.to_string(),
            pointer: pointer.unwrap_or("").to_string(),
        });
    };

    let mut batch = SourceBatch::default();
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::Object(map) => {
                let mut row = SourceRow::new(index, BTreeMap::new());
                for (field, value) in map {
                    match value {
                        Value::String(text) => row.insert_text(field, text),
                        other => {
                            row.fields.insert(field.clone(), Scalar::from_json(other));
                        }
                    }
                }
                batch.rows.push(row);
            }
            other => batch.skipped.push(Skip::new(
                index,
                ReasonCode::MalformedRow,
                format!("expected an object, found {}", json_kind(other)),
            )),
        }
    }

    Ok(batch)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_array() {
        let json = r#"[{"name": "홍길동", "bills_proposed": 12, "tags": ["a"]}, 7]"#;
        let batch = parse_json_records("inline", json.as_bytes(), None).unwrap();

        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].fields["bills_proposed"], Scalar::Number(12.0));
        assert_eq!(batch.rows[0].fields["tags"], Scalar::Text(r#"["a"]"#.into()));
        assert_eq!(batch.skipped[0].row, 1);
        assert!(batch.skipped[0].detail.contains("a number"));
    }

    #[test]
    fn test_pointer_into_envelope() {
        let json = r#"{"response": {"body": {"items": [{"name": "가"}, {"name": "나"}]}}}"#;
        let batch =
            parse_json_records("inline", json.as_bytes(), Some("/response/body/items")).unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[1].index, 1);
    }

    #[test]
    fn test_string_codes_keep_their_text() {
        let json = r#"[{"code": "0012", "name": "가", "seats": 3}]"#;
        let batch = parse_json_records("inline", json.as_bytes(), None).unwrap();

        assert_eq!(batch.rows[0].fields["code"], Scalar::Number(12.0));
        assert_eq!(batch.rows[0].raw["code"], "0012");
        assert!(!batch.rows[0].raw.contains_key("seats"));
    }

    #[test]
    fn test_object_without_pointer_is_shape_error() {
        let err = parse_json_records("inline", br#"{"items": []}"#, None).unwrap_err();

        assert!(matches!(err, SourceError::Shape { .. }));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let err = parse_json_records("inline", b"[{", None).unwrap_err();

        assert!(matches!(err, SourceError::Json { .. }));
    }
}
