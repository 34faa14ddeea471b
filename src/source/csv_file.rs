use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use super::{SourceBatch, SourceError, io_error};
use crate::outcome::{ReasonCode, Skip};
use crate::record::SourceRow;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Reads a CSV file with a header row. Columns are addressed by header name.
pub fn read_csv(path: &Path) -> Result<SourceBatch, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
    let text = decode_utf8(path, &bytes)?;
    parse_csv(path, text)
}

/// Accepts UTF-8 with or without a BOM and names what it found otherwise.
fn decode_utf8<'a>(path: &Path, bytes: &'a [u8]) -> Result<&'a str, SourceError> {
    if bytes.starts_with(&[0xFF, 0xFE]) || bytes.starts_with(&[0xFE, 0xFF]) {
        return Err(SourceError::UnsupportedEncoding {
            path: path.to_path_buf(),
            detected: "UTF-16",
        });
    }

    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    std::str::from_utf8(body).map_err(|_| SourceError::UnsupportedEncoding {
        path: path.to_path_buf(),
        detected: "a legacy code page such as CP949/EUC-KR",
    })
}

/// Parses CSV text. Rows whose field count differs from the header are
/// skipped individually.
pub fn parse_csv(origin: &Path, text: &str) -> Result<SourceBatch, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|source| SourceError::Csv {
            path: origin.to_path_buf(),
            source,
        })?
        .clone();

    let mut batch = SourceBatch::default();

    for (index, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(row = index, error = %e, "unreadable CSV row");
                batch
                    .skipped
                    .push(Skip::new(index, ReasonCode::MalformedRow, e.to_string()));
                continue;
            }
        };

        if record.len() != headers.len() {
            warn!(row = index, expected = headers.len(), found = record.len(), "ragged CSV row");
            batch.skipped.push(Skip::new(
                index,
                ReasonCode::MalformedRow,
                format!("expected {} fields, found {}", headers.len(), record.len()),
            ));
            continue;
        }

        let mut row = SourceRow::new(index, BTreeMap::new());
        for (header, value) in headers.iter().zip(record.iter()) {
            if !header.is_empty() {
                row.insert_text(header, value);
            }
        }

        batch.rows.push(row);
    }

    debug!(
        path = %origin.display(),
        rows = batch.rows.len(),
        skipped = batch.skipped.len(),
        "CSV parsed"
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Scalar;
    use std::io::Write;

    #[test]
    fn test_columns_by_header_name() {
        let text = "name,attendance_rate,code\n홍길동,91.5,A01\n이순신,,A02\n";
        let batch = parse_csv(Path::new("mem.csv"), text).unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].fields["attendance_rate"], Scalar::Number(91.5));
        assert_eq!(batch.rows[1].fields["attendance_rate"], Scalar::Null);
        assert_eq!(batch.rows[1].fields["name"], Scalar::Text("이순신".into()));
    }

    #[test]
    fn test_numeric_codes_keep_their_text() {
        let text = "code,name\n007,가\n7,나\n";
        let batch = parse_csv(Path::new("codes.csv"), text).unwrap();

        assert_eq!(batch.rows[0].fields["code"], Scalar::Number(7.0));
        assert_eq!(batch.rows[0].raw["code"], "007");
        assert!(!batch.rows[0].raw.contains_key("name"));
    }

    #[test]
    fn test_ragged_row_is_skipped() {
        let text = "name,score\n가,1\n나,2,extra\n다,3\n";
        let batch = parse_csv(Path::new("r.csv"), text).unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[1].index, 2);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].row, 1);
        assert_eq!(batch.skipped[0].reason, ReasonCode::MalformedRow);
    }

    #[test]
    fn test_bom_is_stripped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\xEF\xBB\xBFname\n\xED\x99\x8D\n").unwrap();

        let batch = read_csv(file.path()).unwrap();

        assert!(batch.rows[0].fields.contains_key("name"));
    }

    #[test]
    fn test_legacy_encoding_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // "이름" in CP949
        file.write_all(b"\xC0\xCC\xB8\xA7\n1\n").unwrap();

        let err = read_csv(file.path()).unwrap_err();

        assert!(matches!(err, SourceError::UnsupportedEncoding { .. }));
        assert_eq!(err.reason(), ReasonCode::UnsupportedEncoding);
    }

    #[test]
    fn test_missing_file_is_an_error_not_empty() {
        let err = read_csv(Path::new("/nonexistent/civic_rater/members.csv")).unwrap_err();

        assert!(matches!(err, SourceError::Io { .. }));
    }
}
