use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};
use tracing::debug;

use super::{Filter, SourceBatch, SourceError, io_error};
use crate::record::{Scalar, SourceRow};

/// Reads every row of `table` in `rowid` order, optionally restricted to
/// rows where `filter.column = filter.value`.
///
/// The database is opened read-only for the duration of the call.
pub fn read_table(
    path: &Path,
    table: &str,
    filter: Option<&Filter>,
) -> Result<SourceBatch, SourceError> {
    if !path.exists() {
        return Err(io_error(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "database file not found"),
        ));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let mut sql = format!("SELECT * FROM {}", quote_identifier(table)?);
    if let Some(filter) = filter {
        sql.push_str(&format!(" WHERE {} = ?1", quote_identifier(&filter.column)?));
    }
    sql.push_str(" ORDER BY rowid");

    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = match filter {
        Some(filter) => stmt.query(params![filter.value])?,
        None => stmt.query([])?,
    };

    let mut batch = SourceBatch::default();
    while let Some(row) = rows.next()? {
        let mut record = SourceRow::new(batch.rows.len(), BTreeMap::new());
        for (i, name) in columns.iter().enumerate() {
            let value = match row.get_ref(i)? {
                ValueRef::Null | ValueRef::Blob(_) => Scalar::Null,
                ValueRef::Integer(n) => Scalar::Number(n as f64),
                ValueRef::Real(r) => Scalar::Number(r),
                ValueRef::Text(t) => {
                    record.insert_text(name, &String::from_utf8_lossy(t));
                    continue;
                }
            };
            record.fields.insert(name.clone(), value);
        }
        batch.rows.push(record);
    }

    debug!(path = %path.display(), table, rows = batch.rows.len(), "SQLite table read");
    Ok(batch)
}

/// Quotes an identifier after checking it holds only letters, digits and `_`.
fn quote_identifier(name: &str) -> Result<String, SourceError> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid {
        return Err(SourceError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}
