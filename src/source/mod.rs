//! Source readers.
//!
//! Each reader turns one backing store into a [`SourceBatch`]: the rows it
//! could read, in the store's own order, plus per-row [`Skip`]s for rows it
//! could not. A reader that cannot read at all returns a [`SourceError`],
//! so an unreadable source is never mistaken for an empty one.

mod csv_file;
mod http_api;
mod json_file;
mod sqlite_table;

pub use csv_file::{parse_csv, read_csv};
pub use http_api::{HttpContext, fetch_records};
pub use json_file::{parse_json_records, read_json};
pub use sqlite_table::read_table;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::outcome::{ReasonCode, Skip};
use crate::record::SourceRow;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not UTF-8 (detected {detected}); re-export it as UTF-8", path.display())]
    UnsupportedEncoding { path: PathBuf, detected: &'static str },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("JSON error in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no array of records at '{pointer}' in {origin}")]
    Shape { origin: String, pointer: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("invalid filter '{0}': expected column=value")]
    InvalidFilter(String),

    #[error("a table name is required for SQLite source {0}")]
    MissingTable(String),

    #[error("cannot infer source format for '{0}'")]
    UnknownFormat(String),

    #[error("credentials for {host}: {message}")]
    Credentials { host: String, message: String },

    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },
}

impl SourceError {
    pub fn reason(&self) -> ReasonCode {
        match self {
            SourceError::UnsupportedEncoding { .. } => ReasonCode::UnsupportedEncoding,
            _ => ReasonCode::SourceUnreadable,
        }
    }
}

/// Equality filter applied by the SQLite reader (`column=value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl FromStr for Filter {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, value) = s
            .split_once('=')
            .ok_or_else(|| SourceError::InvalidFilter(s.to_string()))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(SourceError::InvalidFilter(s.to_string()));
        }
        Ok(Filter {
            column: column.to_string(),
            value: value.trim().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Csv {
        path: PathBuf,
    },
    Json {
        path: PathBuf,
        pointer: Option<String>,
    },
    Sqlite {
        path: PathBuf,
        table: String,
        filter: Option<Filter>,
    },
    Http {
        url: String,
        pointer: Option<String>,
        pages: u32,
    },
}

impl SourceSpec {
    /// Infers the reader from `source`: an `http(s)://` URL or a file
    /// extension (`.csv`, `.json`, `.sqlite`, `.sqlite3`, `.db`).
    pub fn infer(
        source: &str,
        table: Option<String>,
        filter: Option<Filter>,
        pointer: Option<String>,
        pages: u32,
    ) -> Result<Self, SourceError> {
        if source.starts_with("http://") || source.starts_with("https://") {
            return Ok(SourceSpec::Http {
                url: source.to_string(),
                pointer,
                pages: pages.max(1),
            });
        }

        let path = PathBuf::from(source);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("csv") => Ok(SourceSpec::Csv { path }),
            Some("json") => Ok(SourceSpec::Json { path, pointer }),
            Some("sqlite" | "sqlite3" | "db") => {
                let table = table.ok_or_else(|| SourceError::MissingTable(source.to_string()))?;
                Ok(SourceSpec::Sqlite {
                    path,
                    table,
                    filter,
                })
            }
            _ => Err(SourceError::UnknownFormat(source.to_string())),
        }
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Csv { path } => write!(f, "csv:{}", path.display()),
            SourceSpec::Json { path, .. } => write!(f, "json:{}", path.display()),
            SourceSpec::Sqlite {
                path,
                table,
                filter,
            } => {
                write!(f, "sqlite:{}#{}", path.display(), table)?;
                if let Some(filter) = filter {
                    write!(f, "?{}={}", filter.column, filter.value)?;
                }
                Ok(())
            }
            // query strings may carry keys, so only scheme, host and path are shown
            SourceSpec::Http { url, .. } => match reqwest::Url::parse(url) {
                Ok(parsed) => write!(
                    f,
                    "http:{}://{}{}",
                    parsed.scheme(),
                    parsed.host_str().unwrap_or_default(),
                    parsed.path()
                ),
                Err(_) => f.write_str("http:<invalid url>"),
            },
        }
    }
}

/// Rows read from a source plus the rows that could not be read.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SourceBatch {
    pub rows: Vec<SourceRow>,
    pub skipped: Vec<Skip>,
}

impl SourceBatch {
    /// Number of source rows seen, read or skipped.
    pub fn seen(&self) -> usize {
        self.rows.len() + self.skipped.len()
    }

    /// Appends `other`, shifting its row indices past the rows already seen.
    pub fn append(&mut self, other: SourceBatch) {
        let offset = self.seen();
        self.rows.extend(other.rows.into_iter().map(|mut row| {
            row.index += offset;
            row
        }));
        self.skipped.extend(other.skipped.into_iter().map(|mut skip| {
            skip.row += offset;
            skip
        }));
    }
}

/// Reads every row from `spec`.
pub async fn read_source(spec: &SourceSpec, http: &HttpContext) -> Result<SourceBatch, SourceError> {
    match spec {
        SourceSpec::Csv { path } => read_csv(path),
        SourceSpec::Json { path, pointer } => read_json(path, pointer.as_deref()),
        SourceSpec::Sqlite {
            path,
            table,
            filter,
        } => read_table(path, table, filter.as_ref()),
        SourceSpec::Http {
            url,
            pointer,
            pages,
        } => fetch_records(url, pointer.as_deref(), *pages, http).await,
    }
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.to_path_buf(),
        source,
    }
}
