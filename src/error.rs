use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Where a required-fields check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldsLocation {
    /// The JSON root object.
    Object,
    /// The element at this (0-based) index of a top-level JSON array.
    Element(usize),
}

impl fmt::Display for FieldsLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => f.write_str("json object"),
            Self::Element(idx) => write!(f, "json array element {idx}"),
        }
    }
}

/// Error type returned by the format detector, the per-format readers and [`crate::read_data`].
///
/// This is a single error enum shared across CSV/JSON/XML loading. Errors raised while a lazy
/// stream is being consumed use the same variants.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The input path does not exist.
    #[error("file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    /// Any other I/O failure (permission denied, read error mid-stream, ...).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An explicit format was not one of `csv`, `json`, `xml`.
    #[error("unsupported format '{format}' (expected csv, json or xml)")]
    UnsupportedFormat { format: String },

    /// Content sniffing found nothing to classify.
    #[error("file is empty or unreadable: {}", .path.display())]
    EmptyOrUnreadable { path: PathBuf },

    /// The CSV input has no header row.
    #[error("csv has no header row")]
    NoHeader,

    /// A key/index/filter column name is not present in the CSV header.
    #[error("unknown column '{column}'. headers={headers:?}")]
    UnknownColumn {
        column: String,
        headers: Vec<String>,
    },

    /// An ordinal index column is outside the header bounds.
    #[error("column index {index} out of range for {len} header column(s)")]
    IndexOutOfRange { index: usize, len: usize },

    /// A record lacks, or has an empty value in, the key column.
    #[error("row {row} has a missing or empty key in column '{column}'")]
    MissingOrEmptyKey { row: usize, column: String },

    /// A key value occurs more than once and duplicates are not allowed.
    #[error("duplicate key '{key}' in column '{column}'")]
    DuplicateKey { key: String, column: String },

    /// Exactly one of `filter_column` / `filter_value` was provided.
    #[error("filter_column and filter_value must be provided together")]
    InvalidFilterParams,

    /// CSV syntax error (ragged row, invalid UTF-8, ...).
    #[error("malformed csv{}: {message}", at_line(.line))]
    MalformedCsv { line: Option<u64>, message: String },

    /// JSON syntax error. For whole documents `line` is 1-based; for NDJSON it is the 0-based
    /// index of the offending line.
    #[error("malformed json{}: {message}", at_line(.line))]
    MalformedJson { line: Option<u64>, message: String },

    /// XML syntax error. `position` is the byte offset where parsing stopped.
    #[error("malformed xml{}: {message}", at_position(.position))]
    MalformedXml {
        position: Option<u64>,
        message: String,
    },

    /// Required top-level fields are missing.
    #[error("missing required fields in {location}: {missing:?}")]
    MissingFields {
        location: FieldsLocation,
        missing: Vec<String>,
    },
}

fn at_line(line: &Option<u64>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

fn at_position(position: &Option<u64>) -> String {
    position
        .map(|p| format!(" at byte {p}"))
        .unwrap_or_default()
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line());
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(io) => LoadError::Io(io),
            _ => LoadError::MalformedCsv { line, message },
        }
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            return LoadError::Io(err.into());
        }
        LoadError::MalformedJson {
            line: Some(err.line() as u64),
            message: err.to_string(),
        }
    }
}

impl From<quick_xml::Error> for LoadError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(io) => LoadError::Io(std::io::Error::new(io.kind(), io.to_string())),
            other => LoadError::MalformedXml {
                position: None,
                message: other.to_string(),
            },
        }
    }
}
