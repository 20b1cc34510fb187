//! Core data model types for loading.
//!
//! Every call to [`crate::read_data`] returns a [`DataEnvelope`]: the resolved [`DataFormat`] plus
//! a [`Payload`] whose variant depends on the format and on whether the file was streamed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::ingestion::csv::{CsvKeyedStream, CsvRowStream};
use crate::ingestion::json::JsonStream;
use crate::ingestion::xml::XmlRecordStream;

/// One of the three supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// Comma-separated values with a header row.
    Csv,
    /// A JSON document or newline-delimited JSON.
    Json,
    /// An XML document.
    Xml,
}

impl DataFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }

    /// Lower-case tag for this format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataFormat {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            _ => Err(LoadError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// A CSV record: header name -> raw field value.
pub type Row = BTreeMap<String, String>;

/// An XML-derived record: child tag or `@attribute` -> value.
///
/// Child values are the trimmed child text as a JSON string, or `null` when the child had no text.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Column used as the key of a keyed CSV read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexColumn {
    /// Resolve by exact header name.
    Name(String),
    /// Resolve by 0-based position in the header.
    Position(usize),
}

impl Default for IndexColumn {
    fn default() -> Self {
        Self::Position(0)
    }
}

impl From<&str> for IndexColumn {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for IndexColumn {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for IndexColumn {
    fn from(position: usize) -> Self {
        Self::Position(position)
    }
}

/// CSV payload returned by the loader.
#[derive(Debug)]
pub enum CsvData {
    /// Full load without an index column.
    Rows(Vec<Row>),
    /// Full load keyed by the index column (the column is removed from each row).
    Keyed(BTreeMap<String, Row>),
    /// Lazy rows.
    RowStream(CsvRowStream),
    /// Lazy `(key, row)` pairs.
    KeyedStream(CsvKeyedStream),
}

/// JSON payload returned by the loader.
#[derive(Debug)]
pub enum JsonData {
    /// The whole parsed document.
    Value(serde_json::Value),
    /// Lazy values (NDJSON lines or top-level array items).
    Stream(JsonStream),
}

/// XML payload returned by the loader.
#[derive(Debug)]
pub enum XmlData {
    /// Records collected from the full document tree.
    Records(Vec<Record>),
    /// Lazy records produced from end-of-element events.
    Stream(XmlRecordStream),
}

/// Format-specific data carried by a [`DataEnvelope`].
#[derive(Debug)]
pub enum Payload {
    Csv(CsvData),
    Json(JsonData),
    Xml(XmlData),
}

impl Payload {
    /// `true` when the payload is a lazy, single-pass stream.
    pub fn is_stream(&self) -> bool {
        matches!(
            self,
            Payload::Csv(CsvData::RowStream(_) | CsvData::KeyedStream(_))
                | Payload::Json(JsonData::Stream(_))
                | Payload::Xml(XmlData::Stream(_))
        )
    }

    /// Number of materialized records, or `None` for streams.
    ///
    /// A JSON array counts its elements; any other JSON value counts as one record.
    pub fn record_count(&self) -> Option<usize> {
        match self {
            Payload::Csv(CsvData::Rows(rows)) => Some(rows.len()),
            Payload::Csv(CsvData::Keyed(map)) => Some(map.len()),
            Payload::Json(JsonData::Value(serde_json::Value::Array(items))) => Some(items.len()),
            Payload::Json(JsonData::Value(_)) => Some(1),
            Payload::Xml(XmlData::Records(records)) => Some(records.len()),
            _ => None,
        }
    }
}

/// Result of [`crate::read_data`].
#[derive(Debug)]
pub struct DataEnvelope {
    /// Format that was resolved for this call.
    pub format: DataFormat,
    /// Loaded data; the variant always matches `format`.
    pub data: Payload,
}
