//! CSV loading implementation.
//!
//! Rules shared by every CSV entry point:
//!
//! - The first line is the header; an empty file (or empty header line) is [`LoadError::NoHeader`].
//! - Every record must have as many fields as the header ([`LoadError::MalformedCsv`] otherwise).
//! - Rows are returned as [`Row`] maps of header name -> raw value.
//!
//! The streaming types ([`CsvRowStream`], [`CsvKeyedStream`]) do no I/O until the first call to
//! `next()`. The header, the key column and the filter column are resolved on that first pull, so
//! an unknown column surfaces from the iterator, not from the constructor.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::error::{LoadError, LoadResult};
use crate::types::{IndexColumn, Row};

use super::lazy::Lazy;
use super::open_input;

/// Keep only rows whose `column` equals `value` exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    /// Header name of the column to test.
    pub column: String,
    /// Value the column must equal.
    pub value: String,
}

impl RowFilter {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Read every row of a CSV file.
pub fn read_csv_rows(path: impl AsRef<Path>) -> LoadResult<Vec<Row>> {
    read_csv_rows_from_reader(open_csv(path.as_ref(), b',')?)
}

/// Read every row from an existing CSV reader (which must be configured with headers).
pub fn read_csv_rows_from_reader<R: Read>(rdr: csv::Reader<R>) -> LoadResult<Vec<Row>> {
    let mut cursor = RowCursor::new(rdr, None)?;
    let mut rows = Vec::new();
    while let Some(next) = cursor.next_record() {
        let (_, record) = next?;
        rows.push(cursor.to_row(&record, None));
    }
    Ok(rows)
}

/// Read a CSV file into a map keyed by `index_col`.
///
/// The key column is removed from each row. A row with an empty key is
/// [`LoadError::MissingOrEmptyKey`]. Duplicate keys are not an error here: the last row with a
/// given key wins (unlike [`super::csv_dict::read_csv_to_dict`], which rejects or groups them).
pub fn read_csv_keyed(
    path: impl AsRef<Path>,
    index_col: &IndexColumn,
) -> LoadResult<BTreeMap<String, Row>> {
    read_csv_keyed_from_reader(open_csv(path.as_ref(), b',')?, index_col)
}

/// Keyed read from an existing CSV reader. See [`read_csv_keyed`].
pub fn read_csv_keyed_from_reader<R: Read>(
    rdr: csv::Reader<R>,
    index_col: &IndexColumn,
) -> LoadResult<BTreeMap<String, Row>> {
    let mut cursor = RowCursor::new(rdr, None)?;
    let key_idx = resolve_column(cursor.headers(), index_col)?;

    let mut out = BTreeMap::new();
    while let Some(next) = cursor.next_record() {
        let (row_num, record) = next?;
        let key = cursor.key_of(row_num, &record, key_idx)?;
        let row = cursor.to_row(&record, Some(key_idx));
        if out.insert(key.clone(), row).is_some() {
            tracing::debug!(key = %key, row = row_num, "csv key repeated; keeping the later row");
        }
    }
    Ok(out)
}

/// Lazy, single-pass stream of CSV rows.
///
/// The file is opened on the first `next()` and closed when the stream is exhausted, fails, or
/// is dropped.
pub struct CsvRowStream {
    path: PathBuf,
    delimiter: u8,
    filter: Option<RowFilter>,
    state: Lazy<RowCursor<File>>,
}

impl CsvRowStream {
    /// Create a stream over `path`. No I/O happens until the first pull.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
            filter: None,
            state: Lazy::Pending,
        }
    }

    /// Use a field delimiter other than `,`.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Only yield rows matching `filter`. The filter column is checked against the header on the
    /// first pull.
    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// `true` while the underlying file is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl Iterator for CsvRowStream {
    type Item = LoadResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let (path, delimiter, filter) = (&self.path, self.delimiter, self.filter.as_ref());
        self.state.pull(
            || RowCursor::new(open_csv(path, delimiter)?, filter),
            |cursor| {
                let next = cursor.next_record()?;
                Some(next.map(|(_, record)| cursor.to_row(&record, None)))
            },
        )
    }
}

impl fmt::Debug for CsvRowStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvRowStream")
            .field("path", &self.path)
            .field("filter", &self.filter)
            .field("state", &self.state.state_name())
            .finish()
    }
}

/// Lazy, single-pass stream of `(key, row)` pairs.
///
/// Every yielded key is non-empty; an empty key ends the stream with
/// [`LoadError::MissingOrEmptyKey`]. By default the key column is removed from the row.
pub struct CsvKeyedStream {
    path: PathBuf,
    key: IndexColumn,
    delimiter: u8,
    filter: Option<RowFilter>,
    keep_key_column: bool,
    state: Lazy<KeyedCursor>,
}

struct KeyedCursor {
    rows: RowCursor<File>,
    key_idx: usize,
}

impl CsvKeyedStream {
    /// Create a keyed stream over `path`. No I/O happens until the first pull.
    pub fn new(path: impl Into<PathBuf>, key: impl Into<IndexColumn>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
            delimiter: b',',
            filter: None,
            keep_key_column: false,
            state: Lazy::Pending,
        }
    }

    /// Use a field delimiter other than `,`.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Only yield rows matching `filter`.
    pub fn with_filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Leave the key column in each yielded row.
    pub fn keep_key_column(mut self) -> Self {
        self.keep_key_column = true;
        self
    }

    /// `true` while the underlying file is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl Iterator for CsvKeyedStream {
    type Item = LoadResult<(String, Row)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (path, delimiter, filter, key) =
            (&self.path, self.delimiter, self.filter.as_ref(), &self.key);
        let keep_key_column = self.keep_key_column;
        self.state.pull(
            || {
                let rows = RowCursor::new(open_csv(path, delimiter)?, filter)?;
                let key_idx = resolve_column(rows.headers(), key)?;
                Ok(KeyedCursor { rows, key_idx })
            },
            |cursor| {
                let (row_num, record) = match cursor.rows.next_record()? {
                    Ok(next) => next,
                    Err(e) => return Some(Err(e)),
                };
                let skip = (!keep_key_column).then_some(cursor.key_idx);
                Some(
                    cursor
                        .rows
                        .key_of(row_num, &record, cursor.key_idx)
                        .map(|key| (key, cursor.rows.to_row(&record, skip))),
                )
            },
        )
    }
}

impl fmt::Debug for CsvKeyedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvKeyedStream")
            .field("path", &self.path)
            .field("key", &self.key)
            .field("filter", &self.filter)
            .field("keep_key_column", &self.keep_key_column)
            .field("state", &self.state.state_name())
            .finish()
    }
}

/// Open `path` as a headered CSV reader, mapping a missing file to [`LoadError::FileNotFound`].
pub(crate) fn open_csv(path: &Path, delimiter: u8) -> LoadResult<csv::Reader<File>> {
    let file = open_input(path)?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(file))
}

/// Resolve a key column against parsed headers.
pub(crate) fn resolve_column(headers: &[String], col: &IndexColumn) -> LoadResult<usize> {
    match col {
        IndexColumn::Position(index) if *index < headers.len() => Ok(*index),
        IndexColumn::Position(index) => Err(LoadError::IndexOutOfRange {
            index: *index,
            len: headers.len(),
        }),
        IndexColumn::Name(name) => headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| LoadError::UnknownColumn {
                column: name.clone(),
                headers: headers.to_vec(),
            }),
    }
}

/// Header-aware record cursor with an optional equality filter.
pub(crate) struct RowCursor<R> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<R>,
    filter: Option<(usize, String)>,
    row: usize,
}

impl<R: Read> RowCursor<R> {
    pub(crate) fn new(mut rdr: csv::Reader<R>, filter: Option<&RowFilter>) -> LoadResult<Self> {
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_owned).collect();
        if headers.is_empty() {
            return Err(LoadError::NoHeader);
        }

        let filter = match filter {
            Some(f) => {
                let idx = resolve_column(&headers, &IndexColumn::Name(f.column.clone()))?;
                Some((idx, f.value.clone()))
            }
            None => None,
        };

        Ok(Self {
            headers,
            records: rdr.into_records(),
            filter,
            // Header is row 1.
            row: 1,
        })
    }

    pub(crate) fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Next record passing the filter, with its 1-based row number (header = row 1).
    pub(crate) fn next_record(&mut self) -> Option<LoadResult<(usize, StringRecord)>> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e.into())),
            };
            self.row += 1;
            if let Some((idx, value)) = &self.filter {
                if record.get(*idx) != Some(value.as_str()) {
                    continue;
                }
            }
            return Some(Ok((self.row, record)));
        }
    }

    pub(crate) fn key_of(&self, row: usize, record: &StringRecord, key_idx: usize) -> LoadResult<String> {
        match record.get(key_idx) {
            Some(key) if !key.is_empty() => Ok(key.to_owned()),
            _ => Err(LoadError::MissingOrEmptyKey {
                row,
                column: self.headers[key_idx].clone(),
            }),
        }
    }

    pub(crate) fn to_row(&self, record: &StringRecord, skip: Option<usize>) -> Row {
        self.headers
            .iter()
            .zip(record.iter())
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != skip)
            .map(|(_, (h, v))| (h.clone(), v.to_owned()))
            .collect()
    }
}
