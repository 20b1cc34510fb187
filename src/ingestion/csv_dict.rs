//! General-purpose CSV reader with keying, filtering and an explicit duplicate-key policy.
//!
//! This is a separate surface from the loader's CSV path ([`super::csv`]): here a repeated key
//! is either an error or grouped, never silently overwritten, and keyed rows keep the key column.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{LoadError, LoadResult};
use crate::types::{IndexColumn, Row};

use super::csv::{open_csv, resolve_column, CsvKeyedStream, CsvRowStream, RowCursor, RowFilter};

/// Options for [`read_csv_to_dict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvDictOptions {
    /// Column whose value keys the result. `None` returns plain rows.
    pub key: Option<String>,
    /// Field delimiter.
    pub delimiter: u8,
    /// Group rows that share a key instead of failing with [`LoadError::DuplicateKey`].
    pub allow_duplicates: bool,
    /// Return a lazy stream instead of loading every row.
    pub stream: bool,
    /// Filter column; must be set together with `filter_value`.
    pub filter_column: Option<String>,
    /// Filter value; must be set together with `filter_column`.
    pub filter_value: Option<String>,
}

impl Default for CsvDictOptions {
    fn default() -> Self {
        Self {
            key: None,
            delimiter: b',',
            allow_duplicates: false,
            stream: false,
            filter_column: None,
            filter_value: None,
        }
    }
}

impl CsvDictOptions {
    fn filter(&self) -> LoadResult<Option<RowFilter>> {
        match (&self.filter_column, &self.filter_value) {
            (Some(column), Some(value)) => Ok(Some(RowFilter::new(column, value))),
            (None, None) => Ok(None),
            _ => Err(LoadError::InvalidFilterParams),
        }
    }
}

/// Result shapes of [`read_csv_to_dict`].
pub enum CsvTable {
    /// No key, full load.
    Rows(Vec<Row>),
    /// Keyed, full load, unique keys.
    Keyed(BTreeMap<String, Row>),
    /// Keyed, full load, `allow_duplicates`: rows grouped per key in file order.
    Grouped(BTreeMap<String, Vec<Row>>),
    /// No key, streaming.
    RowStream(CsvRowStream),
    /// Keyed, streaming. Duplicate keys are passed through as they occur.
    KeyedStream(CsvKeyedStream),
}

impl fmt::Debug for CsvTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows(rows) => f.debug_tuple("Rows").field(&rows.len()).finish(),
            Self::Keyed(map) => f.debug_tuple("Keyed").field(&map.len()).finish(),
            Self::Grouped(map) => f.debug_tuple("Grouped").field(&map.len()).finish(),
            Self::RowStream(s) => f.debug_tuple("RowStream").field(s).finish(),
            Self::KeyedStream(s) => f.debug_tuple("KeyedStream").field(s).finish(),
        }
    }
}

/// Read a CSV file as rows, keyed rows, or a lazy stream of either.
///
/// Checked at call time: the path exists ([`LoadError::FileNotFound`]) and the filter options are
/// both-or-neither ([`LoadError::InvalidFilterParams`]). In full mode the key and filter columns
/// are checked against the header before any row is read; in streaming mode the same checks run
/// on the first pull.
///
/// ```no_run
/// use data_loader::ingestion::csv_dict::{read_csv_to_dict, CsvDictOptions, CsvTable};
///
/// # fn main() -> Result<(), data_loader::LoadError> {
/// let opts = CsvDictOptions {
///     key: Some("id".to_string()),
///     ..Default::default()
/// };
/// if let CsvTable::Keyed(by_id) = read_csv_to_dict("people.csv", &opts)? {
///     println!("{:?}", by_id.get("1"));
/// }
/// # Ok(())
/// # }
/// ```
pub fn read_csv_to_dict(path: impl AsRef<Path>, opts: &CsvDictOptions) -> LoadResult<CsvTable> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let filter = opts.filter()?;

    if opts.stream {
        return Ok(stream_table(path.to_path_buf(), opts, filter));
    }

    let mut cursor = RowCursor::new(open_csv(path, opts.delimiter)?, filter.as_ref())?;

    let Some(key) = opts.key.as_deref() else {
        let mut rows = Vec::new();
        while let Some(next) = cursor.next_record() {
            let (_, record) = next?;
            rows.push(cursor.to_row(&record, None));
        }
        return Ok(CsvTable::Rows(rows));
    };

    let key_idx = resolve_column(cursor.headers(), &IndexColumn::Name(key.to_string()))?;
    if opts.allow_duplicates {
        let mut grouped: BTreeMap<String, Vec<Row>> = BTreeMap::new();
        while let Some(next) = cursor.next_record() {
            let (row_num, record) = next?;
            let k = cursor.key_of(row_num, &record, key_idx)?;
            grouped.entry(k).or_default().push(cursor.to_row(&record, None));
        }
        return Ok(CsvTable::Grouped(grouped));
    }

    let mut keyed = BTreeMap::new();
    while let Some(next) = cursor.next_record() {
        let (row_num, record) = next?;
        let k = cursor.key_of(row_num, &record, key_idx)?;
        if keyed.contains_key(&k) {
            return Err(LoadError::DuplicateKey {
                key: k,
                column: key.to_string(),
            });
        }
        keyed.insert(k, cursor.to_row(&record, None));
    }
    Ok(CsvTable::Keyed(keyed))
}

fn stream_table(path: PathBuf, opts: &CsvDictOptions, filter: Option<RowFilter>) -> CsvTable {
    match opts.key.as_deref() {
        None => {
            let mut stream = CsvRowStream::new(path).with_delimiter(opts.delimiter);
            if let Some(filter) = filter {
                stream = stream.with_filter(filter);
            }
            CsvTable::RowStream(stream)
        }
        Some(key) => {
            let mut stream = CsvKeyedStream::new(path, key)
                .with_delimiter(opts.delimiter)
                .keep_key_column();
            if let Some(filter) = filter {
                stream = stream.with_filter(filter);
            }
            CsvTable::KeyedStream(stream)
        }
    }
}
