//! JSON loading implementation.
//!
//! Supported inputs:
//! - A single JSON document (object, array or scalar), loaded in full.
//! - Newline-delimited JSON (NDJSON), streamed one line at a time.
//! - A large top-level array, streamed one element at a time through a [`JsonItemSource`].
//!
//! Which of the streaming paths applies is decided by [`stream_strategy`].

use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{FieldsLocation, LoadError, LoadResult};

use super::lazy::Lazy;
use super::open_input;

/// Longest first line inspected by [`stream_strategy`].
pub const FIRST_LINE_PEEK_LIMIT: u64 = 64 * 1024;

/// Boxed stream of JSON values produced by a [`JsonItemSource`].
pub type JsonValueIter = Box<dyn Iterator<Item = LoadResult<Value>> + Send>;

/// Load a whole JSON document into memory.
///
/// Invalid UTF-8 is reported as [`LoadError::MalformedJson`], like any other syntax error.
pub fn read_json_full(path: impl AsRef<Path>) -> LoadResult<Value> {
    let reader = BufReader::new(open_input(path.as_ref())?);
    Ok(serde_json::from_reader::<_, Value>(reader)?)
}

/// Parse a whole JSON document from a string.
pub fn read_json_from_str(input: &str) -> LoadResult<Value> {
    Ok(serde_json::from_str::<Value>(input)?)
}

/// Check that `required` fields exist at the top level of `value`.
///
/// - Object root: every field must be present, else [`FieldsLocation::Object`].
/// - Array root: every element must be an object holding every field, else
///   [`FieldsLocation::Element`] with the offending index. A non-object element reports all
///   required fields as missing.
/// - Scalars, or an empty `required` list, always pass.
pub fn validate_required_fields(value: &Value, required: &[String]) -> LoadResult<()> {
    if required.is_empty() {
        return Ok(());
    }

    match value {
        Value::Object(map) => {
            let missing = missing_fields(map, required);
            if missing.is_empty() {
                Ok(())
            } else {
                Err(LoadError::MissingFields {
                    location: FieldsLocation::Object,
                    missing,
                })
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                let missing = match item.as_object() {
                    Some(map) => missing_fields(map, required),
                    None => required.to_vec(),
                };
                if !missing.is_empty() {
                    return Err(LoadError::MissingFields {
                        location: FieldsLocation::Element(idx),
                        missing,
                    });
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn missing_fields(map: &serde_json::Map<String, Value>, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|f| !map.contains_key(f.as_str()))
        .cloned()
        .collect()
}

/// How a JSON file is read when streaming is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonStreamStrategy {
    /// One JSON value per non-empty line.
    Ndjson,
    /// Elements of a single top-level array.
    ArrayItems,
    /// Neither applies (e.g. a pretty-printed object); the document is loaded in full.
    WholeDocument,
}

/// Pick the streaming strategy for `path`.
///
/// The rule is decided on the first non-empty line:
///
/// 1. It parses as a complete JSON value and more non-empty content follows:
///    [`JsonStreamStrategy::Ndjson`]. This includes NDJSON whose lines are arrays.
/// 2. It starts with `[` (a top-level array, on one line or several):
///    [`JsonStreamStrategy::ArrayItems`].
/// 3. It parses as a complete value on its own, or is longer than [`FIRST_LINE_PEEK_LIMIT`]:
///    [`JsonStreamStrategy::Ndjson`].
/// 4. Otherwise the document spans several lines: [`JsonStreamStrategy::WholeDocument`].
///
/// A file with no non-whitespace content is [`LoadError::EmptyOrUnreadable`]; invalid UTF-8 in
/// the inspected lines is [`LoadError::MalformedJson`].
pub fn stream_strategy(path: impl AsRef<Path>) -> LoadResult<JsonStreamStrategy> {
    let path = path.as_ref();
    let mut reader = BufReader::new(open_input(path)?);
    let mut line = String::new();

    let Some((line_idx, truncated)) = next_content_line(&mut reader, &mut line, 0)? else {
        return Err(LoadError::EmptyOrUnreadable {
            path: path.to_path_buf(),
        });
    };
    let first = line.trim();
    let is_array = first.starts_with('[');
    let complete = !truncated && serde_json::from_str::<serde::de::IgnoredAny>(first).is_ok();

    if complete && is_array {
        let mut rest = String::new();
        let more = next_content_line(&mut reader, &mut rest, line_idx + 1)?.is_some();
        return Ok(if more {
            JsonStreamStrategy::Ndjson
        } else {
            JsonStreamStrategy::ArrayItems
        });
    }
    if is_array {
        return Ok(JsonStreamStrategy::ArrayItems);
    }
    if complete || truncated {
        return Ok(JsonStreamStrategy::Ndjson);
    }
    Ok(JsonStreamStrategy::WholeDocument)
}

/// Read up to the next non-blank line (at most [`FIRST_LINE_PEEK_LIMIT`] bytes of it) into `line`.
///
/// Returns the 0-based index of that line and whether it was cut at the peek limit, or `None` at
/// end of input.
fn next_content_line<R: BufRead>(
    reader: &mut R,
    line: &mut String,
    mut idx: u64,
) -> LoadResult<Option<(u64, bool)>> {
    loop {
        line.clear();
        let read = match (&mut *reader).take(FIRST_LINE_PEEK_LIMIT).read_line(line) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(LoadError::MalformedJson {
                    line: Some(idx),
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            return Ok(None);
        }
        let truncated = read as u64 == FIRST_LINE_PEEK_LIMIT && !line.ends_with('\n');
        if truncated || !line.trim().is_empty() {
            return Ok(Some((idx, truncated)));
        }
        idx += 1;
    }
}

/// Lazy stream over a newline-delimited JSON file.
///
/// Blank lines are skipped. A line that fails to parse yields [`LoadError::MalformedJson`] with
/// its 0-based line index and ends the stream; values already yielded are unaffected.
pub struct NdjsonStream {
    path: PathBuf,
    state: Lazy<NdjsonCursor>,
}

struct NdjsonCursor {
    lines: Lines<BufReader<fs::File>>,
    line: u64,
}

impl NdjsonStream {
    /// Create a stream over `path`. No I/O happens until the first pull.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Lazy::Pending,
        }
    }

    /// `true` while the underlying file is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl Iterator for NdjsonStream {
    type Item = LoadResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = &self.path;
        self.state.pull(
            || {
                Ok(NdjsonCursor {
                    lines: BufReader::new(open_input(path)?).lines(),
                    line: 0,
                })
            },
            NdjsonCursor::next_value,
        )
    }
}

impl NdjsonCursor {
    fn next_value(&mut self) -> Option<LoadResult<Value>> {
        loop {
            let idx = self.line;
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    return Some(Err(LoadError::MalformedJson {
                        line: Some(idx),
                        message: e.to_string(),
                    }));
                }
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;

            let trimmed = text.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_str::<Value>(trimmed).map_err(|e| LoadError::MalformedJson {
                    line: Some(idx),
                    message: e.to_string(),
                }),
            );
        }
    }
}

impl fmt::Debug for NdjsonStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdjsonStream")
            .field("path", &self.path)
            .field("state", &self.state.state_name())
            .finish()
    }
}

/// Streaming parser for the elements of a top-level JSON array.
///
/// This is the optional capability behind [`JsonStreamStrategy::ArrayItems`]; callers supply one
/// through [`JsonItemsCapability::Available`].
pub trait JsonItemSource: Send + Sync {
    /// Lazily yield each element of the top-level array read from `input`.
    fn items_of(&self, input: Box<dyn BufRead + Send>) -> JsonValueIter;
}

/// Whether item streaming of large JSON arrays is available.
#[derive(Clone)]
pub enum JsonItemsCapability {
    /// Stream array items with this source.
    Available(Arc<dyn JsonItemSource>),
    /// Item streaming is not available; the loader falls back to a full load with a warning.
    Unavailable {
        /// Shown in the fallback warning.
        reason: String,
    },
}

impl JsonItemsCapability {
    /// The capability compiled into this build: the bundled array parser when the `json-items`
    /// feature is enabled, otherwise [`JsonItemsCapability::Unavailable`].
    pub fn detect() -> Self {
        #[cfg(feature = "json-items")]
        {
            Self::Available(Arc::new(ArrayItems))
        }

        #[cfg(not(feature = "json-items"))]
        {
            Self::unavailable("built without the `json-items` feature")
        }
    }

    /// An explicitly unavailable capability.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl Default for JsonItemsCapability {
    fn default() -> Self {
        Self::detect()
    }
}

impl fmt::Debug for JsonItemsCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(_) => f.write_str("Available"),
            Self::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}

/// Lazy stream of top-level array items, produced by a [`JsonItemSource`].
pub struct JsonItemStream {
    path: PathBuf,
    source: Arc<dyn JsonItemSource>,
    state: Lazy<JsonValueIter>,
}

impl JsonItemStream {
    /// Create a stream over `path`. No I/O happens until the first pull.
    pub fn new(path: impl Into<PathBuf>, source: Arc<dyn JsonItemSource>) -> Self {
        Self {
            path: path.into(),
            source,
            state: Lazy::Pending,
        }
    }

    /// `true` while the underlying file is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl Iterator for JsonItemStream {
    type Item = LoadResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let (path, source) = (&self.path, &self.source);
        self.state.pull(
            || {
                let input: Box<dyn BufRead + Send> = Box::new(BufReader::new(open_input(path)?));
                Ok(source.items_of(input))
            },
            |items| items.next(),
        )
    }
}

impl fmt::Debug for JsonItemStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonItemStream")
            .field("path", &self.path)
            .field("state", &self.state.state_name())
            .finish()
    }
}

/// Lazy JSON values returned by the loader in streaming mode.
#[derive(Debug)]
pub enum JsonStream {
    Ndjson(NdjsonStream),
    Items(JsonItemStream),
}

impl Iterator for JsonStream {
    type Item = LoadResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Ndjson(s) => s.next(),
            Self::Items(s) => s.next(),
        }
    }
}

/// Bundled [`JsonItemSource`]: scans one array element at a time and parses it with `serde_json`.
///
/// Only the bytes of the current element are buffered.
#[cfg(feature = "json-items")]
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrayItems;

#[cfg(feature = "json-items")]
impl JsonItemSource for ArrayItems {
    fn items_of(&self, input: Box<dyn BufRead + Send>) -> JsonValueIter {
        Box::new(ArrayItemIter {
            input,
            stage: Stage::Start,
            index: 0,
            line: 1,
        })
    }
}

#[cfg(feature = "json-items")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    FirstItem,
    NextItem,
    // The closing `]` was read; trailing content is checked on the next pull.
    Closed,
    Done,
}

#[cfg(feature = "json-items")]
struct ArrayItemIter {
    input: Box<dyn BufRead + Send>,
    stage: Stage,
    index: usize,
    line: u64,
}

#[cfg(feature = "json-items")]
impl ArrayItemIter {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let buf = self.input.fill_buf()?;
        let Some(&b) = buf.first() else {
            return Ok(None);
        };
        self.input.consume(1);
        if b == b'\n' {
            self.line += 1;
        }
        Ok(Some(b))
    }

    fn next_non_ws(&mut self) -> io::Result<Option<u8>> {
        while let Some(b) = self.next_byte()? {
            if !b.is_ascii_whitespace() {
                return Ok(Some(b));
            }
        }
        Ok(None)
    }

    fn malformed(&self, message: impl Into<String>) -> LoadError {
        LoadError::MalformedJson {
            line: Some(self.line),
            message: message.into(),
        }
    }

    /// Collect the bytes of one element starting with `first`; returns them with the byte that
    /// terminated the element (`,` or `]`).
    fn scan_element(&mut self, first: u8) -> LoadResult<(Vec<u8>, u8)> {
        let mut buf = vec![first];
        let mut depth: usize = 0;
        let mut in_string = false;
        let mut escaped = false;
        match first {
            b'{' | b'[' => depth = 1,
            b'"' => in_string = true,
            _ => {}
        }

        loop {
            let Some(b) = self.next_byte()? else {
                return Err(self.malformed("unexpected end of input inside array"));
            };
            if in_string {
                buf.push(b);
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => {
                    in_string = true;
                    buf.push(b);
                }
                b'{' | b'[' => {
                    depth += 1;
                    buf.push(b);
                }
                b'}' | b']' if depth == 0 => {
                    if b == b']' {
                        return Ok((buf, b));
                    }
                    return Err(self.malformed("unbalanced '}' in array"));
                }
                b'}' | b']' => {
                    depth -= 1;
                    buf.push(b);
                }
                b',' if depth == 0 => return Ok((buf, b)),
                _ => buf.push(b),
            }
        }
    }

    fn advance(&mut self) -> LoadResult<Option<Value>> {
        if self.stage == Stage::Closed {
            return self.finish().map(|_| None);
        }
        if self.stage == Stage::Start {
            match self.next_non_ws()? {
                Some(b'[') => self.stage = Stage::FirstItem,
                _ => return Err(self.malformed("expected a top-level array")),
            }
        }

        let first = match (self.stage, self.next_non_ws()?) {
            (Stage::Done, _) => return Ok(None),
            (_, None) => return Err(self.malformed("unexpected end of input inside array")),
            (Stage::FirstItem, Some(b']')) => return self.finish().map(|_| None),
            (_, Some(b']')) | (_, Some(b',')) => {
                return Err(self.malformed("expected an array element"));
            }
            (_, Some(b)) => b,
        };

        let (bytes, terminator) = self.scan_element(first)?;
        let idx = self.index;
        self.index += 1;
        let value = serde_json::from_slice::<Value>(&bytes)
            .map_err(|e| self.malformed(format!("array item {idx}: {e}")))?;

        self.stage = if terminator == b']' {
            Stage::Closed
        } else {
            Stage::NextItem
        };
        Ok(Some(value))
    }

    fn finish(&mut self) -> LoadResult<()> {
        self.stage = Stage::Done;
        match self.next_non_ws()? {
            None => Ok(()),
            Some(_) => Err(self.malformed("trailing characters after top-level array")),
        }
    }
}

#[cfg(feature = "json-items")]
impl Iterator for ArrayItemIter {
    type Item = LoadResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stage == Stage::Done {
            return None;
        }
        match self.advance() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => None,
            Err(e) => {
                self.stage = Stage::Done;
                Some(Err(e))
            }
        }
    }
}
