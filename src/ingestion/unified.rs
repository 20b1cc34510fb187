//! Unified loading entrypoint.
//!
//! Most callers should use [`read_data`], which resolves the format of a file, decides between
//! a full load and a lazy stream, and returns a [`DataEnvelope`] whose payload matches the
//! resolved format.
//!
//! - If [`LoadOptions::format`] is `None`, the format is inferred from the extension and then
//!   from the file content.
//! - If a [`LoadObserver`] is provided, success/failure/alerts and the item-streaming fallback
//!   are reported to it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{LoadError, LoadResult};
use crate::types::{CsvData, DataEnvelope, DataFormat, IndexColumn, JsonData, Payload, XmlData};

use super::csv::{CsvKeyedStream, CsvRowStream, read_csv_keyed, read_csv_rows};
use super::detect::detect_format;
use super::json::{
    JsonItemStream, JsonItemsCapability, JsonStream, JsonStreamStrategy, NdjsonStream,
    read_json_full, stream_strategy, validate_required_fields,
};
use super::observability::{LoadContext, LoadObserver, LoadSeverity, LoadStats};
use super::policy::{DEFAULT_MEMORY_THRESHOLD, should_stream};
use super::xml::{XmlRecordStream, read_xml_full};

/// Options controlling [`read_data`].
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct LoadOptions {
    /// Explicit format (`csv`, `json` or `xml`, case-insensitive). If `None`, auto-detect.
    pub format: Option<String>,
    /// CSV column used to key rows. Defaults to the first column; `None` returns plain rows.
    pub index_col: Option<IndexColumn>,
    /// Top-level fields every JSON object must carry (full loads only).
    pub required_fields: Vec<String>,
    /// Force streaming regardless of file size.
    pub stream: bool,
    /// File size in bytes at or above which streaming is chosen.
    pub memory_threshold: u64,
    /// XML element name whose occurrences become records.
    pub xml_item_tag: Option<String>,
    /// Item-streaming capability for large top-level JSON arrays.
    pub json_items: JsonItemsCapability,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn LoadObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: LoadSeverity,
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("format", &self.format)
            .field("index_col", &self.index_col)
            .field("required_fields", &self.required_fields)
            .field("stream", &self.stream)
            .field("memory_threshold", &self.memory_threshold)
            .field("xml_item_tag", &self.xml_item_tag)
            .field("json_items", &self.json_items)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: None,
            index_col: Some(IndexColumn::default()),
            required_fields: Vec::new(),
            stream: false,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            xml_item_tag: None,
            json_items: JsonItemsCapability::default(),
            observer: None,
            alert_at_or_above: LoadSeverity::Critical,
        }
    }
}

/// Load `path` as CSV, JSON or XML.
///
/// Steps: the path must exist ([`LoadError::FileNotFound`]), the format is resolved by
/// [`detect_format`], the file size and `options.stream` go through [`should_stream`], and the
/// matching reader runs in the chosen mode.
///
/// | format | full load | streaming |
/// |--------|-----------|-----------|
/// | CSV | [`CsvData::Rows`] or [`CsvData::Keyed`] | [`CsvData::RowStream`] or [`CsvData::KeyedStream`] |
/// | JSON | [`JsonData::Value`] | [`JsonData::Stream`] (NDJSON lines or array items) |
/// | XML | [`XmlData::Records`] | [`XmlData::Stream`] |
///
/// A streamed JSON document that is neither NDJSON nor a top-level array is loaded in full.
/// A top-level array is also loaded in full when `options.json_items` is
/// [`JsonItemsCapability::Unavailable`]; that fallback is logged as a warning and reported to
/// the observer's `on_warning` with [`LoadSeverity::Warning`], never as an error.
/// `required_fields` is checked only on full JSON loads.
///
/// Errors from lazy streams surface when the stream is first pulled, not here.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` on success, with record count stats (`None` for streams)
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `options.alert_at_or_above`
///
/// # Examples
///
/// ## CSV keyed by a named column
///
/// ```no_run
/// use data_loader::ingestion::{read_data, LoadOptions};
/// use data_loader::types::{CsvData, IndexColumn, Payload};
///
/// # fn main() -> Result<(), data_loader::LoadError> {
/// let opts = LoadOptions {
///     index_col: Some(IndexColumn::from("id")),
///     ..Default::default()
/// };
/// let env = read_data("people.csv", &opts)?;
/// if let Payload::Csv(CsvData::Keyed(rows)) = env.data {
///     println!("keys={:?}", rows.keys().collect::<Vec<_>>());
/// }
/// # Ok(())
/// # }
/// ```
///
/// ## Streaming NDJSON
///
/// ```no_run
/// use data_loader::ingestion::{read_data, LoadOptions};
/// use data_loader::types::{JsonData, Payload};
///
/// # fn main() -> Result<(), data_loader::LoadError> {
/// let opts = LoadOptions {
///     stream: true,
///     ..Default::default()
/// };
/// if let Payload::Json(JsonData::Stream(values)) = read_data("events.json", &opts)?.data {
///     for value in values {
///         println!("{}", value?);
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// ## Force a format explicitly (override detection)
///
/// ```no_run
/// use data_loader::ingestion::{read_data, LoadOptions};
///
/// # fn main() -> Result<(), data_loader::LoadError> {
/// let opts = LoadOptions {
///     format: Some("xml".to_string()),
///     xml_item_tag: Some("person".to_string()),
///     ..Default::default()
/// };
/// let env = read_data("export.dat", &opts)?;
/// println!("records={:?}", env.data.record_count());
/// # Ok(())
/// # }
/// ```
///
/// ## Observability (tracing + alert threshold)
///
/// ```no_run
/// use std::sync::Arc;
///
/// use data_loader::ingestion::{read_data, LoadOptions, LoadSeverity, TracingObserver};
///
/// let opts = LoadOptions {
///     observer: Some(Arc::new(TracingObserver)),
///     alert_at_or_above: LoadSeverity::Critical,
///     ..Default::default()
/// };
///
/// // Missing files are treated as Critical and will trigger `on_alert` at this threshold.
/// let _err = read_data("does_not_exist.csv", &opts).unwrap_err();
/// ```
pub fn read_data(path: impl AsRef<Path>, options: &LoadOptions) -> LoadResult<DataEnvelope> {
    let path = path.as_ref();
    let mut ctx = LoadContext {
        path: path.to_path_buf(),
        format: None,
        file_size: None,
        streaming: false,
    };

    let result = load(path, options, &mut ctx);

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(env) => obs.on_success(
                &ctx,
                LoadStats {
                    records: env.data.record_count(),
                    streamed: env.data.is_stream(),
                },
            ),
            Err(e) => {
                let sev = LoadSeverity::for_error(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result
}

fn load(path: &Path, options: &LoadOptions, ctx: &mut LoadContext) -> LoadResult<DataEnvelope> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let format = detect_format(path, options.format.as_deref())?;
    ctx.format = Some(format);
    let size = path.metadata()?.len();
    ctx.file_size = Some(size);
    let streaming = should_stream(options.stream, size, options.memory_threshold);
    ctx.streaming = streaming;

    tracing::debug!(
        path = %path.display(),
        %format,
        size,
        streaming,
        "loading"
    );

    let data = match format {
        DataFormat::Csv => Payload::Csv(load_csv(path, options, streaming)?),
        DataFormat::Json => Payload::Json(load_json(path, options, streaming, ctx)?),
        DataFormat::Xml => Payload::Xml(load_xml(path, options, streaming)?),
    };

    Ok(DataEnvelope { format, data })
}

fn load_csv(path: &Path, options: &LoadOptions, streaming: bool) -> LoadResult<CsvData> {
    Ok(match (streaming, &options.index_col) {
        (false, None) => CsvData::Rows(read_csv_rows(path)?),
        (false, Some(key)) => CsvData::Keyed(read_csv_keyed(path, key)?),
        (true, None) => CsvData::RowStream(CsvRowStream::new(path)),
        (true, Some(key)) => CsvData::KeyedStream(CsvKeyedStream::new(path, key.clone())),
    })
}

fn load_json(
    path: &Path,
    options: &LoadOptions,
    streaming: bool,
    ctx: &LoadContext,
) -> LoadResult<JsonData> {
    if !streaming {
        return load_json_full(path, options);
    }

    match stream_strategy(path)? {
        JsonStreamStrategy::Ndjson => Ok(JsonData::Stream(JsonStream::Ndjson(NdjsonStream::new(path)))),
        JsonStreamStrategy::ArrayItems => match &options.json_items {
            JsonItemsCapability::Available(source) => Ok(JsonData::Stream(JsonStream::Items(
                JsonItemStream::new(path, Arc::clone(source)),
            ))),
            JsonItemsCapability::Unavailable { reason } => {
                let message =
                    format!("json item streaming unavailable ({reason}); loading the whole document");
                tracing::warn!(path = %path.display(), "{message}");
                if let Some(obs) = options.observer.as_ref() {
                    obs.on_warning(ctx, LoadSeverity::Warning, &message);
                }
                load_json_full(path, options)
            }
        },
        JsonStreamStrategy::WholeDocument => {
            tracing::debug!(path = %path.display(), "json document is not line-delimited; loading in full");
            load_json_full(path, options)
        }
    }
}

fn load_json_full(path: &Path, options: &LoadOptions) -> LoadResult<JsonData> {
    let value = read_json_full(path)?;
    validate_required_fields(&value, &options.required_fields)?;
    Ok(JsonData::Value(value))
}

fn load_xml(path: &Path, options: &LoadOptions, streaming: bool) -> LoadResult<XmlData> {
    Ok(if streaming {
        XmlData::Stream(XmlRecordStream::new(path, options.xml_item_tag.clone()))
    } else {
        XmlData::Records(read_xml_full(path, options.xml_item_tag.as_deref())?)
    })
}

/// Convenience helper for callers that want an owned request object.
///
/// This can be useful if you want to enqueue load work in a job system.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Path to the input file.
    pub path: PathBuf,
    /// Options controlling the load.
    pub options: LoadOptions,
}

impl LoadRequest {
    /// Create a request with default options.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: LoadOptions::default(),
        }
    }

    /// Execute the request by calling [`read_data`].
    pub fn run(&self) -> LoadResult<DataEnvelope> {
        read_data(&self.path, &self.options)
    }
}
