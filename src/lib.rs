//! `data-loader` is a small library for loading CSV, JSON and XML files into plain in-memory
//! values, or into lazy streams when the input is large.
//!
//! The primary entrypoint is [`ingestion::read_data`], which resolves the format (explicit
//! override, file extension, then content sniffing), decides between a full load and a stream,
//! and returns a [`types::DataEnvelope`] tagged with the resolved format.
//!
//! ## What you can load
//!
//! **File formats:**
//!
//! - **CSV**: `.csv`, headed by a header row. Rows are [`types::Row`] maps, optionally keyed by
//!   an index column (by default the first column).
//! - **JSON**: `.json`. Full loads return the parsed [`serde_json::Value`]; streaming reads
//!   newline-delimited files line by line and large top-level arrays item by item.
//! - **XML**: `.xml`. Item elements become [`types::Record`]s: attributes prefixed with `@`,
//!   child element text as values.
//!
//! Files without a recognised extension are sniffed: a leading `{` or `[` is JSON, a leading `<`
//! is XML, and anything else is CSV.
//!
//! ## Quick examples: load data
//!
//! ```no_run
//! use data_loader::ingestion::{read_data, LoadOptions};
//! use data_loader::types::{CsvData, Payload};
//!
//! # fn main() -> Result<(), data_loader::LoadError> {
//! // Keyed by the first column.
//! let env = read_data("people.csv", &LoadOptions::default())?;
//! if let Payload::Csv(CsvData::Keyed(rows)) = &env.data {
//!     println!("rows={}", rows.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Streaming is chosen when `stream` is set or the file is at least `memory_threshold` bytes:
//!
//! ```no_run
//! use data_loader::ingestion::{read_data, LoadOptions};
//! use data_loader::types::{Payload, XmlData};
//!
//! # fn main() -> Result<(), data_loader::LoadError> {
//! let opts = LoadOptions {
//!     stream: true,
//!     xml_item_tag: Some("person".to_string()),
//!     ..Default::default()
//! };
//! if let Payload::Xml(XmlData::Stream(records)) = read_data("people.xml", &opts)?.data {
//!     for record in records {
//!         println!("{:?}", record?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## CSV utility reader
//!
//! [`ingestion::read_csv_to_dict`] is an independent CSV surface with a configurable delimiter,
//! an equality filter and an explicit duplicate-key policy:
//!
//! ```no_run
//! use data_loader::ingestion::{read_csv_to_dict, CsvDictOptions, CsvTable};
//!
//! # fn main() -> Result<(), data_loader::LoadError> {
//! let opts = CsvDictOptions {
//!     key: Some("city".to_string()),
//!     allow_duplicates: true,
//!     ..Default::default()
//! };
//! if let CsvTable::Grouped(groups) = read_csv_to_dict("people.csv", &opts)? {
//!     for (city, rows) in groups {
//!         println!("{city}: {}", rows.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: the loader entrypoint, format detection, streaming policy and the
//!   format-specific readers
//! - [`types`]: formats, rows/records and the result envelope
//! - [`error`]: error types used across loading
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (`debug` for load decisions, `warn` for the JSON
//! item-streaming fallback). Install a subscriber in your application to see them, or attach a
//! [`ingestion::LoadObserver`] through [`ingestion::LoadOptions::observer`].

pub mod error;
pub mod ingestion;
pub mod types;

pub use error::{FieldsLocation, LoadError, LoadResult};
pub use ingestion::read_data;
pub use types::{DataEnvelope, DataFormat, Payload};
