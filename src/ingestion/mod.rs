//! Loading entrypoints and implementations.
//!
//! Most callers should use [`read_data`] (from [`unified`]) which:
//!
//! - resolves the format (explicit override, extension, then content sniffing; see [`detect`])
//! - decides between a full load and a lazy stream (see [`policy`])
//! - dispatches to the matching reader and wraps the result in a [`crate::types::DataEnvelope`]
//! - optionally reports success/failure/warnings to a [`LoadObserver`]
//!
//! Format-specific functions are also available under:
//! - [`csv`] (loader surface and the lazy CSV streams)
//! - [`csv_dict`] (general-purpose CSV reader with filters and a duplicate-key policy)
//! - [`json`]
//! - [`xml`]

use std::fs::File;
use std::io;
use std::path::Path;

use crate::error::{LoadError, LoadResult};

pub mod csv;
pub mod csv_dict;
pub mod detect;
pub mod json;
mod lazy;
pub mod observability;
pub mod policy;
pub mod unified;
pub mod xml;

pub use csv_dict::{read_csv_to_dict, CsvDictOptions, CsvTable};
pub use detect::{detect_format, sniff_format, SNIFF_WINDOW};
pub use json::{JsonItemSource, JsonItemsCapability};
pub use observability::{
    CompositeObserver, FileObserver, LoadContext, LoadObserver, LoadSeverity, LoadStats,
    TracingObserver,
};
pub use policy::{should_stream, DEFAULT_MEMORY_THRESHOLD};
pub use unified::{read_data, LoadOptions, LoadRequest};

/// Open `path` for reading, mapping a missing file to [`LoadError::FileNotFound`].
pub(crate) fn open_input(path: &Path) -> LoadResult<File> {
    File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LoadError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => LoadError::Io(e),
    })
}
