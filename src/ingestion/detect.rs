//! Format detection: explicit override, then file extension, then content sniffing.

use std::io::Read;
use std::path::Path;

use crate::error::{LoadError, LoadResult};
use crate::types::DataFormat;

use super::open_input;

/// Number of leading bytes inspected when sniffing file content.
pub const SNIFF_WINDOW: usize = 2048;

/// Resolve the format of `path`.
///
/// Precedence:
///
/// 1. `explicit`, lower-cased; anything other than `csv`/`json`/`xml` is
///    [`LoadError::UnsupportedFormat`].
/// 2. The file extension (`.csv`, `.json`, `.xml`, case-insensitive).
/// 3. The first [`SNIFF_WINDOW`] bytes of content (see [`sniff_format`]).
///
/// Only step 3 touches the filesystem.
pub fn detect_format(path: impl AsRef<Path>, explicit: Option<&str>) -> LoadResult<DataFormat> {
    let path = path.as_ref();
    if let Some(fmt) = explicit {
        return fmt.parse();
    }

    if let Some(fmt) = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(DataFormat::from_extension)
    {
        return Ok(fmt);
    }

    let head = read_head(path)?;
    sniff_format(&head).ok_or_else(|| LoadError::EmptyOrUnreadable {
        path: path.to_path_buf(),
    })
}

/// Classify content by its first non-whitespace byte.
///
/// `{` or `[` is JSON, `<` (which includes an `<?xml` declaration) is XML and anything else is
/// CSV. Returns `None` when there is nothing but whitespace.
pub fn sniff_format(head: &[u8]) -> Option<DataFormat> {
    let first = head.iter().copied().find(|b| !b.is_ascii_whitespace())?;
    Some(match first {
        b'{' | b'[' => DataFormat::Json,
        b'<' => DataFormat::Xml,
        _ => DataFormat::Csv,
    })
}

fn read_head(path: &Path) -> LoadResult<Vec<u8>> {
    let file = open_input(path)?;
    let mut head = Vec::with_capacity(SNIFF_WINDOW);
    file.take(SNIFF_WINDOW as u64).read_to_end(&mut head)?;
    Ok(head)
}
