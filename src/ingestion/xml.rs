//! XML loading implementation.
//!
//! Each item element becomes a [`Record`]:
//!
//! - every immediate child element becomes a field keyed by its tag, holding the child's trimmed
//!   text (or `null` when the child has no text)
//! - every attribute becomes a field keyed `@name` (namespace declarations are skipped)
//!
//! Tags are matched by their raw name as written, prefix included (`ns:item`).
//!
//! [`read_xml_full`] builds the whole tree first. [`XmlRecordStream`] works from start/end events
//! and only keeps the currently open element path in memory.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;

use crate::error::{LoadError, LoadResult};
use crate::types::Record;

use super::lazy::Lazy;
use super::open_input;

/// Load an XML document and collect its item records.
///
/// With `item_tag`, every element with that tag anywhere below the root is an item, in document
/// order. Without it, the direct children of the root are the items.
pub fn read_xml_full(path: impl AsRef<Path>, item_tag: Option<&str>) -> LoadResult<Vec<Record>> {
    let reader = Reader::from_reader(BufReader::new(open_input(path.as_ref())?));
    let root = parse_tree(reader)?;
    Ok(collect_items(&root, item_tag))
}

/// [`read_xml_full`] over an in-memory document.
pub fn read_xml_from_str(input: &str, item_tag: Option<&str>) -> LoadResult<Vec<Record>> {
    let root = parse_tree(Reader::from_str(input))?;
    Ok(collect_items(&root, item_tag))
}

#[derive(Debug)]
struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        for child in &self.children {
            record.insert(child.tag.clone(), text_value(child.text.as_deref()));
        }
        insert_attributes(&mut record, &self.attributes);
        record
    }
}

fn collect_items(root: &Element, item_tag: Option<&str>) -> Vec<Record> {
    match item_tag {
        Some(tag) => {
            let mut out = Vec::new();
            for child in &root.children {
                collect_descendants(child, tag, &mut out);
            }
            out
        }
        None => root.children.iter().map(Element::to_record).collect(),
    }
}

fn collect_descendants(el: &Element, tag: &str, out: &mut Vec<Record>) {
    if el.tag == tag {
        out.push(el.to_record());
    }
    for child in &el.children {
        collect_descendants(child, tag, out);
    }
}

fn parse_tree<R: BufRead>(mut reader: Reader<R>) -> LoadResult<Element> {
    reader.check_end_names(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match read_owned_event(&mut reader, &mut buf)? {
            XmlEvent::Open {
                tag,
                attributes,
                empty,
            } => {
                if stack.is_empty() && root.is_some() {
                    return Err(malformed(&reader, "junk after document element"));
                }
                let el = Element {
                    tag,
                    attributes,
                    text: None,
                    children: Vec::new(),
                };
                if empty {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(el),
                        None => root = Some(el),
                    }
                } else {
                    stack.push(el);
                }
            }
            XmlEvent::Text(text) => match stack.last_mut() {
                Some(top) if top.children.is_empty() => {
                    top.text.get_or_insert_with(String::new).push_str(&text);
                }
                Some(_) => {}
                None if text.trim().is_empty() => {}
                None => return Err(malformed(&reader, "text outside the root element")),
            },
            XmlEvent::Close => {
                let Some(el) = stack.pop() else {
                    return Err(malformed(&reader, "unexpected closing tag"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(el),
                    None => root = Some(el),
                }
            }
            XmlEvent::Eof => {
                if !stack.is_empty() {
                    return Err(malformed(&reader, "unclosed element at end of document"));
                }
                return root.ok_or_else(|| malformed(&reader, "no element found"));
            }
            XmlEvent::Other => {}
        }
    }
}

/// Lazy, single-pass stream of XML item records.
///
/// With an item tag, only elements with that tag are items. Without one, any element that
/// contains child elements is treated as an item when it closes; this includes container
/// elements and the root itself, whose already-yielded children show up as `null` fields.
///
/// A yielded element is released immediately, so memory is bounded by the nesting depth rather
/// than the document size.
pub struct XmlRecordStream {
    path: PathBuf,
    item_tag: Option<String>,
    state: Lazy<XmlCursor>,
}

impl XmlRecordStream {
    /// Create a stream over `path`. No I/O happens until the first pull.
    pub fn new(path: impl Into<PathBuf>, item_tag: Option<String>) -> Self {
        Self {
            path: path.into(),
            item_tag,
            state: Lazy::Pending,
        }
    }

    /// `true` while the underlying file is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }
}

impl Iterator for XmlRecordStream {
    type Item = LoadResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let (path, item_tag) = (&self.path, &self.item_tag);
        self.state.pull(
            || {
                let mut reader = Reader::from_reader(BufReader::new(open_input(path)?));
                reader.check_end_names(true);
                Ok(XmlCursor {
                    reader,
                    buf: Vec::new(),
                    stack: Vec::new(),
                    item_tag: item_tag.clone(),
                    seen_root: false,
                })
            },
            |cursor| cursor.next_record().transpose(),
        )
    }
}

impl fmt::Debug for XmlRecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XmlRecordStream")
            .field("path", &self.path)
            .field("item_tag", &self.item_tag)
            .field("state", &self.state.state_name())
            .finish()
    }
}

/// An open element on the streaming path.
struct Frame {
    tag: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    has_children: bool,
    // Child fields, only tracked for elements that may become items.
    fields: Option<Record>,
}

struct XmlCursor {
    reader: Reader<BufReader<File>>,
    buf: Vec<u8>,
    stack: Vec<Frame>,
    item_tag: Option<String>,
    seen_root: bool,
}

impl XmlCursor {
    fn next_record(&mut self) -> LoadResult<Option<Record>> {
        loop {
            match read_owned_event(&mut self.reader, &mut self.buf)? {
                XmlEvent::Open {
                    tag,
                    attributes,
                    empty,
                } => {
                    if self.stack.is_empty() && self.seen_root {
                        return Err(malformed(&self.reader, "junk after document element"));
                    }
                    self.seen_root = true;
                    if let Some(parent) = self.stack.last_mut() {
                        parent.has_children = true;
                    }
                    let tracked = self.item_tag.as_deref().is_none_or(|t| t == tag);
                    let frame = Frame {
                        tag,
                        attributes,
                        text: None,
                        has_children: false,
                        fields: tracked.then(Record::new),
                    };
                    if empty {
                        if let Some(record) = self.close(frame) {
                            return Ok(Some(record));
                        }
                    } else {
                        self.stack.push(frame);
                    }
                }
                XmlEvent::Text(text) => match self.stack.last_mut() {
                    Some(top) if !top.has_children => {
                        top.text.get_or_insert_with(String::new).push_str(&text);
                    }
                    Some(_) => {}
                    None if text.trim().is_empty() => {}
                    None => return Err(malformed(&self.reader, "text outside the root element")),
                },
                XmlEvent::Close => {
                    let Some(frame) = self.stack.pop() else {
                        return Err(malformed(&self.reader, "unexpected closing tag"));
                    };
                    if let Some(record) = self.close(frame) {
                        return Ok(Some(record));
                    }
                }
                XmlEvent::Eof => {
                    if !self.stack.is_empty() {
                        return Err(malformed(&self.reader, "unclosed element at end of document"));
                    }
                    if !self.seen_root {
                        return Err(malformed(&self.reader, "no element found"));
                    }
                    return Ok(None);
                }
                XmlEvent::Other => {}
            }
        }
    }

    /// Finish a closed element: turn it into a record if it is an item and report it to its
    /// parent. A yielded item is reported as an empty child.
    fn close(&mut self, mut frame: Frame) -> Option<Record> {
        let is_item = match self.item_tag.as_deref() {
            Some(tag) => frame.tag == tag,
            None => frame.has_children,
        };

        let (child_value, record) = if is_item {
            let mut record = frame.fields.take().unwrap_or_default();
            insert_attributes(&mut record, &frame.attributes);
            (Value::Null, Some(record))
        } else {
            (text_value(frame.text.as_deref()), None)
        };

        if let Some(fields) = self.stack.last_mut().and_then(|p| p.fields.as_mut()) {
            fields.insert(frame.tag, child_value);
        }
        record
    }
}

/// Owned form of the quick-xml events both parsers care about.
enum XmlEvent {
    Open {
        tag: String,
        attributes: Vec<(String, String)>,
        empty: bool,
    },
    Text(String),
    Close,
    Eof,
    Other,
}

fn read_owned_event<R: BufRead>(reader: &mut Reader<R>, buf: &mut Vec<u8>) -> LoadResult<XmlEvent> {
    buf.clear();
    let event = match reader.read_event_into(buf) {
        Ok(event) => event,
        Err(e @ quick_xml::Error::Io(_)) => return Err(e.into()),
        Err(e) => return Err(malformed(reader, e)),
    };
    let owned = match event {
        Event::Start(ref e) => XmlEvent::Open {
            tag: utf8(e.name().as_ref())?,
            attributes: read_attributes(e)?,
            empty: false,
        },
        Event::Empty(ref e) => XmlEvent::Open {
            tag: utf8(e.name().as_ref())?,
            attributes: read_attributes(e)?,
            empty: true,
        },
        Event::Text(ref e) => {
            let text = e.unescape().map_err(|err| malformed(reader, err))?;
            XmlEvent::Text(text.into_owned())
        }
        Event::CData(ref e) => XmlEvent::Text(utf8(e)?),
        Event::End(_) => XmlEvent::Close,
        Event::Eof => XmlEvent::Eof,
        _ => XmlEvent::Other,
    };
    Ok(owned)
}

fn read_attributes(start: &BytesStart<'_>) -> LoadResult<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = utf8(attr.key.as_ref())?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        out.push((key, attr.unescape_value()?.into_owned()));
    }
    Ok(out)
}

fn insert_attributes(record: &mut Record, attributes: &[(String, String)]) {
    for (key, value) in attributes {
        record.insert(format!("@{key}"), Value::String(value.clone()));
    }
}

fn text_value(text: Option<&str>) -> Value {
    match text {
        Some(t) => Value::String(t.trim().to_string()),
        None => Value::Null,
    }
}

fn utf8(bytes: &[u8]) -> LoadResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| LoadError::MalformedXml {
            position: None,
            message: format!("invalid utf-8: {e}"),
        })
}

fn malformed<R>(reader: &Reader<R>, message: impl fmt::Display) -> LoadError {
    LoadError::MalformedXml {
        position: Some(reader.buffer_position() as u64),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PEOPLE: &str = r#"<?xml version="1.0"?>
<people>
  <person id="1"><name>Ana</name><age> 30 </age></person>
  <group>
    <person id="2"><name>Juan</name><nick/></person>
  </group>
</people>"#;

    #[test]
    fn direct_children_without_item_tag() {
        let records = read_xml_from_str(PEOPLE, None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            Value::Object(records[0].clone()),
            json!({"name": "Ana", "age": "30", "@id": "1"})
        );
        // The container's child has no text before its own first child.
        assert_eq!(Value::Object(records[1].clone()), json!({"person": null}));
    }

    #[test]
    fn item_tag_searches_every_depth() {
        let records = read_xml_from_str(PEOPLE, Some("person")).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["name"], json!("Juan"));
        assert_eq!(records[1]["nick"], Value::Null);
        assert_eq!(records[1]["@id"], json!("2"));
    }

    #[test]
    fn entities_and_cdata_are_decoded() {
        let doc = "<r><i><a>x &amp; y</a><b><![CDATA[<raw>]]></b></i></r>";
        let records = read_xml_from_str(doc, Some("i")).unwrap();
        assert_eq!(records[0]["a"], json!("x & y"));
        assert_eq!(records[0]["b"], json!("<raw>"));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for doc in ["<a><b></a>", "<a>", "", "<a/><b/>", "text"] {
            let err = read_xml_from_str(doc, None).unwrap_err();
            assert!(matches!(err, LoadError::MalformedXml { .. }), "{doc:?} gave {err:?}");
        }
    }

    #[test]
    fn namespace_declarations_are_not_attributes() {
        let doc = r#"<r xmlns:x="urn:x"><x:i x:k="v"><n>1</n></x:i></r>"#;
        let records = read_xml_from_str(doc, Some("x:i")).unwrap();
        assert_eq!(Value::Object(records[0].clone()), json!({"n": "1", "@x:k": "v"}));
    }
}
