use std::io::{BufRead, Read, Write};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tempfile::NamedTempFile;

use data_loader::ingestion::json::{
    JsonStream, JsonStreamStrategy, JsonValueIter, NdjsonStream, stream_strategy,
};
use data_loader::ingestion::{
    JsonItemSource, JsonItemsCapability, LoadContext, LoadObserver, LoadOptions, LoadSeverity,
    LoadStats, read_data,
};
use data_loader::types::{JsonData, Payload};
use data_loader::{DataFormat, FieldsLocation, LoadError};

fn tmp_json(contents: &str) -> NamedTempFile {
    tmp_json_bytes(contents.as_bytes())
}

fn tmp_json_bytes(contents: &[u8]) -> NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    f.write_all(contents).unwrap();
    f.flush().unwrap();
    f
}

fn required(fields: &[&str]) -> LoadOptions {
    LoadOptions {
        required_fields: fields.iter().map(|f| f.to_string()).collect(),
        ..Default::default()
    }
}

fn streaming(json_items: JsonItemsCapability) -> LoadOptions {
    LoadOptions {
        stream: true,
        json_items,
        ..Default::default()
    }
}

#[test]
fn full_load_with_present_required_fields() {
    let f = tmp_json(r#"{"a":1,"b":2}"#);
    let env = read_data(f.path(), &required(&["a", "b"])).unwrap();
    assert_eq!(env.format, DataFormat::Json);
    let Payload::Json(JsonData::Value(v)) = env.data else {
        panic!("expected a full document");
    };
    assert_eq!(v, json!({"a": 1, "b": 2}));
}

#[test]
fn full_load_with_missing_required_field() {
    let f = tmp_json(r#"{"a":1,"b":2}"#);
    let err = read_data(f.path(), &required(&["c"])).unwrap_err();
    match err {
        LoadError::MissingFields { location, missing } => {
            assert_eq!(location, FieldsLocation::Object);
            assert_eq!(missing, vec!["c".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn non_object_array_element_is_named_by_index() {
    let f = tmp_json(r#"[{"id":1},{"id":2},7]"#);
    let err = read_data(f.path(), &required(&["id"])).unwrap_err();
    assert!(matches!(
        err,
        LoadError::MissingFields {
            location: FieldsLocation::Element(2),
            ..
        }
    ));
    assert!(err.to_string().contains("json array element 2"), "{err}");
}

#[test]
fn invalid_document_is_malformed_with_a_line() {
    let f = tmp_json("{\n  \"a\": 1,\n  \"b\": \n}");
    let err = read_data(f.path(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::MalformedJson { line: Some(4), .. }), "{err:?}");
}

#[test]
fn invalid_utf8_is_malformed_not_io() {
    let f = tmp_json_bytes(b"{\"a\": \"\xff\"}");
    let err = read_data(f.path(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, LoadError::MalformedJson { .. }), "{err:?}");
    assert_eq!(LoadSeverity::for_error(&err), LoadSeverity::Error);

    let lines = tmp_json_bytes(b"\n{\"a\": \"\xff\"}\n{\"b\": 2}\n");
    let err = stream_strategy(lines.path()).unwrap_err();
    assert!(matches!(err, LoadError::MalformedJson { line: Some(1), .. }), "{err:?}");
}

#[test]
fn ndjson_whose_lines_are_arrays_is_streamed_per_line() {
    let f = tmp_json("[1,2]\n\n[3,4]\n");
    assert_eq!(stream_strategy(f.path()).unwrap(), JsonStreamStrategy::Ndjson);

    let env = read_data(f.path(), &streaming(JsonItemsCapability::detect())).unwrap();
    let Payload::Json(JsonData::Stream(stream)) = env.data else {
        panic!("expected a stream");
    };
    let values: Vec<Value> = stream.collect::<Result<_, _>>().unwrap();
    assert_eq!(values, vec![json!([1, 2]), json!([3, 4])]);
}

#[test]
fn single_line_array_is_streamed_item_by_item() {
    let f = tmp_json("[{\"id\":1},{\"id\":2}]\n");
    assert_eq!(stream_strategy(f.path()).unwrap(), JsonStreamStrategy::ArrayItems);
}

#[test]
fn stream_strategy_per_layout() {
    assert_eq!(
        stream_strategy("tests/fixtures/events.ndjson").unwrap(),
        JsonStreamStrategy::Ndjson
    );
    assert_eq!(
        stream_strategy("tests/fixtures/people.json").unwrap(),
        JsonStreamStrategy::ArrayItems
    );
    assert_eq!(
        stream_strategy("tests/fixtures/settings.json").unwrap(),
        JsonStreamStrategy::WholeDocument
    );

    let blank = tmp_json("\n  \n");
    assert!(matches!(
        stream_strategy(blank.path()),
        Err(LoadError::EmptyOrUnreadable { .. })
    ));
}

#[test]
fn ndjson_is_streamed_line_by_line() {
    let env = read_data("tests/fixtures/events.ndjson", &streaming(JsonItemsCapability::detect())).unwrap();
    let Payload::Json(JsonData::Stream(JsonStream::Ndjson(stream))) = env.data else {
        panic!("expected an NDJSON stream");
    };
    let values: Vec<Value> = stream.collect::<Result<_, _>>().unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[1]["bytes"], json!(2048));
}

#[test]
fn ndjson_error_names_the_zero_based_line() {
    let f = tmp_json("{\"id\":1}\n\n{\"id\":\n{\"id\":3}\n");
    let mut stream = NdjsonStream::new(f.path());
    assert_eq!(stream.next().unwrap().unwrap(), json!({"id": 1}));
    let err = stream.next().unwrap().unwrap_err();
    assert!(matches!(err, LoadError::MalformedJson { line: Some(2), .. }), "{err:?}");
    assert!(stream.next().is_none());
    assert!(!stream.is_open());
}

#[test]
fn streaming_skips_required_field_validation() {
    let opts = LoadOptions {
        required_fields: vec!["definitely_missing".to_string()],
        ..streaming(JsonItemsCapability::detect())
    };
    let env = read_data("tests/fixtures/events.ndjson", &opts).unwrap();
    assert!(env.data.is_stream());
}

#[cfg(feature = "json-items")]
#[test]
fn top_level_array_is_streamed_item_by_item() {
    let env = read_data("tests/fixtures/people.json", &streaming(JsonItemsCapability::detect())).unwrap();
    let Payload::Json(JsonData::Stream(JsonStream::Items(items))) = env.data else {
        panic!("expected an item stream");
    };
    let names: Vec<Value> = items.map(|v| v.unwrap()["name"].clone()).collect();
    assert_eq!(names, vec![json!("Ana"), json!("Juan"), json!("Luz")]);
}

#[test]
fn multi_line_document_is_loaded_in_full_even_when_streaming() {
    let env = read_data("tests/fixtures/settings.json", &streaming(JsonItemsCapability::detect())).unwrap();
    let Payload::Json(JsonData::Value(v)) = env.data else {
        panic!("expected a full document");
    };
    assert_eq!(v["formats"], json!(["csv", "json", "xml"]));
}

/// Yields the array elements in reverse; stands in for an external parser.
struct Reversed;

impl JsonItemSource for Reversed {
    fn items_of(&self, mut input: Box<dyn BufRead + Send>) -> JsonValueIter {
        let mut text = String::new();
        let parsed = input
            .read_to_string(&mut text)
            .map_err(LoadError::from)
            .and_then(|_| Ok(serde_json::from_str::<Vec<Value>>(&text)?));
        match parsed {
            Ok(mut items) => {
                items.reverse();
                Box::new(items.into_iter().map(Ok)) as JsonValueIter
            }
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

#[test]
fn injected_item_source_is_used() {
    let capability = JsonItemsCapability::Available(Arc::new(Reversed));
    let env = read_data("tests/fixtures/people.json", &streaming(capability)).unwrap();
    let Payload::Json(JsonData::Stream(stream)) = env.data else {
        panic!("expected a stream");
    };
    let ids: Vec<Value> = stream.map(|v| v.unwrap()["id"].clone()).collect();
    assert_eq!(ids, vec![json!(3), json!(2), json!(1)]);
}

#[derive(Default)]
struct WarningRecorder {
    warnings: Mutex<Vec<String>>,
    successes: Mutex<Vec<LoadStats>>,
}

impl LoadObserver for WarningRecorder {
    fn on_success(&self, _ctx: &LoadContext, stats: LoadStats) {
        self.successes.lock().unwrap().push(stats);
    }

    fn on_warning(&self, ctx: &LoadContext, severity: LoadSeverity, message: &str) {
        assert_eq!(ctx.format, Some(DataFormat::Json));
        assert_eq!(severity, LoadSeverity::Warning);
        self.warnings.lock().unwrap().push(message.to_string());
    }
}

#[test]
fn unavailable_item_streaming_falls_back_to_full_load_with_a_warning() {
    let obs = Arc::new(WarningRecorder::default());
    let opts = LoadOptions {
        observer: Some(obs.clone()),
        required_fields: vec!["id".to_string()],
        ..streaming(JsonItemsCapability::unavailable("no parser installed"))
    };

    let env = read_data("tests/fixtures/people.json", &opts).unwrap();
    let Payload::Json(JsonData::Value(Value::Array(items))) = env.data else {
        panic!("expected the whole array");
    };
    assert_eq!(items.len(), 3);

    let warnings = obs.warnings.lock().unwrap().clone();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("no parser installed"), "{}", warnings[0]);

    let successes = obs.successes.lock().unwrap().clone();
    assert_eq!(
        successes,
        vec![LoadStats {
            records: Some(3),
            streamed: false
        }]
    );
}

#[test]
fn fallback_full_load_still_validates_required_fields() {
    let opts = LoadOptions {
        required_fields: vec!["email".to_string()],
        ..streaming(JsonItemsCapability::unavailable("disabled"))
    };
    let err = read_data("tests/fixtures/people.json", &opts).unwrap_err();
    assert!(matches!(
        err,
        LoadError::MissingFields {
            location: FieldsLocation::Element(0),
            ..
        }
    ));
}
