use std::io::Write;

use data_loader::LoadError;
use data_loader::ingestion::{CsvDictOptions, CsvTable, read_csv_to_dict};
use data_loader::types::Row;
use tempfile::NamedTempFile;

const PEOPLE: &str = "tests/fixtures/people.csv";

fn tmp_csv(contents: &str) -> NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

fn names(rows: &[Row]) -> Vec<&str> {
    rows.iter().map(|r| r["name"].as_str()).collect()
}

fn lima() -> CsvDictOptions {
    CsvDictOptions {
        filter_column: Some("city".to_string()),
        filter_value: Some("Lima".to_string()),
        ..Default::default()
    }
}

#[test]
fn plain_rows_without_a_key() {
    let CsvTable::Rows(rows) = read_csv_to_dict(PEOPLE, &CsvDictOptions::default()).unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(names(&rows), vec!["Ana", "Juan", "Luz"]);
}

#[test]
fn keyed_rows_keep_the_key_column() {
    let opts = CsvDictOptions {
        key: Some("id".to_string()),
        ..Default::default()
    };
    let CsvTable::Keyed(by_id) = read_csv_to_dict(PEOPLE, &opts).unwrap() else {
        panic!("expected keyed rows");
    };
    assert_eq!(by_id.len(), 3);
    assert_eq!(by_id["1"]["id"], "1");
    assert_eq!(by_id["1"]["name"], "Ana");
}

#[test]
fn duplicate_key_is_an_error_unless_grouping() {
    let opts = CsvDictOptions {
        key: Some("city".to_string()),
        ..Default::default()
    };
    let err = read_csv_to_dict(PEOPLE, &opts).unwrap_err();
    match err {
        LoadError::DuplicateKey { key, column } => {
            assert_eq!(key, "Lima");
            assert_eq!(column, "city");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let grouped = CsvDictOptions {
        allow_duplicates: true,
        ..opts
    };
    let CsvTable::Grouped(groups) = read_csv_to_dict(PEOPLE, &grouped).unwrap() else {
        panic!("expected grouped rows");
    };
    assert_eq!(names(&groups["Lima"]), vec!["Ana", "Luz"]);
    assert_eq!(names(&groups["Quito"]), vec!["Juan"]);
}

#[test]
fn filter_restricts_full_and_streaming_reads_alike() {
    let CsvTable::Rows(full) = read_csv_to_dict(PEOPLE, &lima()).unwrap() else {
        panic!("expected rows");
    };
    assert_eq!(names(&full), vec!["Ana", "Luz"]);
    assert!(full.iter().all(|r| r["city"] == "Lima"));

    let streaming = CsvDictOptions {
        stream: true,
        ..lima()
    };
    let CsvTable::RowStream(stream) = read_csv_to_dict(PEOPLE, &streaming).unwrap() else {
        panic!("expected a row stream");
    };
    let streamed: Vec<Row> = stream.collect::<Result<_, _>>().unwrap();
    assert_eq!(streamed, full);
}

#[test]
fn keyed_stream_yields_pairs_with_the_key_column() {
    let opts = CsvDictOptions {
        key: Some("name".to_string()),
        stream: true,
        ..lima()
    };
    let CsvTable::KeyedStream(stream) = read_csv_to_dict(PEOPLE, &opts).unwrap() else {
        panic!("expected a keyed stream");
    };
    let pairs: Vec<(String, Row)> = stream.collect::<Result<_, _>>().unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0, "Ana");
    assert_eq!(pairs[0].1["name"], "Ana");
    assert_eq!(pairs[1].0, "Luz");
}

#[test]
fn half_a_filter_is_rejected() {
    let opts = CsvDictOptions {
        filter_value: Some("Lima".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        read_csv_to_dict(PEOPLE, &opts),
        Err(LoadError::InvalidFilterParams)
    ));
}

#[test]
fn unknown_filter_column_in_stream_mode_fails_on_consumption() {
    let opts = CsvDictOptions {
        stream: true,
        filter_column: Some("country".to_string()),
        filter_value: Some("PE".to_string()),
        ..Default::default()
    };
    let CsvTable::RowStream(mut stream) = read_csv_to_dict(PEOPLE, &opts).unwrap() else {
        panic!("expected a row stream");
    };
    assert!(matches!(
        stream.next(),
        Some(Err(LoadError::UnknownColumn { ref column, .. })) if column == "country"
    ));
}

#[test]
fn unknown_key_column_in_stream_mode_fails_on_first_pull() {
    let opts = CsvDictOptions {
        key: Some("email".to_string()),
        stream: true,
        ..Default::default()
    };
    let CsvTable::KeyedStream(mut stream) = read_csv_to_dict(PEOPLE, &opts).unwrap() else {
        panic!("expected a keyed stream");
    };
    assert!(!stream.is_open());
    assert!(matches!(
        stream.next(),
        Some(Err(LoadError::UnknownColumn { ref column, .. })) if column == "email"
    ));
    assert!(stream.next().is_none());
    assert!(!stream.is_open());
}

#[test]
fn unknown_filter_column_in_full_mode_fails_immediately() {
    let opts = CsvDictOptions {
        filter_column: Some("country".to_string()),
        filter_value: Some("PE".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        read_csv_to_dict(PEOPLE, &opts),
        Err(LoadError::UnknownColumn { .. })
    ));
}

#[test]
fn custom_delimiter() {
    let f = tmp_csv("id;name\n1;Ana\n2;Juan\n");
    let opts = CsvDictOptions {
        key: Some("id".to_string()),
        delimiter: b';',
        ..Default::default()
    };
    let CsvTable::Keyed(by_id) = read_csv_to_dict(f.path(), &opts).unwrap() else {
        panic!("expected keyed rows");
    };
    assert_eq!(by_id["2"]["name"], "Juan");
}

#[test]
fn missing_file_is_reported_before_anything_else() {
    let opts = CsvDictOptions {
        stream: true,
        ..Default::default()
    };
    assert!(matches!(
        read_csv_to_dict("tests/fixtures/missing.csv", &opts),
        Err(LoadError::FileNotFound { .. })
    ));
}

#[test]
fn empty_key_value_is_rejected() {
    let f = tmp_csv("id,name\n1,Ana\n,Juan\n");
    let opts = CsvDictOptions {
        key: Some("id".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        read_csv_to_dict(f.path(), &opts),
        Err(LoadError::MissingOrEmptyKey { row: 3, .. })
    ));
}
