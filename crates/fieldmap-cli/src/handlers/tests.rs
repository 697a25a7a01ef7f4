use super::*;
use crate::cli::{OutputFormat, ParseArgs, TransformArgs, ValidateArgs};
use crate::config::Config;
use crate::error::Error;
use crate::output::OutputWriter;
use std::io::Write;
use std::path::PathBuf;
use tempfile::{Builder, NamedTempFile};

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn sink() -> OutputWriter {
    OutputWriter::with_writer(OutputFormat::Json, false, true, Box::new(std::io::sink()))
}

#[test]
fn test_parse_detects_format() {
    let file = write_temp(".xml", "<order><id>7</id><total>9.5</total></order>");
    let args = ParseArgs {
        file: file.path().to_path_buf(),
        max_depth: None,
        format: None,
    };
    handle_parse(args, &Config::default(), &mut sink()).unwrap();
}

#[test]
fn test_parse_failure_is_an_error() {
    let file = write_temp(".json", "{not json");
    let args = ParseArgs {
        file: file.path().to_path_buf(),
        max_depth: None,
        format: None,
    };
    let err = handle_parse(args, &Config::default(), &mut sink()).unwrap_err();
    assert!(matches!(err, Error::ParseFailed { .. }));
    assert_eq!(err.exit_code(), 6);
}

#[test]
fn test_parse_missing_file() {
    let args = ParseArgs {
        file: PathBuf::from("/no/such/schema.json"),
        max_depth: Some(3),
        format: None,
    };
    let err = handle_parse(args, &Config::default(), &mut sink()).unwrap_err();
    assert!(matches!(err, Error::FileNotFound { .. }));
}

#[test]
fn test_validate_reports_unmapped_required_field() {
    let source = write_temp(".json", r#"{"name": "Ada", "age": 36}"#);
    let target = write_temp(
        ".json",
        r#"{"type": "object", "required": ["fullName", "years"],
            "properties": {"fullName": {"type": "string"}, "years": {"type": "integer"}}}"#,
    );
    let connections = write_temp(".yaml", "- sourcePath: name\n  targetPath: fullName\n");
    let args = ValidateArgs {
        source: source.path().to_path_buf(),
        target: target.path().to_path_buf(),
        connections: connections.path().to_path_buf(),
    };
    let err = handle_validate(args, &Config::default(), &mut sink()).unwrap_err();
    assert!(matches!(err, Error::MappingInvalid { count: 1 }));
    assert!(err.is_reported());
}

#[test]
fn test_validate_accepts_complete_mapping() {
    let source = write_temp(".json", r#"{"name": "Ada"}"#);
    let target = write_temp(
        ".json",
        r#"{"type": "object", "required": ["fullName"], "properties": {"fullName": {"type": "string"}}}"#,
    );
    let connections = write_temp(".json", r#"[{"sourcePath": "name", "targetPath": "fullName"}]"#);
    let args = ValidateArgs {
        source: source.path().to_path_buf(),
        target: target.path().to_path_buf(),
        connections: connections.path().to_path_buf(),
    };
    handle_validate(args, &Config::default(), &mut sink()).unwrap();
}

#[test]
fn test_validate_rejects_malformed_connections() {
    let source = write_temp(".json", r#"{"a": 1}"#);
    let connections = write_temp(".json", r#"{"sourcePath": "a"}"#);
    let args = ValidateArgs {
        source: source.path().to_path_buf(),
        target: source.path().to_path_buf(),
        connections: connections.path().to_path_buf(),
    };
    let err = handle_validate(args, &Config::default(), &mut sink()).unwrap_err();
    assert!(matches!(err, Error::InvalidFormat { .. }));
}

#[tokio::test]
async fn test_transform_with_lookup_tables() {
    let record = write_temp(".json", r#"{"country": "DE", "price": "12.5"}"#);
    let rules = write_temp(
        ".json",
        r#"[
            {"id": "r1", "type": "lookup", "sourceFields": ["country"], "targetField": "countryName",
             "config": {"tableName": "countries"}},
            {"id": "r2", "type": "format_number", "sourceFields": ["price"], "targetField": "price",
             "config": {"minimumFractionDigits": 2}, "order": 1}
        ]"#,
    );
    let lookup = write_temp(".json", r#"{"countries": {"DE": "Germany"}}"#);
    let args = TransformArgs {
        record: record.path().to_path_buf(),
        rules: rules.path().to_path_buf(),
        lookup: Some(lookup.path().to_path_buf()),
        dry_run: false,
    };
    handle_transform(args, &Config::default(), &mut sink()).await.unwrap();
}

#[tokio::test]
async fn test_transform_failure_maps_to_exit_code() {
    let record = write_temp(".json", r#"{"country": "FR"}"#);
    let rules = write_temp(
        ".yaml",
        "- id: r1\n  type: lookup\n  sourceFields: [country]\n  targetField: name\n  config:\n    tableName: countries\n",
    );
    let args = TransformArgs {
        record: record.path().to_path_buf(),
        rules: rules.path().to_path_buf(),
        lookup: None,
        dry_run: true,
    };
    let err = handle_transform(args, &Config::default(), &mut sink()).await.unwrap_err();
    assert!(matches!(err, Error::TransformFailed { count: 1 }));
    assert_eq!(err.exit_code(), 8);
}

#[tokio::test]
async fn test_transform_requires_object_record() {
    let record = write_temp(".json", "[1, 2]");
    let rules = write_temp(".json", "[]");
    let args = TransformArgs {
        record: record.path().to_path_buf(),
        rules: rules.path().to_path_buf(),
        lookup: None,
        dry_run: false,
    };
    let err = handle_transform(args, &Config::default(), &mut sink()).await.unwrap_err();
    match err {
        Error::InvalidFormat { message, .. } => assert!(message.contains("found array")),
        other => panic!("unexpected error {:?}", other),
    }
}
