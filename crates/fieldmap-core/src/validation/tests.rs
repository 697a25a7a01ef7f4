//! Tests for mapping and rule validation
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::*;
use crate::error::Severity;
use crate::transformer::TransformKind;
use crate::types::{Connection, FieldNode, FieldType, TransformationRule};
use serde_json::{json, Value};

fn leaf(path: &str, field_type: FieldType, required: bool) -> FieldNode {
    let name = path.rsplit('.').next().unwrap_or(path);
    FieldNode::new(name, path, field_type, required)
}

fn person_target() -> Vec<FieldNode> {
    vec![leaf("name", FieldType::String, true), leaf("years", FieldType::Number, true)]
}

fn rule(id: &str, rule_type: &str, config: Value) -> TransformationRule {
    TransformationRule {
        id: id.to_string(),
        rule_type: rule_type.to_string(),
        source_fields: vec!["in".to_string()],
        target_field: "out".to_string(),
        config,
        order: 0,
    }
}

#[test]
fn test_unmapped_required_leaves() {
    let result = validate_mapping(&[], &person_target(), &[]);
    assert!(!result.valid);
    assert_eq!(result.error_count, 2);
    assert_eq!(result.warning_count, 0);
    assert!(result
        .errors
        .iter()
        .all(|e| e.error_type == ValidationErrorType::MissingRequired && e.severity == Severity::Error));
    let targets: Vec<&str> = result.errors.iter().map(|e| e.target_field.as_str()).collect();
    assert_eq!(targets, vec!["name", "years"]);
}

#[test]
fn test_containers_are_not_checked_for_required() {
    let target = vec![FieldNode::new("address", "address", FieldType::Object, true).with_children(vec![
        leaf("address.city", FieldType::String, false),
        leaf("address.zip", FieldType::String, true),
    ])];
    let result = validate_mapping(&[], &target, &[]);
    assert_eq!(result.error_count, 1);
    assert_eq!(result.errors[0].target_field, "address.zip");

    let mapped = validate_mapping(&[], &target, &[Connection::new("zip", "address.zip")]);
    assert!(mapped.valid);
}

#[test]
fn test_object_to_number_needs_a_transformation() {
    let source = vec![FieldNode::new("meta", "meta", FieldType::Object, false)];
    let target = vec![leaf("total", FieldType::Number, false)];

    let direct = validate_mapping(&source, &target, &[Connection::new("meta", "total")]);
    assert_eq!(direct.error_count, 1);
    let error = &direct.errors[0];
    assert_eq!(error.error_type, ValidationErrorType::TypeMismatch);
    assert_eq!(error.source_field.as_deref(), Some("meta"));
    assert_eq!(error.target_field, "total");

    // format_number yields a string, which a number field accepts
    let transformed = validate_mapping(
        &source,
        &target,
        &[Connection::new("meta", "total").with_transformation(TransformKind::FormatNumber, json!({}))],
    );
    assert!(transformed.valid, "{:?}", transformed.errors);
}

#[test]
fn test_transformation_output_is_checked() {
    let source = vec![leaf("tags", FieldType::String, false)];
    let target = vec![leaf("flag", FieldType::Boolean, false)];
    let split = Connection::new("tags", "flag").with_transformation(TransformKind::Split, json!({"delimiter": ","}));
    let result = validate_mapping(&source, &target, &[split]);
    assert_eq!(result.of_type(ValidationErrorType::TypeMismatch).count(), 1);

    let constant_null = Connection::new("tags", "flag")
        .with_transformation(TransformKind::Constant, json!({"value": null}));
    assert!(!validate_mapping(&source, &target, &[constant_null]).valid);

    let conditional = Connection::new("tags", "flag").with_transformation(
        TransformKind::Conditional,
        json!({"operator": "equals", "value": "x", "thenValue": true, "elseValue": false}),
    );
    assert!(validate_mapping(&source, &target, &[conditional]).valid);
}

#[test]
fn test_unknown_endpoints_are_skipped() {
    let source = vec![leaf("a", FieldType::Object, false)];
    let target = vec![leaf("b", FieldType::Number, false)];
    let result = validate_mapping(&source, &target, &[Connection::new("missing", "b")]);
    assert!(result.valid);
}

#[test]
fn test_both_passes_accumulate() {
    let source = vec![leaf("meta", FieldType::Array, false)];
    let target = vec![
        leaf("name", FieldType::String, true),
        leaf("total", FieldType::Number, false),
    ];
    let result = validate_mapping(&source, &target, &[Connection::new("meta", "total")]);
    assert_eq!(result.error_count, 2);
    assert_eq!(result.of_type(ValidationErrorType::MissingRequired).count(), 1);
    assert_eq!(result.of_type(ValidationErrorType::TypeMismatch).count(), 1);
}

#[test]
fn test_result_serializes_in_camel_case() {
    let result = validate_mapping(&[], &person_target(), &[]);
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["errorCount"], 2);
    assert_eq!(value["errors"][0]["type"], "missing_required");
    assert_eq!(value["errors"][0]["targetField"], "name");
    assert_eq!(value["errors"][0]["severity"], "error");
    assert!(value["errors"][0].get("sourceField").is_none());
}

#[test]
fn test_well_formed_rules_pass() {
    let rules = vec![
        rule("r1", "direct", Value::Null),
        rule("r2", "format_date", json!({"to": "yyyy-MM-dd"})),
        rule("r3", "conditional", json!({"operator": "greaterThan", "value": 3, "thenValue": "big", "elseValue": null})),
        rule("r4", "constant", json!({"value": null})),
        rule("r5", "lookup", json!({"tableName": "countries"})),
        rule("r6", "custom", json!({"code": "return value"})),
        rule("r7", "format_number", json!({"currency": "EUR"})),
    ];
    assert_eq!(validate_rules(&rules), Vec::<String>::new());
}

#[test]
fn test_one_message_per_offending_rule() {
    let mut empty_sources = rule("r2", "split", json!({}));
    empty_sources.source_fields.clear();
    let rules = vec![
        rule("r1", "uppercase", json!({})),
        empty_sources,
        rule("r3", "direct", json!({})),
        rule("r4", "conditional", json!({"operator": "matches", "value": 1, "thenValue": 1, "elseValue": 2})),
    ];
    let messages = validate_rules(&rules);
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("Rule r1 (uppercase):"));
    assert!(messages[0].contains("unknown transformation type"));
    assert!(messages[1].contains("sourceFields must not be empty"));
    assert!(messages[1].contains("config.delimiter is required"));
    assert!(messages[2].contains("config.operator must be one of"));
}

#[test]
fn test_config_types_are_checked() {
    let problems = validate_rule(&rule("r", "format_date", json!({"to": 5})));
    assert_eq!(problems.len(), 1);
    assert!(problems[0].contains("format_date"));

    let problems = validate_rule(&rule("r", "split", json!("not an object")));
    assert_eq!(problems, vec!["config must be an object".to_string()]);
}
