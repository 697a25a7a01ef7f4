//! End-to-end pipeline behavior through the public API
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use fieldmap_core::sandbox::SandboxError;
use fieldmap_core::{
    apply_transformations, EngineConfig, InMemoryLookupStore, PipelineOptions, Record,
    ScriptSandbox, SandboxLimits, TransformKind, TransformationContext, TransformationPipeline,
    TransformationRule, TransformationRuleBuilder,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn record(value: Value) -> Record {
    value.as_object().cloned().unwrap_or_default()
}

fn rules_from_json(value: Value) -> Vec<TransformationRule> {
    serde_json::from_value(value).expect("rules deserialize")
}

#[tokio::test]
async fn test_constant_rules_follow_order() {
    let rules = rules_from_json(json!([
        {"id": "c2", "type": "constant", "sourceFields": ["x"], "targetField": "two", "config": {"value": 2}, "order": 2},
        {"id": "c0", "type": "constant", "sourceFields": ["x"], "targetField": "zero", "config": {"value": 0}, "order": 0},
        {"id": "c1", "type": "constant", "sourceFields": ["x"], "targetField": "one", "config": {"value": 1}, "order": 1}
    ]));
    let result = apply_transformations(
        &record(json!({"x": null})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;

    let ids: Vec<&str> = result.rule_results.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["c0", "c1", "c2"]);
    assert_eq!(result.result["zero"], 0);
    assert_eq!(result.result["two"], 2);
}

#[tokio::test]
async fn test_dry_run_purity() {
    let data = record(json!({"first": "Ada", "last": "Lovelace", "born": "1815-12-10"}));
    let rules = vec![
        TransformationRuleBuilder::new("name", TransformKind::Concatenate)
            .source_fields(["first", "last"])
            .target_field("first")
            .config("separator", " ")
            .build()
            .unwrap(),
        TransformationRuleBuilder::new("born", TransformKind::FormatDate)
            .source_field("born")
            .target_field("born")
            .config("to", "dd/MM/yyyy")
            .order(1)
            .build()
            .unwrap(),
    ];
    let result = apply_transformations(
        &data,
        &rules,
        &TransformationContext::default(),
        PipelineOptions { dry_run: true },
    )
    .await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.result, data);
    assert_eq!(result.rule_results[0].output, Some(json!("Ada Lovelace")));
    assert_eq!(result.rule_results[1].output, Some(json!("10/12/1815")));
}

#[tokio::test]
async fn test_partial_failure_isolation() {
    let rules = rules_from_json(json!([
        {"id": "r1", "type": "direct", "sourceFields": ["a"], "targetField": "a_copy", "config": {}, "order": 0},
        {"id": "r2", "type": "format_date", "sourceFields": ["when"], "targetField": "when", "config": {"to": "iso"}, "order": 1},
        {"id": "r3", "type": "split", "sourceFields": ["tags"], "targetField": "tags", "config": {"delimiter": ";"}, "order": 2}
    ]));
    let result = apply_transformations(
        &record(json!({"a": 1, "when": "someday", "tags": "x;y"})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("r2"));
    let outcomes: Vec<bool> = result.rule_results.iter().map(|r| r.success).collect();
    assert_eq!(outcomes, vec![true, false, true]);
    assert_eq!(result.result["a_copy"], 1);
    assert_eq!(result.result["tags"], json!(["x", "y"]));
    assert_eq!(result.result["when"], "someday");
}

#[tokio::test]
async fn test_lookup_through_context() {
    let store = InMemoryLookupStore::from_json(&json!({
        "status": {"A": "active", "I": "inactive"}
    }))
    .unwrap();
    let context = TransformationContext::from_config(&EngineConfig::default())
        .with_lookup_store(Arc::new(store));
    let pipeline = TransformationPipeline::new().with_context(context).add_rule(
        TransformationRuleBuilder::new("status", TransformKind::Lookup)
            .source_field("code")
            .target_field("status")
            .config("tableName", "status")
            .build()
            .unwrap(),
    );

    let hit = pipeline.run(&record(json!({"code": "A"})), PipelineOptions::default()).await;
    assert_eq!(hit.result["status"], "active");

    let miss = pipeline.run(&record(json!({"code": "Z"})), PipelineOptions::default()).await;
    assert!(!miss.success);
    assert!(miss.errors[0].contains("'Z'"));
    assert!(miss.errors[0].contains("'status'"));
}

#[tokio::test]
async fn test_script_cannot_mutate_its_input() {
    let input = json!({"items": [1, 2, 3], "name": "x"});
    let sandbox = ScriptSandbox::default();
    let output = sandbox
        .execute("value.items.push(4); value.name = 'changed'; return value", &input)
        .await
        .unwrap();
    assert_eq!(output, json!({"items": [1, 2, 3, 4], "name": "changed"}));
    assert_eq!(input, json!({"items": [1, 2, 3], "name": "x"}));
}

#[tokio::test]
async fn test_runaway_script_is_stopped_within_the_bound() {
    let sandbox = ScriptSandbox::new(SandboxLimits {
        timeout: Duration::from_millis(200),
        ..SandboxLimits::default()
    });
    let started = Instant::now();
    let error = sandbox.execute("let i = 0; while (true) { i++ }", &json!(null)).await.unwrap_err();
    assert!(matches!(error, SandboxError::Timeout { .. }));
    assert_eq!(error.kind(), "timeout");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_host_capabilities_are_absent() {
    let sandbox = ScriptSandbox::default();
    for name in ["process", "require", "globalThis", "fetch", "setTimeout"] {
        let output = sandbox
            .execute(&format!("return typeof {}", name), &json!(null))
            .await
            .unwrap();
        assert_eq!(output, json!("undefined"), "{}", name);
    }
}
