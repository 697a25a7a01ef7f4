//! Tests for the transformation pipeline
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::*;
use crate::sandbox::SandboxLimits;
use crate::types::TransformationRule;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn rule(id: &str, kind: &str, sources: &[&str], target: &str, config: Value, order: u32) -> TransformationRule {
    TransformationRule {
        id: id.to_string(),
        rule_type: kind.to_string(),
        source_fields: sources.iter().map(|s| s.to_string()).collect(),
        target_field: target.to_string(),
        config,
        order,
    }
}

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

struct SlowStore {
    delay: Duration,
}

#[async_trait]
impl LookupStore for SlowStore {
    async fn lookup(&self, _table: &str, _key: &Value) -> Result<Option<Value>, LookupError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(json!("late")))
    }
}

struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl LookupStore for CountingStore {
    async fn lookup(&self, _table: &str, key: &Value) -> Result<Option<Value>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(key.clone()))
    }
}

struct BrokenStore;

#[async_trait]
impl LookupStore for BrokenStore {
    async fn lookup(&self, _table: &str, _key: &Value) -> Result<Option<Value>, LookupError> {
        Err(LookupError::Unavailable {
            message: "connection refused".to_string(),
        })
    }
}

fn countries() -> Arc<dyn LookupStore> {
    Arc::new(InMemoryLookupStore::new().with_table("countries", [("DE", json!("Germany"))]))
}

#[tokio::test]
async fn test_rules_run_in_order() {
    let rules = vec![
        rule("third", "concatenate", &["a", "b"], "c", json!({"separator": "-"}), 2),
        rule("first", "constant", &["x"], "a", json!({"value": "A"}), 0),
        rule("second", "constant", &["x"], "b", json!({"value": "B"}), 1),
    ];
    let result = apply_transformations(
        &record(json!({})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;

    assert!(result.success, "{:?}", result.errors);
    let executed: Vec<&str> = result.rule_results.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(executed, vec!["first", "second", "third"]);
    assert_eq!(result.result["c"], "A-B");
}

#[tokio::test]
async fn test_equal_order_keeps_input_order() {
    let rules = vec![
        rule("one", "constant", &["x"], "out", json!({"value": 1}), 5),
        rule("two", "constant", &["x"], "out", json!({"value": 2}), 5),
    ];
    let result = TransformationPipeline::new()
        .add_rules(rules)
        .run(&record(json!({})), PipelineOptions::default())
        .await;
    assert_eq!(result.result["out"], 2);
}

#[tokio::test]
async fn test_input_resolution() {
    let rules = vec![
        rule("single", "direct", &["name"], "copy", Value::Null, 0),
        rule("missing", "direct", &["nope"], "absent", Value::Null, 1),
        rule("many", "direct", &["name", "nope", "age"], "all", Value::Null, 2),
    ];
    let result = apply_transformations(
        &record(json!({"name": "Ada", "age": 36})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;
    assert_eq!(result.result["copy"], "Ada");
    assert_eq!(result.result["absent"], Value::Null);
    assert_eq!(result.result["all"], json!(["Ada", null, 36]));
}

#[tokio::test]
async fn test_dry_run_returns_the_input_untouched() {
    let input = record(json!({"price": "12.5"}));
    let rules = vec![
        rule("fmt", "format_number", &["price"], "price", json!({"currency": "USD"}), 0),
        rule("flag", "constant", &["price"], "flag", json!({"value": true}), 1),
    ];
    let result = apply_transformations(
        &input,
        &rules,
        &TransformationContext::default(),
        PipelineOptions::dry_run(),
    )
    .await;

    assert!(result.success);
    assert_eq!(result.result, input);
    assert_eq!(result.rule_results.len(), 2);
    assert_eq!(result.rule_results[0].output, Some(json!("$12.50")));
    assert_eq!(result.rule_results[1].output, Some(json!(true)));
}

#[tokio::test]
async fn test_dry_run_rules_see_the_original_values() {
    let rules = vec![
        rule("set", "constant", &["x"], "x", json!({"value": "changed"}), 0),
        rule("read", "direct", &["x"], "y", Value::Null, 1),
    ];
    let result = apply_transformations(
        &record(json!({"x": "original"})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::dry_run(),
    )
    .await;
    assert_eq!(result.rule_results[1].output, Some(json!("original")));
}

#[tokio::test]
async fn test_failing_rule_does_not_stop_the_run() {
    let rules = vec![
        rule("bad", "format_date", &["when"], "when", json!({"to": "yyyy-MM-dd"}), 0),
        rule("good", "constant", &["x"], "ok", json!({"value": 1}), 1),
    ];
    let input = record(json!({"when": "not a date"}));
    let result = apply_transformations(
        &input,
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("Rule bad (format_date): "));
    assert_eq!(result.result["when"], "not a date");
    assert_eq!(result.result["ok"], 1);

    let failed: Vec<&RuleResult> = result.failed_rules().collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].output.is_none());
    assert!(failed[0].error.as_deref().is_some_and(|e| e.contains("not a date")));
}

#[tokio::test]
async fn test_invalid_rules_abort_before_execution() {
    let store = Arc::new(CountingStore {
        calls: AtomicUsize::new(0),
    });
    let context = TransformationContext::new().with_lookup_store(store.clone());
    let rules = vec![
        rule("lookup", "lookup", &["code"], "country", json!({"tableName": "countries"}), 0),
        rule("broken", "split", &["tags"], "tags", json!({}), 1),
    ];
    let input = record(json!({"code": "DE"}));
    let result = apply_transformations(&input, &rules, &context, PipelineOptions::default()).await;

    assert!(!result.success);
    assert!(result.rule_results.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("config.delimiter is required"));
    assert_eq!(result.result, input);
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lookup_hit_miss_and_default() {
    let context = TransformationContext::new().with_lookup_store(countries());
    let rules = vec![
        rule("hit", "lookup", &["code"], "country", json!({"tableName": "countries"}), 0),
        rule("miss", "lookup", &["other"], "other_country", json!({"tableName": "countries"}), 1),
        rule(
            "fallback",
            "lookup",
            &["other"],
            "fallback",
            json!({"tableName": "countries", "defaultValue": "Unknown"}),
            2,
        ),
        rule(
            "null_default",
            "lookup",
            &["other"],
            "nothing",
            json!({"tableName": "countries", "defaultValue": null}),
            3,
        ),
    ];
    let result = apply_transformations(
        &record(json!({"code": "DE", "other": "FR"})),
        &rules,
        &context,
        PipelineOptions::default(),
    )
    .await;

    assert_eq!(result.result["country"], "Germany");
    assert_eq!(result.result["fallback"], "Unknown");
    assert_eq!(result.result.get("nothing"), Some(&Value::Null));
    assert!(result.result.get("other_country").is_none());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("No entry found for 'FR' in lookup table 'countries'"));
}

#[tokio::test]
async fn test_lookup_timeout() {
    let context = TransformationContext::new()
        .with_lookup_store(Arc::new(SlowStore {
            delay: Duration::from_secs(5),
        }))
        .with_lookup_timeout(Duration::from_millis(50));
    let rules = vec![rule("slow", "lookup", &["code"], "country", json!({"tableName": "countries"}), 0)];
    let result = apply_transformations(
        &record(json!({"code": "DE"})),
        &rules,
        &context,
        PipelineOptions::default(),
    )
    .await;

    assert!(!result.success);
    assert!(result.errors[0].contains("timed out after 50ms"), "{}", result.errors[0]);
}

#[tokio::test]
async fn test_lookup_store_failures() {
    let rules = vec![rule("l", "lookup", &["code"], "country", json!({"tableName": "countries"}), 0)];
    let input = record(json!({"code": "DE"}));

    let without_store = apply_transformations(
        &input,
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;
    assert!(without_store.errors[0].contains("No lookup store configured"));

    let broken = TransformationContext::new().with_lookup_store(Arc::new(BrokenStore));
    let result = apply_transformations(&input, &rules, &broken, PipelineOptions::default()).await;
    assert!(result.errors[0].contains("connection refused"));
}

#[tokio::test]
async fn test_outputs_feed_later_rules() {
    let rules = vec![
        rule("split", "split", &["csv"], "parts", json!({"delimiter": ","}), 0),
        rule(
            "has_b",
            "conditional",
            &["parts"],
            "has_b",
            json!({"operator": "contains", "value": "b", "thenValue": "yes", "elseValue": "no"}),
            1,
        ),
        rule("join", "concatenate", &["parts"], "joined", json!({"separator": " | "}), 2),
    ];
    let result = apply_transformations(
        &record(json!({"csv": "a,b,c"})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.result["parts"], json!(["a", "b", "c"]));
    assert_eq!(result.result["has_b"], "yes");
    assert_eq!(result.result["joined"], "a | b | c");
}

#[tokio::test]
async fn test_custom_script_rules() {
    let rules = vec![
        rule(
            "total",
            "custom",
            &["price", "quantity"],
            "total",
            json!({"code": "return value[0] * value[1]"}),
            0,
        ),
        rule("boom", "custom", &["price"], "boom", json!({"code": "return missing.field"}), 1),
        rule("err", "custom", &["price"], "err", json!({"code": "throw Error('negative')"}), 2),
    ];
    let result = apply_transformations(
        &record(json!({"price": 2.5, "quantity": 4})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;

    assert_eq!(result.result["total"], json!(10));
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors[0].starts_with("Rule boom (custom): Script failed: ReferenceError"));
    assert!(result.errors[1].contains("negative"));
}

#[tokio::test]
async fn test_script_timeout_is_a_rule_failure() {
    let context = TransformationContext::new().with_sandbox_limits(SandboxLimits {
        timeout: Duration::from_millis(100),
        ..SandboxLimits::default()
    });
    let rules = vec![
        rule("spin", "custom", &["x"], "y", json!({"code": "while (true) {}"}), 0),
        rule("after", "constant", &["x"], "z", json!({"value": "ran"}), 1),
    ];
    let result = TransformationPipeline::new()
        .with_context(context)
        .add_rules(rules)
        .run(&record(json!({"x": 1})), PipelineOptions::default())
        .await;

    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].contains("timed out"), "{}", result.errors[0]);
    assert_eq!(result.result["z"], "ran");
}

#[tokio::test]
async fn test_result_serializes_in_camel_case() {
    let rules = vec![rule("c", "constant", &["x"], "y", json!({"value": 1}), 0)];
    let result = apply_transformations(
        &record(json!({})),
        &rules,
        &TransformationContext::default(),
        PipelineOptions::default(),
    )
    .await;
    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["ruleResults"][0]["ruleId"], "c");
    assert_eq!(value["ruleResults"][0]["ruleType"], "constant");
    assert!(value["ruleResults"][0]["durationMs"].is_u64());
    assert!(value["ruleResults"][0].get("error").is_none());
}

#[test]
fn test_builder_validates() {
    let rule = TransformationRuleBuilder::new("d", TransformKind::FormatDate)
        .source_field("born")
        .target_field("born")
        .config("to", "dd/MM/yyyy")
        .order(3)
        .build()
        .unwrap();
    assert_eq!(rule.rule_type, "format_date");
    assert_eq!(rule.order, 3);
    assert_eq!(rule.config, json!({"to": "dd/MM/yyyy"}));

    let missing_config = TransformationRuleBuilder::new("s", TransformKind::Split)
        .source_field("tags")
        .target_field("tags")
        .build();
    assert!(matches!(missing_config, Err(TransformError::InvalidConfig { .. })));

    let no_target = TransformationRuleBuilder::new("c", TransformKind::Direct)
        .source_field("a")
        .build();
    assert!(no_target.is_err());
}
