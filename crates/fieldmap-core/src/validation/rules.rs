//! Structural validation of transformation rules
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use crate::transformer::types::{
    parse_config, ConcatenateConfig, ConditionOperator, ConditionalConfig, ConstantConfig,
    CustomConfig, FormatDateConfig, FormatNumberConfig, LookupConfig, SplitConfig,
};
use crate::transformer::{TransformError, TransformKind};
use crate::types::TransformationRule;
use serde_json::Value;

/// Configuration keys each kind cannot run without
fn required_keys(kind: TransformKind) -> &'static [&'static str] {
    match kind {
        TransformKind::Direct | TransformKind::FormatNumber | TransformKind::Concatenate => &[],
        TransformKind::FormatDate => &["to"],
        TransformKind::Split => &["delimiter"],
        TransformKind::Conditional => &["operator", "value", "thenValue", "elseValue"],
        TransformKind::Constant => &["value"],
        TransformKind::Lookup => &["tableName"],
        TransformKind::Custom => &["code"],
    }
}

/// Problems with one rule, empty when it is well-formed
pub fn validate_rule(rule: &TransformationRule) -> Vec<String> {
    let mut problems = Vec::new();

    if rule.id.trim().is_empty() {
        problems.push("id must not be empty".to_string());
    }
    if rule.source_fields.is_empty() {
        problems.push("sourceFields must not be empty".to_string());
    }
    if rule.target_field.trim().is_empty() {
        problems.push("targetField must not be empty".to_string());
    }

    let Some(kind) = rule.kind() else {
        problems.push(format!("unknown transformation type '{}'", rule.rule_type));
        return problems;
    };

    let config = match &rule.config {
        Value::Null => None,
        Value::Object(map) => Some(map),
        _ => {
            problems.push("config must be an object".to_string());
            return problems;
        }
    };

    let missing: Vec<&str> = required_keys(kind)
        .iter()
        .copied()
        .filter(|key| !config.is_some_and(|map| map.contains_key(*key)))
        .collect();
    for key in &missing {
        problems.push(format!("config.{} is required", key));
    }

    if kind == TransformKind::Conditional {
        if let Some(operator) = config.and_then(|map| map.get("operator")) {
            let known = operator
                .as_str()
                .is_some_and(|name| ConditionOperator::NAMES.contains(&name));
            if !known {
                problems.push(format!(
                    "config.operator must be one of {}",
                    ConditionOperator::NAMES.join(", ")
                ));
                return problems;
            }
        }
    }

    // Key presence is reported above; only look for type errors once all keys exist
    if missing.is_empty() {
        if let Err(TransformError::InvalidConfig { message }) = check_config(kind, &rule.config) {
            problems.push(message);
        }
    }
    problems
}

fn check_config(kind: TransformKind, config: &Value) -> Result<(), TransformError> {
    match kind {
        TransformKind::Direct => Ok(()),
        TransformKind::FormatDate => parse_config::<FormatDateConfig>(kind, config).map(drop),
        TransformKind::FormatNumber => parse_config::<FormatNumberConfig>(kind, config).map(drop),
        TransformKind::Split => parse_config::<SplitConfig>(kind, config).map(drop),
        TransformKind::Concatenate => parse_config::<ConcatenateConfig>(kind, config).map(drop),
        TransformKind::Conditional => parse_config::<ConditionalConfig>(kind, config).map(drop),
        TransformKind::Constant => parse_config::<ConstantConfig>(kind, config).map(drop),
        TransformKind::Lookup => parse_config::<LookupConfig>(kind, config).map(drop),
        TransformKind::Custom => parse_config::<CustomConfig>(kind, config).map(drop),
    }
}

/// One message per offending rule, in input order
pub fn validate_rules(rules: &[TransformationRule]) -> Vec<String> {
    rules
        .iter()
        .filter_map(|rule| {
            let problems = validate_rule(rule);
            if problems.is_empty() {
                None
            } else {
                Some(format!(
                    "Rule {} ({}): {}",
                    rule.id,
                    rule.rule_type,
                    problems.join("; ")
                ))
            }
        })
        .collect()
}
