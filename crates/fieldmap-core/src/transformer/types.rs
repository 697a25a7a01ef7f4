//! Core types for the transformation system
//!
//! Transform kinds, their typed configurations, the error type shared by all
//! transform functions, and static output-type inference.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use crate::sandbox::SandboxError;
use crate::types::FieldType;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised by a single transform invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// The rule's type names no known transform
    #[error("Unknown transformation type '{kind}'")]
    UnknownKind { kind: String },

    /// Configuration does not match what the kind requires
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Input value has the wrong shape for this kind
    #[error("{kind} expects {expected}, got {actual}")]
    InvalidInput {
        kind: TransformKind,
        expected: &'static str,
        actual: String,
    },

    #[error("Unable to parse date '{value}'")]
    UnparseableDate { value: String },

    #[error("Value '{value}' is not numeric")]
    NotNumeric { value: String },

    /// Pattern splitting only accepts a single bracketed character class
    #[error("Unsafe split pattern '{pattern}': only a bracketed character class such as [,;] is allowed")]
    UnsafePattern { pattern: String },

    #[error("No entry found for '{input}' in lookup table '{table}'")]
    LookupMiss { input: String, table: String },

    #[error("Lookup in table '{table}' timed out after {timeout_ms}ms")]
    LookupTimeout { table: String, timeout_ms: u64 },

    #[error("Lookup failed: {message}")]
    Lookup { message: String },

    #[error("No lookup store configured for table '{table}'")]
    NoLookupStore { table: String },

    #[error("Script failed: {0}")]
    Script(#[from] SandboxError),
}

impl TransformError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_input(kind: TransformKind, expected: &'static str, actual: &Value) -> Self {
        Self::InvalidInput {
            kind,
            expected,
            actual: json_type_name(actual).to_string(),
        }
    }
}

/// JSON-level type name used in messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The nine built-in transform kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Direct,
    FormatDate,
    FormatNumber,
    Split,
    Concatenate,
    Conditional,
    Constant,
    Lookup,
    /// User-supplied script run in the sandbox
    Custom,
}

impl TransformKind {
    pub const ALL: [TransformKind; 9] = [
        TransformKind::Direct,
        TransformKind::FormatDate,
        TransformKind::FormatNumber,
        TransformKind::Split,
        TransformKind::Concatenate,
        TransformKind::Conditional,
        TransformKind::Constant,
        TransformKind::Lookup,
        TransformKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Direct => "direct",
            TransformKind::FormatDate => "format_date",
            TransformKind::FormatNumber => "format_number",
            TransformKind::Split => "split",
            TransformKind::Concatenate => "concatenate",
            TransformKind::Conditional => "conditional",
            TransformKind::Constant => "constant",
            TransformKind::Lookup => "lookup",
            TransformKind::Custom => "custom",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Statically known output type, given the input type and configuration
    pub fn output_type(&self, input: FieldType, config: &Value) -> FieldType {
        match self {
            TransformKind::Direct => input,
            TransformKind::FormatDate
            | TransformKind::FormatNumber
            | TransformKind::Lookup
            | TransformKind::Concatenate => FieldType::String,
            TransformKind::Split => FieldType::Array,
            TransformKind::Conditional | TransformKind::Custom => FieldType::Any,
            TransformKind::Constant => match config.get("value") {
                Some(literal) => literal_type(literal),
                None => FieldType::Null,
            },
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime type of a configured literal; integral numbers are still `number`
fn literal_type(literal: &Value) -> FieldType {
    match literal {
        Value::Null => FieldType::Null,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Number,
        Value::String(_) => FieldType::String,
        Value::Array(_) => FieldType::Array,
        Value::Object(_) => FieldType::Object,
    }
}

/// Deserialize a field that must be present but may be `null`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatDateConfig {
    /// Source pattern; free-form parsing when absent
    #[serde(default)]
    pub from: Option<String>,
    /// Target pattern, or `iso`
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatNumberConfig {
    pub locale: Option<String>,
    pub currency: Option<String>,
    pub minimum_fraction_digits: Option<u32>,
    pub maximum_fraction_digits: Option<u32>,
    pub use_grouping: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitConfig {
    pub delimiter: String,
    #[serde(default)]
    pub use_regex: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConcatenateConfig {
    pub separator: String,
    pub trim: bool,
}

/// Comparison applied by the `conditional` kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
}

impl ConditionOperator {
    pub const NAMES: [&'static str; 7] = [
        "equals",
        "notEquals",
        "contains",
        "startsWith",
        "endsWith",
        "greaterThan",
        "lessThan",
    ];
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalConfig {
    pub operator: ConditionOperator,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub then_value: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub else_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstantConfig {
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupConfig {
    pub table_name: String,
    /// `Some(Value::Null)` when the caller configured an explicit null default
    #[serde(default, deserialize_with = "present")]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomConfig {
    pub code: String,
}

/// Deserialize a kind-specific configuration, mapping failures to `InvalidConfig`
pub fn parse_config<T>(kind: TransformKind, config: &Value) -> Result<T, TransformError>
where
    T: for<'de> Deserialize<'de>,
{
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(config)
        .map_err(|e| TransformError::invalid_config(format!("{}: {}", kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in TransformKind::ALL {
            assert_eq!(TransformKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TransformKind::parse("uppercase"), None);
    }

    #[test]
    fn test_output_types() {
        let cfg = json!({});
        assert_eq!(TransformKind::Direct.output_type(FieldType::Date, &cfg), FieldType::Date);
        assert_eq!(TransformKind::FormatNumber.output_type(FieldType::Object, &cfg), FieldType::String);
        assert_eq!(TransformKind::Split.output_type(FieldType::String, &cfg), FieldType::Array);
        assert_eq!(TransformKind::Custom.output_type(FieldType::String, &cfg), FieldType::Any);
        assert_eq!(
            TransformKind::Constant.output_type(FieldType::Any, &json!({"value": null})),
            FieldType::Null
        );
        assert_eq!(
            TransformKind::Constant.output_type(FieldType::Any, &json!({"value": 3})),
            FieldType::Number
        );
        assert_eq!(
            TransformKind::Constant.output_type(FieldType::Any, &json!({"value": [1]})),
            FieldType::Array
        );
    }

    #[test]
    fn test_present_distinguishes_null_from_missing() {
        let cfg: LookupConfig = parse_config(
            TransformKind::Lookup,
            &json!({"tableName": "t", "defaultValue": null}),
        )
        .unwrap();
        assert_eq!(cfg.default_value, Some(Value::Null));

        let cfg: LookupConfig =
            parse_config(TransformKind::Lookup, &json!({"tableName": "t"})).unwrap();
        assert_eq!(cfg.default_value, None);
    }

    #[test]
    fn test_parse_config_reports_kind() {
        let err = parse_config::<SplitConfig>(TransformKind::Split, &json!({})).unwrap_err();
        assert!(err.to_string().contains("split"));
    }
}
