//! Builder for creating transformation rules
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::types::{TransformError, TransformKind};
use crate::types::TransformationRule;
use crate::validation::validate_rule;
use serde_json::{Map, Value};

/// Fluent construction of a [`TransformationRule`]
#[derive(Debug, Clone)]
pub struct TransformationRuleBuilder {
    id: String,
    kind: TransformKind,
    source_fields: Vec<String>,
    target_field: Option<String>,
    config: Map<String, Value>,
    order: u32,
}

impl TransformationRuleBuilder {
    pub fn new(id: impl Into<String>, kind: TransformKind) -> Self {
        Self {
            id: id.into(),
            kind,
            source_fields: Vec::new(),
            target_field: None,
            config: Map::new(),
            order: 0,
        }
    }

    /// Append one source field
    pub fn source_field(mut self, field: impl Into<String>) -> Self {
        self.source_fields.push(field.into());
        self
    }

    /// Append several source fields, keeping their order
    pub fn source_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn target_field(mut self, field: impl Into<String>) -> Self {
        self.target_field = Some(field.into());
        self
    }

    /// Set one configuration key
    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    /// Build the rule, rejecting anything the pipeline would refuse to run
    pub fn build(self) -> Result<TransformationRule, TransformError> {
        let target_field = self.target_field.ok_or_else(|| {
            TransformError::invalid_config(format!("rule {} has no target field", self.id))
        })?;

        let rule = TransformationRule {
            id: self.id,
            rule_type: self.kind.as_str().to_string(),
            source_fields: self.source_fields,
            target_field,
            config: Value::Object(self.config),
            order: self.order,
        };

        let problems = validate_rule(&rule);
        if problems.is_empty() {
            Ok(rule)
        } else {
            Err(TransformError::invalid_config(format!(
                "rule {}: {}",
                rule.id,
                problems.join("; ")
            )))
        }
    }
}
