//! Structure inference from a representative JSON document
//!
//! Samples carry no cardinality information, so every node is optional.
//! Arrays are summarized from their first element only.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::{
    json, FormatParser, ParseError, ParseOptions, ParserValidation, SchemaFormat, DEFAULT_MAX_DEPTH,
};
use crate::normalizer::generate_path;
use crate::types::{FieldNode, FieldType};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::debug;

/// ISO-8601 calendar date, optionally followed by a time and offset
fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$",
        )
        .expect("Valid regex pattern")
    })
}

/// Whether a string looks like an ISO-8601 date or date-time
pub fn is_iso_date(text: &str) -> bool {
    iso_date_pattern().is_match(text)
}

/// Type of a runtime JSON value as seen in a sample
pub fn infer_value_type(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Null,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                FieldType::Integer
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => FieldType::Integer,
                    _ => FieldType::Number,
                }
            }
        }
        Value::String(s) if is_iso_date(s) => FieldType::Date,
        Value::String(_) => FieldType::String,
        Value::Array(_) => FieldType::Array,
        Value::Object(_) => FieldType::Object,
    }
}

/// Parser for JSON sample documents
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSampleParser;

impl JsonSampleParser {
    pub fn new() -> Self {
        Self
    }

    fn root_fields(document: &Value) -> Result<&Map<String, Value>, String> {
        match document {
            Value::Object(fields) => Ok(fields),
            Value::Array(items) => match items.first() {
                Some(Value::Object(fields)) => Ok(fields),
                None => Ok(empty_map()),
                Some(_) => Err("Sample array must contain objects".to_string()),
            },
            _ => Err("Sample root must be a JSON object or an array of objects".to_string()),
        }
    }

    fn build_fields(
        fields: &Map<String, Value>,
        parent_path: &str,
        depth: usize,
        options: &ParseOptions,
    ) -> Vec<FieldNode> {
        fields
            .iter()
            .map(|(name, value)| Self::build_node(name, value, parent_path, depth, options))
            .collect()
    }

    fn build_node(
        name: &str,
        value: &Value,
        parent_path: &str,
        depth: usize,
        options: &ParseOptions,
    ) -> FieldNode {
        let field_type = infer_value_type(value);
        let is_array = field_type == FieldType::Array;
        let path = generate_path(parent_path, name, is_array);
        let truncated = depth >= options.max_depth;
        if truncated && field_type.is_container() {
            debug!(path = %path, "depth ceiling reached, children dropped");
        }

        let children = match value {
            Value::Object(fields) if !truncated => {
                Self::build_fields(fields, &path, depth + 1, options)
            }
            Value::Array(items) if !truncated => match items.first() {
                Some(Value::Object(fields)) => Self::build_fields(fields, &path, depth + 1, options),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        FieldNode::new(name, path, field_type, false).with_children(children)
    }
}

fn empty_map() -> &'static Map<String, Value> {
    static EMPTY: OnceLock<Map<String, Value>> = OnceLock::new();
    EMPTY.get_or_init(Map::new)
}

impl FormatParser for JsonSampleParser {
    fn format(&self) -> SchemaFormat {
        SchemaFormat::JsonSample
    }

    fn validate(&self, content: &str) -> ParserValidation {
        let levels = json::document_levels(DEFAULT_MAX_DEPTH);
        match json::read_document(content, levels) {
            Ok(document) => match Self::root_fields(&document) {
                Ok(_) => ParserValidation::ok(),
                Err(message) => ParserValidation::failed(message),
            },
            Err(e) => ParserValidation::failed(format!("Invalid JSON: {}", e)),
        }
    }

    fn parse(&self, content: &str, options: &ParseOptions) -> Result<Vec<FieldNode>, ParseError> {
        let levels = json::document_levels(options.max_depth);
        let document =
            json::read_document(content, levels).map_err(|e| ParseError::InvalidJson {
                message: e.to_string(),
            })?;
        let fields = Self::root_fields(&document)
            .map_err(|message| ParseError::structure(SchemaFormat::JsonSample, message))?;
        Ok(Self::build_fields(fields, "", 0, options))
    }
}
