//! JSON-Schema-like schema descriptions
//!
//! Walks `properties` recursively, taking required-ness from the `required`
//! array at each level. Internal `$ref` pointers (`#/definitions/x`,
//! `#/$defs/x` or dot paths such as `#definitions.x`) are resolved against the
//! document root while descending. A pointer that is already being expanded
//! higher up the current branch is replaced by an empty object stub, so
//! self-referential schemas terminate.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::{
    json, FormatParser, ParseError, ParseOptions, ParserValidation, SchemaFormat, DEFAULT_MAX_DEPTH,
};
use crate::normalizer::{generate_path, normalize_type};
use crate::types::{FieldNode, FieldType};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Parser for JSON Schema documents
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSchemaParser;

/// Outcome of following a `$ref` chain
enum Resolved<'a> {
    Schema(&'a Value),
    /// Pointer already on the resolution stack
    Cycle,
    /// Pointer names nothing in the document
    Dangling,
}

/// Per-parse state: the document root and the refs being expanded
struct Walk<'a> {
    root: &'a Value,
    resolution_stack: Vec<String>,
    options: ParseOptions,
}

impl<'a> Walk<'a> {
    /// Follow `$ref` links from `schema`, pushing every pointer visited
    ///
    /// Returns the resolved schema and how many pointers were pushed; the
    /// caller pops them once the subtree is built.
    fn resolve(&mut self, mut schema: &'a Value) -> (Resolved<'a>, usize) {
        let mut pushed = 0;
        while let Some(pointer) = schema.get("$ref").and_then(Value::as_str) {
            if self.resolution_stack.iter().any(|p| p == pointer) {
                warn!(pointer, "circular $ref replaced by an empty object");
                return (Resolved::Cycle, pushed);
            }
            self.resolution_stack.push(pointer.to_string());
            pushed += 1;
            match lookup_pointer(self.root, pointer) {
                Some(target) => schema = target,
                None => {
                    warn!(pointer, "unresolvable $ref");
                    return (Resolved::Dangling, pushed);
                }
            }
        }
        (Resolved::Schema(schema), pushed)
    }

    fn release(&mut self, pushed: usize) {
        let keep = self.resolution_stack.len().saturating_sub(pushed);
        self.resolution_stack.truncate(keep);
    }

    fn properties(&mut self, schema: &'a Value, parent_path: &str, depth: usize) -> Vec<FieldNode> {
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Vec::new();
        };
        let required = required_names(schema);
        properties
            .iter()
            .map(|(name, property)| {
                let is_required = required.iter().any(|r| r == name);
                self.property(name, property, is_required, parent_path, depth)
            })
            .collect()
    }

    fn property(
        &mut self,
        name: &str,
        schema: &'a Value,
        required: bool,
        parent_path: &str,
        depth: usize,
    ) -> FieldNode {
        let (resolved, pushed) = self.resolve(schema);
        let stub_type = match resolved {
            Resolved::Schema(schema) => {
                let node = self.schema_node(name, schema, required, parent_path, depth);
                self.release(pushed);
                return node;
            }
            Resolved::Cycle => FieldType::Object,
            Resolved::Dangling => FieldType::Any,
        };
        let node = FieldNode::new(name, generate_path(parent_path, name, false), stub_type, required);
        self.release(pushed);
        node
    }

    fn schema_node(
        &mut self,
        name: &str,
        schema: &'a Value,
        required: bool,
        parent_path: &str,
        depth: usize,
    ) -> FieldNode {
        let field_type = schema_type(schema);
        let is_array = field_type == FieldType::Array;
        let path = generate_path(parent_path, name, is_array);

        if depth >= self.options.max_depth {
            if field_type.is_container() {
                debug!(path = %path, "depth ceiling reached, children dropped");
            }
            return FieldNode::new(name, path, field_type, required);
        }

        let children = match field_type {
            FieldType::Object => self.properties(schema, &path, depth + 1),
            FieldType::Array => match schema.get("items") {
                Some(items) => self.array_items(items, &path, depth + 1),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        FieldNode::new(name, path, field_type, required).with_children(children)
    }

    fn array_items(&mut self, items: &'a Value, array_path: &str, depth: usize) -> Vec<FieldNode> {
        let (resolved, pushed) = self.resolve(items);
        let children = match resolved {
            Resolved::Schema(items) => self.properties(items, array_path, depth),
            Resolved::Cycle | Resolved::Dangling => Vec::new(),
        };
        self.release(pushed);
        children
    }
}

/// Canonical type of a (resolved) property schema
fn schema_type(schema: &Value) -> FieldType {
    match schema.get("type") {
        Some(raw) => {
            let normalized = normalize_type(Some(raw));
            let format = schema.get("format").and_then(Value::as_str);
            match (normalized, format) {
                (FieldType::String, Some("date" | "date-time")) => FieldType::Date,
                (normalized, _) => normalized,
            }
        }
        None if schema.get("properties").is_some() => FieldType::Object,
        None if schema.get("items").is_some() => FieldType::Array,
        None => FieldType::Any,
    }
}

fn required_names(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Locate a document-internal pointer
///
/// Accepts JSON Pointer fragments (`#/definitions/Address`, with `~0`/`~1`
/// escapes) and dot paths (`#definitions.Address` or `definitions.Address`).
/// `#` alone names the root.
fn lookup_pointer<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let fragment = pointer.strip_prefix('#').unwrap_or(pointer);
    if fragment.is_empty() {
        return Some(root);
    }
    if fragment.starts_with('/') {
        return root.pointer(fragment);
    }
    if pointer.contains("://") || fragment.ends_with(".json") {
        // External documents are not fetched
        return None;
    }
    fragment
        .split('.')
        .try_fold(root, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

impl JsonSchemaParser {
    pub fn new() -> Self {
        Self
    }

    fn check_document(document: &Value) -> Vec<String> {
        let Value::Object(root) = document else {
            return vec!["Schema root must be a JSON object".to_string()];
        };
        let mut errors = Vec::new();
        check_keyword_shapes(root, "", &mut errors);
        errors
    }
}

/// Shallow shape checks on the keywords the walker relies on
fn check_keyword_shapes(schema: &Map<String, Value>, at: &str, errors: &mut Vec<String>) {
    let location = if at.is_empty() { "root" } else { at };
    if let Some(properties) = schema.get("properties") {
        if !properties.is_object() {
            errors.push(format!("'properties' at {} must be an object", location));
        }
    }
    if let Some(required) = schema.get("required") {
        let well_formed = required
            .as_array()
            .map(|names| names.iter().all(Value::is_string))
            .unwrap_or(false);
        if !well_formed {
            errors.push(format!("'required' at {} must be an array of strings", location));
        }
    }
    if let Some(reference) = schema.get("$ref") {
        if !reference.is_string() {
            errors.push(format!("'$ref' at {} must be a string", location));
        }
    }
}

impl FormatParser for JsonSchemaParser {
    fn format(&self) -> SchemaFormat {
        SchemaFormat::JsonSchema
    }

    fn validate(&self, content: &str) -> ParserValidation {
        let levels = json::document_levels(DEFAULT_MAX_DEPTH);
        match json::read_document(content, levels) {
            Ok(document) => ParserValidation::from_errors(Self::check_document(&document)),
            Err(e) => ParserValidation::failed(format!("Invalid JSON: {}", e)),
        }
    }

    fn parse(&self, content: &str, options: &ParseOptions) -> Result<Vec<FieldNode>, ParseError> {
        let levels = json::document_levels(options.max_depth);
        let document =
            json::read_document(content, levels).map_err(|e| ParseError::InvalidJson {
                message: e.to_string(),
            })?;
        if let Some(problem) = Self::check_document(&document).into_iter().next() {
            return Err(ParseError::structure(SchemaFormat::JsonSchema, problem));
        }

        let mut walk = Walk {
            root: &document,
            resolution_stack: Vec::new(),
            options: *options,
        };
        let (resolved, pushed) = walk.resolve(&document);
        let nodes = match resolved {
            Resolved::Schema(schema) if schema.get("properties").is_some() => {
                walk.properties(schema, "", 0)
            }
            // A top-level array schema exposes its item properties
            Resolved::Schema(schema) => match schema.get("items") {
                Some(items) => walk.array_items(items, "", 0),
                None => Vec::new(),
            },
            Resolved::Cycle | Resolved::Dangling => Vec::new(),
        };
        walk.release(pushed);
        Ok(nodes)
    }
}
