//! Structure inference from a representative XML document
//!
//! The root element becomes the single top-level node. Attributes turn into
//! `@` leaves, repeated sibling elements into one `array` node summarized from
//! the first occurrence, and empty elements into `any` leaves. Text next to
//! attributes or child elements is kept as a `#text` leaf.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::json_sample::is_iso_date;
use super::xml::{read_document, XmlElement};
use super::{FormatParser, ParseError, ParseOptions, ParserValidation, SchemaFormat};
use crate::normalizer::{generate_attribute_path, generate_path};
use crate::types::{FieldNode, FieldType};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Name of the leaf holding an element's own text content
pub const TEXT_NODE_NAME: &str = "#text";

/// Parser for XML sample documents
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlSampleParser;

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^-?\d+$").expect("Valid regex pattern"))
}

fn decimal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^-?(?:\d+\.\d*|\.\d+|\d+)(?:[eE][+-]?\d+)?$").expect("Valid regex pattern")
    })
}

/// Infer a leaf type from markup text
pub fn infer_text_type(text: &str) -> FieldType {
    let text = text.trim();
    if text.is_empty() {
        FieldType::Any
    } else if text == "true" || text == "false" {
        FieldType::Boolean
    } else if integer_pattern().is_match(text) {
        FieldType::Integer
    } else if decimal_pattern().is_match(text) {
        FieldType::Number
    } else if is_iso_date(text) {
        FieldType::Date
    } else {
        FieldType::String
    }
}

impl XmlSampleParser {
    pub fn new() -> Self {
        Self
    }

    fn build_element(
        element: &XmlElement,
        parent_path: &str,
        is_array: bool,
        depth: usize,
        options: &ParseOptions,
    ) -> FieldNode {
        let path = generate_path(parent_path, &element.name, is_array);
        let is_simple = element.attributes.is_empty() && element.children.is_empty();

        if is_simple {
            let field_type = if is_array {
                FieldType::Array
            } else {
                infer_text_type(&element.text)
            };
            return FieldNode::new(&element.name, path, field_type, false);
        }

        let field_type = if is_array {
            FieldType::Array
        } else {
            FieldType::Object
        };
        if depth >= options.max_depth {
            debug!(path = %path, "depth ceiling reached, children dropped");
            return FieldNode::new(&element.name, path, field_type, false);
        }

        let mut children = Vec::new();
        for (name, value) in &element.attributes {
            children.push(FieldNode::new(
                format!("@{}", name),
                generate_attribute_path(&path, name),
                infer_text_type(value),
                false,
            ));
        }

        // Group repeated siblings, keeping first-appearance order
        let mut groups: Vec<(&str, &XmlElement, usize)> = Vec::new();
        for child in &element.children {
            match groups.iter_mut().find(|(name, _, _)| *name == child.name) {
                Some(group) => group.2 += 1,
                None => groups.push((child.name.as_str(), child, 1)),
            }
        }
        for (_, first, count) in groups {
            children.push(Self::build_element(first, &path, count > 1, depth + 1, options));
        }

        if !element.text.is_empty() {
            children.push(FieldNode::new(
                TEXT_NODE_NAME,
                generate_path(&path, TEXT_NODE_NAME, false),
                infer_text_type(&element.text),
                false,
            ));
        }

        FieldNode::new(&element.name, path, field_type, false).with_children(children)
    }
}

impl FormatParser for XmlSampleParser {
    fn format(&self) -> SchemaFormat {
        SchemaFormat::XmlSample
    }

    fn validate(&self, content: &str) -> ParserValidation {
        match read_document(content, super::DEFAULT_MAX_DEPTH + 1) {
            Ok(_) => ParserValidation::ok(),
            Err(e) => ParserValidation::failed(e.to_string()),
        }
    }

    fn parse(&self, content: &str, options: &ParseOptions) -> Result<Vec<FieldNode>, ParseError> {
        let root = read_document(content, options.max_depth.saturating_add(1))?;
        Ok(vec![Self::build_element(&root, "", false, 0, options)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> FieldNode {
        XmlSampleParser::new()
            .parse(content, &ParseOptions::default())
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_attributes_and_repeated_elements() {
        let order = parse(
            r#"<order currency="EUR">
                 <id>42</id>
                 <item><name>Pen</name><price>1.50</price></item>
                 <item><name>Ink</name><price>3</price></item>
               </order>"#,
        );
        assert_eq!(order.path, "order");
        assert_eq!(order.field_type, FieldType::Object);
        let paths: Vec<_> = order.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["order@currency", "order.id", "order.item[]"]);
        assert_eq!(order.children[0].name, "@currency");
        assert_eq!(order.children[1].field_type, FieldType::Integer);

        let item = &order.children[2];
        assert_eq!(item.field_type, FieldType::Array);
        assert_eq!(item.children[0].path, "order.item[].name");
        assert_eq!(item.children[1].field_type, FieldType::Number);
    }

    #[test]
    fn test_text_inference_and_empty_elements() {
        let root = parse("<r><flag>true</flag><when>2024-01-02</when><blank/><s>hi</s></r>");
        let types: Vec<_> = root.children.iter().map(|c| c.field_type).collect();
        assert_eq!(
            types,
            vec![FieldType::Boolean, FieldType::Date, FieldType::Any, FieldType::String]
        );
        assert!(root.children[2].children.is_empty());
        assert!(root.children.iter().all(|c| !c.required));
    }

    #[test]
    fn test_namespace_prefixes_stripped() {
        let root = parse(r#"<p:doc xmlns:p="urn:p"><p:title>x</p:title></p:doc>"#);
        assert_eq!(root.path, "doc");
        assert_eq!(root.children[0].path, "doc.title");
    }

    #[test]
    fn test_mixed_text_becomes_text_leaf() {
        let root = parse(r#"<r><price unit="EUR">12.5</price></r>"#);
        let price = &root.children[0];
        assert_eq!(price.field_type, FieldType::Object);
        assert_eq!(price.children[1].path, "r.price.#text");
        assert_eq!(price.children[1].field_type, FieldType::Number);
    }

    #[test]
    fn test_depth_ceiling() {
        let nodes = XmlSampleParser::new()
            .parse("<a><b><c><d>1</d></c></b></a>", &ParseOptions::with_max_depth(1))
            .unwrap();
        let b = &nodes[0].children[0];
        assert_eq!(b.field_type, FieldType::Object);
        assert!(b.children.is_empty());
    }
}
