//! XML Schema (XSD) documents
//!
//! Top-level `complexType`, `simpleType`, `element`, `group` and
//! `attributeGroup` declarations are collected into name tables before the
//! descent starts, so references resolve regardless of declaration order.
//! Every top-level element becomes one root node.
//!
//! Required-ness follows `minOccurs` (default 1) inside `sequence` and `all`.
//! Everything under a `choice`, or under any compositor with `minOccurs="0"`,
//! is optional. `maxOccurs` of `unbounded` or greater than one marks an array.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::xml::{local_part, read_document, XmlElement};
use super::xml_sample::TEXT_NODE_NAME;
use super::{FormatParser, ParseError, ParseOptions, ParserValidation, SchemaFormat};
use crate::normalizer::{generate_attribute_path, generate_path, normalize_token};
use crate::types::{FieldNode, FieldType};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Markup levels one field level may span (element/complexType/compositor/...)
const LEVELS_PER_FIELD: usize = 6;

/// Hops allowed through named simple types before giving up
const MAX_SIMPLE_TYPE_HOPS: usize = 16;

/// Parser for XML Schema documents
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlSchemaParser;

/// Top-level declarations by local name
#[derive(Default)]
struct TypeTable<'a> {
    complex_types: HashMap<&'a str, &'a XmlElement>,
    simple_types: HashMap<&'a str, &'a XmlElement>,
    elements: HashMap<&'a str, &'a XmlElement>,
    groups: HashMap<&'a str, &'a XmlElement>,
    attribute_groups: HashMap<&'a str, &'a XmlElement>,
}

impl<'a> TypeTable<'a> {
    fn build(schema: &'a XmlElement) -> Self {
        let mut table = TypeTable::default();
        for decl in &schema.children {
            let Some(name) = decl.attribute("name") else {
                continue;
            };
            let slot = match decl.name.as_str() {
                "complexType" => &mut table.complex_types,
                "simpleType" => &mut table.simple_types,
                "element" => &mut table.elements,
                "group" => &mut table.groups,
                "attributeGroup" => &mut table.attribute_groups,
                _ => continue,
            };
            slot.insert(name, decl);
        }
        table
    }
}

/// How an element's content is declared
enum Content<'a> {
    Complex(&'a XmlElement, Option<&'a str>),
    Simple(FieldType),
}

struct Walk<'a> {
    table: TypeTable<'a>,
    /// Named complex types currently being expanded
    type_stack: Vec<&'a str>,
    options: ParseOptions,
}

impl<'a> Walk<'a> {
    fn simple_type(&self, type_name: &str) -> FieldType {
        let mut current = type_name;
        for _ in 0..MAX_SIMPLE_TYPE_HOPS {
            let Some(decl) = self.table.simple_types.get(local_part(current)) else {
                return normalize_token(current);
            };
            match simple_base(decl) {
                SimpleBase::Named(base) => current = base,
                SimpleBase::Textual => return FieldType::String,
                SimpleBase::Unknown => return FieldType::Any,
            }
        }
        warn!(type_name, "simple type chain too long");
        FieldType::Any
    }

    fn inline_simple_type(&self, decl: &XmlElement) -> FieldType {
        match simple_base(decl) {
            SimpleBase::Named(base) => self.simple_type(base),
            SimpleBase::Textual => FieldType::String,
            SimpleBase::Unknown => FieldType::Any,
        }
    }

    fn element_content(&self, element: &'a XmlElement) -> Content<'a> {
        if let Some(type_name) = element.attribute("type") {
            let local = local_part(type_name);
            if let Some((&name, &complex)) = self.table.complex_types.get_key_value(local) {
                return Content::Complex(complex, Some(name));
            }
            return Content::Simple(self.simple_type(type_name));
        }
        if let Some(complex) = element.first_child("complexType") {
            return Content::Complex(complex, None);
        }
        if let Some(simple) = element.first_child("simpleType") {
            return Content::Simple(self.inline_simple_type(simple));
        }
        Content::Simple(FieldType::Any)
    }

    fn element(
        &mut self,
        decl: &'a XmlElement,
        parent_path: &str,
        force_optional: bool,
        depth: usize,
    ) -> Option<FieldNode> {
        // Occurrence constraints live on the referencing declaration
        let occurs = decl;
        let decl = match decl.attribute("ref") {
            Some(reference) => match self.table.elements.get(local_part(reference)) {
                Some(&target) => target,
                None => {
                    warn!(reference, "element ref names no top-level element");
                    let name = local_part(reference);
                    let path = generate_path(parent_path, name, false);
                    return Some(FieldNode::new(name, path, FieldType::Any, false));
                }
            },
            None => decl,
        };
        let Some(name) = decl.attribute("name") else {
            debug!("element without name or ref skipped");
            return None;
        };

        let min_occurs = occurs
            .attribute("minOccurs")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(1);
        let is_array = match occurs.attribute("maxOccurs").map(str::trim) {
            Some("unbounded") => true,
            Some(max) => max.parse::<u64>().map(|m| m > 1).unwrap_or(false),
            None => false,
        };
        let required = !force_optional && min_occurs >= 1;
        let path = generate_path(parent_path, name, is_array);

        let node = match self.element_content(decl) {
            Content::Simple(field_type) => {
                let field_type = if is_array { FieldType::Array } else { field_type };
                FieldNode::new(name, path, field_type, required)
            }
            Content::Complex(complex, type_name) => {
                let field_type = if is_array { FieldType::Array } else { FieldType::Object };
                let children = if depth >= self.options.max_depth {
                    debug!(path = %path, "depth ceiling reached, children dropped");
                    Vec::new()
                } else {
                    self.named_complex(complex, type_name, &path, depth + 1)
                };
                FieldNode::new(name, path, field_type, required).with_children(children)
            }
        };
        Some(node)
    }

    /// Expand a complex type, guarding against recursive named types
    fn named_complex(
        &mut self,
        complex: &'a XmlElement,
        type_name: Option<&'a str>,
        path: &str,
        depth: usize,
    ) -> Vec<FieldNode> {
        let Some(type_name) = type_name else {
            return self.complex_body(complex, path, depth);
        };
        if self.type_stack.contains(&type_name) {
            warn!(type_name, path, "recursive complex type not expanded");
            return Vec::new();
        }
        self.type_stack.push(type_name);
        let children = self.complex_body(complex, path, depth);
        self.type_stack.pop();
        children
    }

    fn complex_body(&mut self, body: &'a XmlElement, path: &str, depth: usize) -> Vec<FieldNode> {
        let mut children = Vec::new();
        for part in &body.children {
            match part.name.as_str() {
                "sequence" | "all" => {
                    let optional = compositor_optional(part);
                    self.compositor(part, path, optional, depth, &mut children);
                }
                "choice" => self.compositor(part, path, true, depth, &mut children),
                "group" => self.group(part, path, false, depth, &mut children),
                "attribute" => children.extend(self.attribute(part, path)),
                "attributeGroup" => self.attribute_group(part, path, &mut children),
                "complexContent" => self.complex_content(part, path, depth, &mut children),
                "simpleContent" => self.simple_content(part, path, &mut children),
                _ => {}
            }
        }
        dedupe_paths(children)
    }

    fn compositor(
        &mut self,
        compositor: &'a XmlElement,
        path: &str,
        force_optional: bool,
        depth: usize,
        out: &mut Vec<FieldNode>,
    ) {
        for item in &compositor.children {
            match item.name.as_str() {
                "element" => out.extend(self.element(item, path, force_optional, depth)),
                "sequence" | "all" => {
                    let optional = force_optional || compositor_optional(item);
                    self.compositor(item, path, optional, depth, out);
                }
                "choice" => self.compositor(item, path, true, depth, out),
                "group" => self.group(item, path, force_optional, depth, out),
                _ => {}
            }
        }
    }

    fn group(
        &mut self,
        reference: &'a XmlElement,
        path: &str,
        force_optional: bool,
        depth: usize,
        out: &mut Vec<FieldNode>,
    ) {
        let Some(name) = reference.attribute("ref").map(local_part) else {
            return;
        };
        let Some(&group) = self.table.groups.get(name) else {
            warn!(group = name, "group ref names no top-level group");
            return;
        };
        if self.type_stack.contains(&name) {
            warn!(group = name, "recursive group not expanded");
            return;
        }
        let optional = force_optional || compositor_optional(reference);
        self.type_stack.push(name);
        for part in &group.children {
            match part.name.as_str() {
                "sequence" | "all" => self.compositor(part, path, optional, depth, out),
                "choice" => self.compositor(part, path, true, depth, out),
                _ => {}
            }
        }
        self.type_stack.pop();
    }

    fn attribute(&self, decl: &XmlElement, path: &str) -> Option<FieldNode> {
        let name = decl
            .attribute("name")
            .or_else(|| decl.attribute("ref").map(local_part))?;
        let field_type = match decl.attribute("type") {
            Some(type_name) => self.simple_type(type_name),
            None => match decl.first_child("simpleType") {
                Some(simple) => self.inline_simple_type(simple),
                None => FieldType::String,
            },
        };
        let required = decl.attribute("use") == Some("required");
        Some(FieldNode::new(
            format!("@{}", name),
            generate_attribute_path(path, name),
            field_type,
            required,
        ))
    }

    fn attribute_group(&self, reference: &XmlElement, path: &str, out: &mut Vec<FieldNode>) {
        let Some(name) = reference.attribute("ref").map(local_part) else {
            return;
        };
        match self.table.attribute_groups.get(name) {
            Some(group) => {
                for decl in group.children_named("attribute") {
                    out.extend(self.attribute(decl, path));
                }
            }
            None => warn!(group = name, "attributeGroup ref names nothing"),
        }
    }

    fn complex_content(
        &mut self,
        content: &'a XmlElement,
        path: &str,
        depth: usize,
        out: &mut Vec<FieldNode>,
    ) {
        if let Some(extension) = content.first_child("extension") {
            if let Some(base) = extension.attribute("base").map(local_part) {
                match self.table.complex_types.get_key_value(base) {
                    Some((&name, &base_type)) => {
                        out.extend(self.named_complex(base_type, Some(name), path, depth));
                    }
                    None => debug!(base, "extension base is not a named complex type"),
                }
            }
            out.extend(self.complex_body(extension, path, depth));
        } else if let Some(restriction) = content.first_child("restriction") {
            out.extend(self.complex_body(restriction, path, depth));
        }
    }

    fn simple_content(&self, content: &XmlElement, path: &str, out: &mut Vec<FieldNode>) {
        let Some(derivation) = content
            .first_child("extension")
            .or_else(|| content.first_child("restriction"))
        else {
            return;
        };
        for decl in derivation.children_named("attribute") {
            out.extend(self.attribute(decl, path));
        }
        for group in derivation.children_named("attributeGroup") {
            self.attribute_group(group, path, out);
        }
        let text_type = derivation
            .attribute("base")
            .map(|base| self.simple_type(base))
            .unwrap_or(FieldType::String);
        out.push(FieldNode::new(
            TEXT_NODE_NAME,
            generate_path(path, TEXT_NODE_NAME, false),
            text_type,
            false,
        ));
    }
}

enum SimpleBase<'a> {
    Named(&'a str),
    /// `list` and `union` values are whitespace-separated text
    Textual,
    Unknown,
}

fn simple_base(decl: &XmlElement) -> SimpleBase<'_> {
    if let Some(restriction) = decl.first_child("restriction") {
        return match restriction.attribute("base") {
            Some(base) => SimpleBase::Named(base),
            None => match restriction.first_child("simpleType") {
                Some(inner) => simple_base(inner),
                None => SimpleBase::Unknown,
            },
        };
    }
    if decl.first_child("list").is_some() || decl.first_child("union").is_some() {
        return SimpleBase::Textual;
    }
    SimpleBase::Unknown
}

fn compositor_optional(compositor: &XmlElement) -> bool {
    compositor.attribute("minOccurs").map(str::trim) == Some("0")
}

/// Drop later siblings that repeat an earlier path
fn dedupe_paths(nodes: Vec<FieldNode>) -> Vec<FieldNode> {
    let mut seen: Vec<String> = Vec::with_capacity(nodes.len());
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        if seen.contains(&node.path) {
            debug!(path = %node.path, "duplicate declaration ignored");
            continue;
        }
        seen.push(node.path.clone());
        out.push(node);
    }
    out
}

impl XmlSchemaParser {
    pub fn new() -> Self {
        Self
    }

    fn read(content: &str, max_depth: usize) -> Result<XmlElement, ParseError> {
        let limit = max_depth
            .saturating_add(2)
            .saturating_mul(LEVELS_PER_FIELD);
        let root = read_document(content, limit)?;
        if root.name != "schema" {
            return Err(ParseError::structure(
                SchemaFormat::XmlSchema,
                format!("root element must be <xs:schema>, found <{}>", root.name),
            ));
        }
        Ok(root)
    }
}

impl FormatParser for XmlSchemaParser {
    fn format(&self) -> SchemaFormat {
        SchemaFormat::XmlSchema
    }

    fn validate(&self, content: &str) -> ParserValidation {
        match Self::read(content, super::DEFAULT_MAX_DEPTH) {
            Ok(schema) if schema.children_named("element").next().is_none() => {
                ParserValidation::failed("Schema declares no top-level elements")
            }
            Ok(_) => ParserValidation::ok(),
            Err(e) => ParserValidation::failed(e.to_string()),
        }
    }

    fn parse(&self, content: &str, options: &ParseOptions) -> Result<Vec<FieldNode>, ParseError> {
        let schema = Self::read(content, options.max_depth)?;
        let mut walk = Walk {
            table: TypeTable::build(&schema),
            type_stack: Vec::new(),
            options: *options,
        };
        let mut roots = Vec::new();
        for decl in schema.children_named("element") {
            roots.extend(walk.element(decl, "", false, 0));
        }
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Vec<FieldNode> {
        let content = format!(
            r#"<?xml version="1.0"?>
            <xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
            body
        );
        XmlSchemaParser::new()
            .parse(&content, &ParseOptions::default())
            .unwrap()
    }

    #[test]
    fn test_sequence_required_and_arrays() {
        let roots = parse(
            r#"<xs:element name="order">
                 <xs:complexType>
                   <xs:sequence>
                     <xs:element name="id" type="xs:int"/>
                     <xs:element name="note" type="xs:string" minOccurs="0"/>
                     <xs:element name="line" maxOccurs="unbounded">
                       <xs:complexType><xs:sequence>
                         <xs:element name="sku" type="xs:string"/>
                       </xs:sequence></xs:complexType>
                     </xs:element>
                   </xs:sequence>
                   <xs:attribute name="currency" type="xs:string" use="required"/>
                   <xs:attribute name="channel" type="xs:string"/>
                 </xs:complexType>
               </xs:element>"#,
        );
        let order = &roots[0];
        assert_eq!(order.path, "order");
        let id = &order.children[0];
        assert_eq!(id.field_type, FieldType::Integer);
        assert!(id.required);
        assert!(!order.children[1].required);
        let line = &order.children[2];
        assert_eq!(line.path, "order.line[]");
        assert_eq!(line.field_type, FieldType::Array);
        assert_eq!(line.children[0].path, "order.line[].sku");
        let currency = &order.children[3];
        assert_eq!(currency.path, "order@currency");
        assert!(currency.required);
        assert!(!order.children[4].required);
    }

    #[test]
    fn test_choice_forces_optional() {
        let roots = parse(
            r#"<xs:element name="pay"><xs:complexType><xs:sequence>
                 <xs:element name="amount" type="xs:decimal"/>
                 <xs:choice>
                   <xs:element name="card" type="xs:string" minOccurs="1"/>
                   <xs:element name="iban" type="xs:string"/>
                 </xs:choice>
               </xs:sequence></xs:complexType></xs:element>"#,
        );
        let pay = &roots[0];
        assert!(pay.children[0].required);
        assert!(!pay.children[1].required);
        assert!(!pay.children[2].required);
    }

    #[test]
    fn test_named_types_resolved_before_descent() {
        let roots = parse(
            r#"<xs:element name="person" type="PersonType"/>
               <xs:complexType name="PersonType"><xs:all>
                 <xs:element name="born" type="xs:date"/>
                 <xs:element name="code" type="CodeType"/>
               </xs:all></xs:complexType>
               <xs:simpleType name="CodeType"><xs:restriction base="xs:integer"/></xs:simpleType>"#,
        );
        let person = &roots[0];
        assert_eq!(person.field_type, FieldType::Object);
        assert_eq!(person.children[0].field_type, FieldType::Date);
        assert_eq!(person.children[1].field_type, FieldType::Integer);
    }

    #[test]
    fn test_recursive_type_guard() {
        let roots = parse(
            r#"<xs:element name="tree" type="Node"/>
               <xs:complexType name="Node"><xs:sequence>
                 <xs:element name="label" type="xs:string"/>
                 <xs:element name="child" type="Node" minOccurs="0" maxOccurs="unbounded"/>
               </xs:sequence></xs:complexType>"#,
        );
        let child = &roots[0].children[1];
        assert_eq!(child.path, "tree.child[]");
        assert!(child.children.is_empty());
    }

    #[test]
    fn test_extension_and_simple_content() {
        let roots = parse(
            r#"<xs:complexType name="Base"><xs:sequence>
                 <xs:element name="id" type="xs:long"/>
               </xs:sequence></xs:complexType>
               <xs:element name="item"><xs:complexType><xs:complexContent>
                 <xs:extension base="Base"><xs:sequence>
                   <xs:element name="price"><xs:complexType><xs:simpleContent>
                     <xs:extension base="xs:decimal">
                       <xs:attribute name="unit" type="xs:string"/>
                     </xs:extension>
                   </xs:simpleContent></xs:complexType></xs:element>
                 </xs:sequence></xs:extension>
               </xs:complexContent></xs:complexType></xs:element>"#,
        );
        let item = &roots[0];
        let paths: Vec<_> = item.children.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["item.id", "item.price"]);
        let price = &item.children[1];
        assert_eq!(price.children[0].path, "item.price@unit");
        assert_eq!(price.children[1].path, "item.price.#text");
        assert_eq!(price.children[1].field_type, FieldType::Number);
    }

    #[test]
    fn test_element_ref() {
        let roots = parse(
            r#"<xs:element name="email" type="xs:string"/>
               <xs:element name="contact"><xs:complexType><xs:sequence>
                 <xs:element ref="email" minOccurs="0"/>
               </xs:sequence></xs:complexType></xs:element>"#,
        );
        let contact = &roots[1];
        assert_eq!(contact.children[0].path, "contact.email");
        assert!(!contact.children[0].required);
    }

    #[test]
    fn test_validate() {
        let parser = XmlSchemaParser::new();
        assert!(!parser.validate("<root/>").valid);
        assert!(!parser.validate("<xs:schema xmlns:xs=\"x\"></xs:schema>").valid);
        assert!(!parser.validate("<xs:schema").valid);
    }
}
