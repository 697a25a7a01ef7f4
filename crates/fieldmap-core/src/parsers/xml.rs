//! Bounded markup reader shared by the XML sample and XML Schema parsers
//!
//! Events from `quick-xml` are folded into a small owned element tree using an
//! explicit stack, so hostile nesting cannot exhaust the call stack while
//! reading. Elements nested deeper than the configured limit are consumed but
//! not materialized. Namespace prefixes are stripped from element and
//! attribute names, and `xmlns` declarations are dropped.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::ParseError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

/// One element of a parsed markup document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    /// Local name, prefix stripped
    pub name: String,
    /// Attributes in document order, local names
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated character data directly inside this element, trimmed
    pub text: String,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct children with the given local name
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn first_child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// Strip a `prefix:` from a qualified name
pub fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Parse `content` into its root element
///
/// `depth_limit` counts element levels below the root; elements deeper than
/// that are skipped.
pub fn read_document(content: &str, depth_limit: usize) -> Result<XmlElement, ParseError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    // Open elements beyond the depth limit
    let mut skipped = 0usize;

    loop {
        let event = reader.read_event().map_err(|e| invalid_xml(&reader, e))?;
        match event {
            Event::Start(start) => {
                if skipped > 0 || stack.len() > depth_limit {
                    skipped += 1;
                    continue;
                }
                ensure_single_root(&root, &stack)?;
                stack.push(element_from_start(&start)?);
            }
            Event::Empty(start) => {
                if skipped > 0 || stack.len() > depth_limit {
                    continue;
                }
                ensure_single_root(&root, &stack)?;
                let element = element_from_start(&start)?;
                close_element(element, &mut stack, &mut root);
            }
            Event::End(_) => {
                if skipped > 0 {
                    skipped -= 1;
                    continue;
                }
                let element = stack.pop().ok_or_else(|| ParseError::InvalidXml {
                    message: "unexpected closing tag".to_string(),
                })?;
                close_element(element, &mut stack, &mut root);
            }
            Event::Text(text) => {
                if skipped > 0 {
                    continue;
                }
                let text = text.unescape().map_err(|e| invalid_xml(&reader, e))?;
                append_text(&mut stack, &text)?;
            }
            Event::CData(data) => {
                if skipped > 0 {
                    continue;
                }
                let raw = data.into_inner();
                append_text(&mut stack, &String::from_utf8_lossy(&raw))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::InvalidXml {
            message: format!("unclosed element <{}>", open.name),
        });
    }
    root.ok_or_else(|| ParseError::InvalidXml {
        message: "document has no root element".to_string(),
    })
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement, ParseError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseError::InvalidXml {
            message: format!("malformed attribute on <{}>: {}", name, e),
        })?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseError::InvalidXml {
                message: format!("malformed attribute value on <{}>: {}", name, e),
            })?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn ensure_single_root(root: &Option<XmlElement>, stack: &[XmlElement]) -> Result<(), ParseError> {
    if root.is_some() && stack.is_empty() {
        return Err(ParseError::InvalidXml {
            message: "document has more than one root element".to_string(),
        });
    }
    Ok(())
}

fn close_element(element: XmlElement, stack: &mut [XmlElement], root: &mut Option<XmlElement>) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn append_text(stack: &mut [XmlElement], text: &str) -> Result<(), ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    match stack.last_mut() {
        Some(current) => {
            if !current.text.is_empty() {
                current.text.push(' ');
            }
            current.text.push_str(trimmed);
            Ok(())
        }
        None => Err(ParseError::InvalidXml {
            message: "text content outside of the root element".to_string(),
        }),
    }
}

fn invalid_xml(reader: &Reader<&[u8]>, error: quick_xml::Error) -> ParseError {
    ParseError::InvalidXml {
        message: format!("{} at byte {}", error, reader.buffer_position()),
    }
}
