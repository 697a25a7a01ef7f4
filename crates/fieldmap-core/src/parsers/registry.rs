//! Format detection and parser dispatch
//!
//! The registry is the single entry point callers use for raw content. It
//! never returns `Err`: detection, validation and parse failures all come back
//! as a [`ParserResult`] with `success == false`.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::{
    FormatParser, JsonSampleParser, JsonSchemaParser, ParseError, ParseOptions, SchemaFormat,
    XmlSampleParser, XmlSchemaParser,
};
use crate::types::{count_nodes, FieldNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

/// Uniform envelope returned by every registry entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserResult {
    pub success: bool,
    pub field_nodes: Vec<FieldNode>,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_type: Option<SchemaFormat>,
}

impl ParserResult {
    fn succeeded(format: SchemaFormat, field_nodes: Vec<FieldNode>) -> Self {
        Self {
            success: true,
            field_nodes,
            errors: Vec::new(),
            parser_type: Some(format),
        }
    }

    fn failed(format: Option<SchemaFormat>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            field_nodes: Vec::new(),
            errors,
            parser_type: format,
        }
    }
}

/// Classify content by filename extension, probing `.json` content
///
/// `.xml` and `.xsd` are decided by extension alone. A `.json` document is a
/// schema when it carries `$schema`, or `type` together with `properties`;
/// anything else, including unparseable JSON, is treated as a sample so the
/// sample parser can report the syntax error.
pub fn detect_format(content: &str, filename: &str) -> Result<SchemaFormat, ParseError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("xsd") => Ok(SchemaFormat::XmlSchema),
        Some("xml") => Ok(SchemaFormat::XmlSample),
        Some("json") => {
            let is_schema = super::json::read_document(content, 1)
                .ok()
                .and_then(|doc| {
                    doc.as_object().map(|root| {
                        root.contains_key("$schema")
                            || (root.contains_key("type") && root.contains_key("properties"))
                    })
                })
                .unwrap_or(false);
            Ok(if is_schema {
                SchemaFormat::JsonSchema
            } else {
                SchemaFormat::JsonSample
            })
        }
        _ => Err(ParseError::UnsupportedFormat {
            filename: filename.to_string(),
        }),
    }
}

/// Dispatch table from format tag to parser
pub struct ParserRegistry {
    parsers: HashMap<SchemaFormat, Box<dyn FormatParser>>,
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserRegistry")
            .field("formats", &self.supported_formats())
            .finish()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserRegistry {
    /// Registry with the four built-in parsers
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(JsonSchemaParser::new()));
        registry.register(Box::new(JsonSampleParser::new()));
        registry.register(Box::new(XmlSampleParser::new()));
        registry.register(Box::new(XmlSchemaParser::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Process-wide registry, built on first use and read-only afterwards
    pub fn global() -> &'static ParserRegistry {
        static GLOBAL: OnceLock<ParserRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ParserRegistry::new)
    }

    /// Add or replace the parser for its format
    pub fn register(&mut self, parser: Box<dyn FormatParser>) {
        self.parsers.insert(parser.format(), parser);
    }

    pub fn get(&self, format: SchemaFormat) -> Option<&dyn FormatParser> {
        self.parsers.get(&format).map(|p| p.as_ref())
    }

    /// Registered format tags in canonical order
    pub fn supported_formats(&self) -> Vec<SchemaFormat> {
        SchemaFormat::ALL
            .into_iter()
            .filter(|f| self.parsers.contains_key(f))
            .collect()
    }

    /// Detect, validate and parse `content`
    #[instrument(skip(self, content, options), fields(bytes = content.len()))]
    pub fn parse_file(
        &self,
        content: &str,
        filename: &str,
        options: Option<&ParseOptions>,
    ) -> ParserResult {
        match detect_format(content, filename) {
            Ok(format) => {
                debug!(%format, "format detected");
                self.parse_as(format, content, options)
            }
            Err(e) => {
                warn!(error = %e, "format detection failed");
                ParserResult::failed(None, vec![e.to_string()])
            }
        }
    }

    /// Validate and parse `content` with an explicit format, skipping detection
    pub fn parse_as(
        &self,
        format: SchemaFormat,
        content: &str,
        options: Option<&ParseOptions>,
    ) -> ParserResult {
        let Some(parser) = self.get(format) else {
            let error = ParseError::NoParser { format };
            return ParserResult::failed(Some(format), vec![error.to_string()]);
        };

        let validation = parser.validate(content);
        if !validation.valid {
            warn!(%format, errors = validation.errors.len(), "content failed validation");
            return ParserResult::failed(Some(format), validation.errors);
        }

        let options = options.copied().unwrap_or_default();
        match parser.parse(content, &options) {
            Ok(nodes) => {
                info!(%format, nodes = count_nodes(&nodes), "parsed field tree");
                ParserResult::succeeded(format, nodes)
            }
            Err(e) => {
                warn!(%format, error = %e, "parse failed");
                ParserResult::failed(Some(format), vec![e.to_string()])
            }
        }
    }
}
