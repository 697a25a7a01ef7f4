//! Format parsers producing canonical field trees
//!
//! Four independent implementations of [`FormatParser`] reduce their input
//! format to `Vec<FieldNode>`:
//!
//! - [`JsonSchemaParser`] - JSON-Schema-like schema descriptions
//! - [`JsonSampleParser`] - representative JSON documents
//! - [`XmlSampleParser`] - representative XML documents
//! - [`XmlSchemaParser`] - XML Schema (XSD) documents
//!
//! [`ParserRegistry`] picks one by format tag. Every parser bounds its
//! recursion with [`ParseOptions::max_depth`]: nodes at the ceiling are still
//! emitted but their children are not.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

pub mod json;
pub mod json_sample;
pub mod json_schema;
pub mod registry;
pub mod xml;
pub mod xml_sample;
pub mod xml_schema;

pub use json_sample::JsonSampleParser;
pub use json_schema::JsonSchemaParser;
pub use registry::{detect_format, ParserRegistry, ParserResult};
pub use xml_sample::XmlSampleParser;
pub use xml_schema::XmlSchemaParser;

use crate::types::FieldNode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default recursion ceiling for all parsers
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Errors raised while detecting or parsing an input document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Content is not well-formed JSON
    #[error("Invalid JSON: {message}")]
    InvalidJson { message: String },

    /// Content is not well-formed XML
    #[error("Invalid XML: {message}")]
    InvalidXml { message: String },

    /// Well-formed but not the expected document shape
    #[error("Invalid {format} document: {message}")]
    Structure { format: SchemaFormat, message: String },

    /// Filename extension maps to no known parser
    #[error("Unsupported format for '{filename}'. Expected .json, .xml or .xsd")]
    UnsupportedFormat { filename: String },

    /// No parser registered for a detected format
    #[error("No parser registered for format '{format}'")]
    NoParser { format: SchemaFormat },
}

impl ParseError {
    pub fn structure(format: SchemaFormat, message: impl Into<String>) -> Self {
        Self::Structure {
            format,
            message: message.into(),
        }
    }
}

/// Format tag used for detection and dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaFormat {
    JsonSchema,
    JsonSample,
    XmlSample,
    XmlSchema,
}

impl SchemaFormat {
    pub const ALL: [SchemaFormat; 4] = [
        SchemaFormat::JsonSchema,
        SchemaFormat::JsonSample,
        SchemaFormat::XmlSample,
        SchemaFormat::XmlSchema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaFormat::JsonSchema => "json-schema",
            SchemaFormat::JsonSample => "json-sample",
            SchemaFormat::XmlSample => "xml-sample",
            SchemaFormat::XmlSchema => "xml-schema",
        }
    }
}

impl fmt::Display for SchemaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options accepted by [`FormatParser::parse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOptions {
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ParseOptions {
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

/// Outcome of the cheap structural check run before parsing
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParserValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ParserValidation {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
        }
    }

    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Shared contract of the four format parsers
pub trait FormatParser: Send + Sync {
    /// Format tag this parser handles
    fn format(&self) -> SchemaFormat;

    /// Cheap structural check; always run before [`FormatParser::parse`]
    fn validate(&self, content: &str) -> ParserValidation;

    /// Build the canonical field tree
    fn parse(&self, content: &str, options: &ParseOptions) -> Result<Vec<FieldNode>, ParseError>;
}
