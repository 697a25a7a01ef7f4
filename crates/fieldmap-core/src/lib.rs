//! Fieldmap Core - schema normalization, mapping validation and record transformation
//!
//! This crate turns heterogeneous schema descriptions into one canonical field
//! tree, checks proposed field mappings between two trees, and runs ordered
//! transformation rules over flat records.
//!
//! # Main Components
//!
//! - **Parsers**: JSON Schema, JSON sample, XML sample and XSD inputs, dispatched
//!   by [`ParserRegistry`] into [`FieldNode`] trees
//! - **Validation**: the type compatibility matrix, [`validate_mapping`] and
//!   structural rule checks
//! - **Transformer**: built-in transforms, the lookup collaborator and the
//!   [`TransformationPipeline`]
//! - **Sandbox**: a bounded evaluator for user-supplied transform scripts
//!
//! # Example
//!
//! ```
//! use fieldmap_core::{validate_mapping, Connection, ParserRegistry};
//!
//! let source = ParserRegistry::global().parse_file(r#"{"name": "Ada", "age": 36}"#, "person.json", None);
//! let target = ParserRegistry::global().parse_file(
//!     r#"{"type": "object", "required": ["fullName"], "properties": {"fullName": {"type": "string"}}}"#,
//!     "person.schema.json",
//!     None,
//! );
//! assert!(source.success && target.success);
//!
//! let report = validate_mapping(
//!     &source.field_nodes,
//!     &target.field_nodes,
//!     &[Connection::new("name", "fullName")],
//! );
//! assert!(report.valid);
//! ```
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

pub mod config;
pub mod error;
pub mod normalizer;
pub mod parsers;
pub mod sandbox;
pub mod transformer;
pub mod types;
pub mod validation;

// Re-export main types for convenience
pub use config::{ConfigError, EngineConfig};
pub use error::{Error, Result, Severity};
pub use types::{
    count_nodes, find_by_path, flatten_leaves, Connection, ConnectionTransform, FieldNode,
    FieldType, TransformationRule,
};

pub use normalizer::{
    escape_segment, generate_attribute_path, generate_id, generate_path, normalize_type,
};
pub use parsers::{
    detect_format, FormatParser, ParseError, ParseOptions, ParserRegistry, ParserResult,
    SchemaFormat,
};

pub use validation::{
    validate_mapping, validate_rules, ValidationError, ValidationErrorType, ValidationResult,
};

pub use sandbox::{SandboxError, SandboxLimits, ScriptSandbox};
pub use transformer::{
    apply_transformations, InMemoryLookupStore, LookupStore, PipelineOptions, Record, RuleResult,
    TransformError, TransformKind, TransformationContext, TransformationPipeline,
    TransformationResult, TransformationRuleBuilder,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
