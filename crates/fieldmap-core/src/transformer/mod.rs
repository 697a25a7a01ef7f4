//! Record transformation
//!
//! Applies an ordered list of [`TransformationRule`](crate::types::TransformationRule)s
//! to a flat record. Each rule reads one or more source fields, runs one of
//! the built-in transforms (or a lookup, or a sandboxed script) and writes
//! the output to its target field.
//!
//! # Module Organization
//!
//! - [`types`] - Transform kinds, per-kind configuration and errors
//! - [`functions`] - The pure, synchronous transforms
//! - [`lookup`] - The lookup-store collaborator and an in-memory store
//! - [`pipeline`] - Ordering, dispatch, dry runs and failure accounting
//! - [`builder`] - Fluent builder for rules
//!
//! # Example
//!
//! ```
//! use fieldmap_core::transformer::{
//!     PipelineOptions, TransformKind, TransformationPipeline, TransformationRuleBuilder,
//! };
//! use serde_json::json;
//!
//! let rule = TransformationRuleBuilder::new("full_name", TransformKind::Concatenate)
//!     .source_fields(["first", "last"])
//!     .target_field("name")
//!     .config("separator", " ")
//!     .build()
//!     .unwrap();
//!
//! let pipeline = TransformationPipeline::new().add_rule(rule);
//! let record = json!({"first": "Ada", "last": "Lovelace"});
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let result = runtime.block_on(pipeline.run(record.as_object().unwrap(), PipelineOptions::default()));
//! assert_eq!(result.result["name"], "Ada Lovelace");
//! ```
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

pub mod builder;
pub mod functions;
pub mod lookup;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod tests;

pub use builder::TransformationRuleBuilder;
pub use functions::apply_builtin;
pub use lookup::{InMemoryLookupStore, LookupError, LookupStore};
pub use pipeline::{
    apply_transformations, PipelineOptions, Record, RuleResult, TransformationContext,
    TransformationPipeline, TransformationResult,
};
pub use types::{TransformError, TransformKind};
