//! Mapping and rule validation
//!
//! - [`compatibility`] - the fixed source-type to target-type table
//! - [`mapping`] - completeness and type checks over two field trees and a set
//!   of connections
//! - [`rules`] - structural checks on transformation rules before a run
//!
//! Validation never short-circuits: every check runs and all findings are
//! returned together as values.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

pub mod compatibility;
pub mod mapping;
pub mod rules;

#[cfg(test)]
mod tests;

pub use compatibility::{allowed_targets, is_compatible};
pub use mapping::validate_mapping;
pub use rules::{validate_rule, validate_rules};

use crate::error::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of problem found in a mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorType {
    /// A required target leaf has no incoming connection
    MissingRequired,
    /// A connection feeds a type the target cannot accept
    TypeMismatch,
}

impl fmt::Display for ValidationErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationErrorType::MissingRequired => write!(f, "missing_required"),
            ValidationErrorType::TypeMismatch => write!(f, "type_mismatch"),
        }
    }
}

/// One mapping finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub error_type: ValidationErrorType,
    pub target_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl ValidationError {
    pub fn missing_required(target_field: impl Into<String>) -> Self {
        let target_field = target_field.into();
        Self {
            error_type: ValidationErrorType::MissingRequired,
            message: format!("Required field '{}' is not mapped", target_field),
            target_field,
            source_field: None,
            severity: Severity::Error,
        }
    }

    pub fn type_mismatch(
        source_field: impl Into<String>,
        target_field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error_type: ValidationErrorType::TypeMismatch,
            target_field: target_field.into(),
            source_field: Some(source_field.into()),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Aggregated outcome of a mapping validation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// True iff there are no error-severity findings
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub error_count: usize,
    pub warning_count: usize,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        let error_count = errors.iter().filter(|e| e.is_error()).count();
        let warning_count = errors.len() - error_count;
        Self {
            valid: error_count == 0,
            errors,
            error_count,
            warning_count,
        }
    }

    /// Findings of one kind
    pub fn of_type(&self, error_type: ValidationErrorType) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.error_type == error_type)
    }
}
