//! Error types for the fieldmap core library
//!
//! Each subsystem owns a `thiserror` enum (`ParseError`, `TransformError`,
//! `SandboxError`, `ConfigError`). This module ties them together into the
//! crate-level [`Error`] so callers that want a single error channel can use
//! `fieldmap_core::Result`.
//!
//! Engine configuration loading (`EngineConfig::from_file`, `from_env`,
//! `apply_env`) returns `fieldmap_core::Result`. The public entry points for
//! parsing, validation and pipeline execution report their failures as
//! values instead (`ParserResult`, `ValidationResult`,
//! `TransformationResult`).
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use crate::config::ConfigError;
use crate::parsers::ParseError;
use crate::sandbox::SandboxError;
use crate::transformer::TransformError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for fieldmap operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or undetectable schema/sample input
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A transform function failed
    #[error("Transformation error: {0}")]
    Transformation(#[from] TransformError),

    /// Script evaluation failed inside the sandbox
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Severity levels for validation findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth reviewing, does not fail validation
    Warning,
    /// Fails validation
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::{FormatParser, JsonSampleParser, ParseOptions};
    use crate::sandbox::ScriptSandbox;
    use crate::transformer::{apply_builtin, TransformKind};
    use serde_json::{json, Value};

    fn count_fields(sample: &str, script: &str, format: Value) -> Result<Value> {
        let nodes = JsonSampleParser::new().parse(sample, &ParseOptions::default())?;
        ScriptSandbox::default().compile(script)?;
        Ok(apply_builtin(TransformKind::FormatNumber, &json!(nodes.len()), &format)?)
    }

    #[test]
    fn test_building_blocks_convert_into_crate_error() {
        let ok = count_fields(r#"{"a": 1, "b": 2}"#, "return value;", json!({}));
        assert_eq!(ok.unwrap(), json!("2"));

        let err = count_fields("{oops", "return value;", json!({})).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::InvalidJson { .. })));

        let err = count_fields("{}", "return )", json!({})).unwrap_err();
        assert!(matches!(err, Error::Sandbox(SandboxError::Syntax { .. })));
        assert!(err.to_string().starts_with("Sandbox error: SyntaxError"));

        let err = count_fields("{}", "return value;", json!({"maximumFractionDigits": 99}))
            .unwrap_err();
        assert!(matches!(err, Error::Transformation(TransformError::InvalidConfig { .. })));
    }
}
