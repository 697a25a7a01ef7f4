//! Error types and handling for the CLI
//!
//! Each variant maps to its own process exit code.

use std::io;
use std::path::PathBuf;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for CLI operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Error from fieldmap-core
    #[error("Core error: {0}")]
    Core(#[from] fieldmap_core::Error),

    /// File not found
    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// File content could not be read as the expected format
    #[error("Invalid file format for {}: expected {}: {}", path.display(), expected, message)]
    InvalidFormat {
        path: PathBuf,
        expected: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A schema file could not be parsed
    #[error("Failed to parse {}: {}", path.display(), errors.join("; "))]
    ParseFailed { path: PathBuf, errors: Vec<String> },

    /// The mapping has validation errors
    #[error("Mapping is invalid: {count} error(s)")]
    MappingInvalid { count: usize },

    /// At least one rule failed or the rules were rejected
    #[error("Transformation failed: {count} error(s)")]
    TransformFailed { count: usize },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error with context
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a generic error with message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) => 1,
            Self::Core(fieldmap_core::Error::Configuration(_)) => 5,
            Self::Core(_) => 2,
            Self::FileNotFound { .. } => 3,
            Self::InvalidFormat { .. } => 4,
            Self::Config(_) => 5,
            Self::ParseFailed { .. } => 6,
            Self::MappingInvalid { .. } => 7,
            Self::TransformFailed { .. } => 8,
            Self::Json(_) => 12,
            Self::Yaml(_) => 13,
            Self::Other { .. } => 99,
        }
    }

    /// Failures that were already reported in full on stdout
    pub fn is_reported(&self) -> bool {
        matches!(
            self,
            Self::MappingInvalid { .. } | Self::TransformFailed { .. }
        )
    }
}

/// Format an error for display to the user
pub fn format_error(error: &Error, use_color: bool) -> String {
    if use_color {
        use colored::Colorize;
        format!("{} {}", "Error:".red().bold(), error)
    } else {
        format!("Error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            Error::FileNotFound {
                path: PathBuf::from("x"),
            },
            Error::config("bad"),
            Error::ParseFailed {
                path: PathBuf::from("x"),
                errors: vec!["e".to_string()],
            },
            Error::MappingInvalid { count: 1 },
            Error::TransformFailed { count: 2 },
            Error::other("x"),
        ];
        let codes: std::collections::HashSet<i32> = errors.iter().map(Error::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(errors.iter().all(|e| e.exit_code() != 0));
    }

    #[test]
    fn test_engine_config_errors_exit_as_config() {
        let invalid = fieldmap_core::ConfigError::Invalid {
            field: "lookup.timeout_ms",
            message: "must be greater than zero".to_string(),
        };
        let error = Error::from(fieldmap_core::Error::from(invalid));
        assert_eq!(error.exit_code(), Error::config("bad").exit_code());
        assert!(error.to_string().contains("lookup.timeout_ms"));

        let script = fieldmap_core::ScriptSandbox::default()
            .compile("return )")
            .unwrap_err();
        assert_eq!(Error::from(fieldmap_core::Error::from(script)).exit_code(), 2);
    }

    #[test]
    fn test_format_error_without_color() {
        let text = format_error(&Error::MappingInvalid { count: 3 }, false);
        assert_eq!(text, "Error: Mapping is invalid: 3 error(s)");
    }
}
