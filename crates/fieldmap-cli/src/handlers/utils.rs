//! Shared file loading for command handlers

use crate::error::{Error, Result};
use fieldmap_core::{FieldNode, ParseOptions, ParserRegistry, ParserResult, SchemaFormat};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read a file to a string, reporting a missing file as such
pub fn read_file(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })?;
    debug!(path = %path.display(), bytes = content.len(), "file read");
    Ok(content)
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("yaml") || s.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

/// Deserialize a JSON or YAML file, chosen by extension
pub fn read_structured<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = read_file(path)?;
    if is_yaml(path) {
        serde_yaml::from_str(&content).map_err(|e| Error::InvalidFormat {
            path: path.to_path_buf(),
            expected: "YAML".to_string(),
            message: e.to_string(),
        })
    } else {
        serde_json::from_str(&content).map_err(|e| Error::InvalidFormat {
            path: path.to_path_buf(),
            expected: "JSON".to_string(),
            message: e.to_string(),
        })
    }
}

/// Run a schema or sample file through the parser registry
pub fn parse_schema_file(
    path: &Path,
    format: Option<SchemaFormat>,
    options: &ParseOptions,
) -> Result<ParserResult> {
    let content = read_file(path)?;
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let registry = ParserRegistry::global();
    Ok(match format {
        Some(format) => registry.parse_as(format, &content, Some(options)),
        None => registry.parse_file(&content, filename, Some(options)),
    })
}

/// Field tree of a schema or sample file; parse failures become errors
pub fn load_field_tree(path: &Path, options: &ParseOptions) -> Result<Vec<FieldNode>> {
    let result = parse_schema_file(path, None, options)?;
    if result.success {
        Ok(result.field_nodes)
    } else {
        Err(Error::ParseFailed {
            path: path.to_path_buf(),
            errors: result.errors,
        })
    }
}
