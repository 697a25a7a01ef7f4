//! Engine configuration
//!
//! Tunables for parsing depth, script limits and lookup timeouts. Values come
//! from defaults, an optional YAML/TOML/JSON file, and `FIELDMAP_*`
//! environment variables, in that order of precedence (later wins).
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use crate::error::Result;
use crate::parsers::{ParseOptions, DEFAULT_MAX_DEPTH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_MAX_DEPTH: &str = "FIELDMAP_MAX_DEPTH";
pub const ENV_SCRIPT_TIMEOUT_MS: &str = "FIELDMAP_SCRIPT_TIMEOUT_MS";
pub const ENV_SCRIPT_MEMORY_LIMIT: &str = "FIELDMAP_SCRIPT_MEMORY_LIMIT";
pub const ENV_LOOKUP_TIMEOUT_MS: &str = "FIELDMAP_LOOKUP_TIMEOUT_MS";

/// Configuration failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("Unsupported config file extension: {path}")]
    UnsupportedExtension { path: PathBuf },

    #[error("Invalid value '{value}' for {variable}: expected a positive integer")]
    InvalidEnv { variable: String, value: String },

    #[error("Invalid configuration: {field} {message}")]
    Invalid { field: &'static str, message: String },
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub parser: ParserConfig,
    pub sandbox: SandboxConfig,
    pub lookup: LookupStoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Deepest level whose containers are expanded
    pub max_depth: usize,
}

/// Resource limits for user scripts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_ms: u64,
    pub memory_limit_bytes: usize,
    /// Parser nesting ceiling, also used as the call-depth ceiling
    pub max_nesting: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupStoreConfig {
    /// Bound on one lookup-store round trip
    pub timeout_ms: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            memory_limit_bytes: 8 * 1024 * 1024,
            max_nesting: 64,
        }
    }
}

impl Default for LookupStoreConfig {
    fn default() -> Self {
        Self { timeout_ms: 5000 }
    }
}

impl EngineConfig {
    /// Load from a `.yaml`/`.yml`, `.toml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let format_error = |message: String| ConfigError::Format {
            path: path.to_path_buf(),
            message,
        };

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        let config: EngineConfig = match extension.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| format_error(e.to_string()))?
            }
            Some("toml") => toml::from_str(&content).map_err(|e| format_error(e.to_string()))?,
            Some("json") => serde_json::from_str(&content).map_err(|e| format_error(e.to_string()))?,
            _ => {
                return Err(ConfigError::UnsupportedExtension {
                    path: path.to_path_buf(),
                }
                .into())
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `FIELDMAP_*` variables that are set
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(depth) = read_positive(&lookup, ENV_MAX_DEPTH)? {
            self.parser.max_depth = depth as usize;
        }
        if let Some(ms) = read_positive(&lookup, ENV_SCRIPT_TIMEOUT_MS)? {
            self.sandbox.timeout_ms = ms;
        }
        if let Some(bytes) = read_positive(&lookup, ENV_SCRIPT_MEMORY_LIMIT)? {
            self.sandbox.memory_limit_bytes = bytes as usize;
        }
        if let Some(ms) = read_positive(&lookup, ENV_LOOKUP_TIMEOUT_MS)? {
            self.lookup.timeout_ms = ms;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        let checks: [(&'static str, bool); 5] = [
            ("parser.max_depth", self.parser.max_depth == 0),
            ("sandbox.timeout_ms", self.sandbox.timeout_ms == 0),
            ("sandbox.memory_limit_bytes", self.sandbox.memory_limit_bytes == 0),
            ("sandbox.max_nesting", self.sandbox.max_nesting == 0),
            ("lookup.timeout_ms", self.lookup.timeout_ms == 0),
        ];
        match checks.iter().find(|(_, zero)| *zero) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field: *field,
                message: "must be greater than zero".to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions::with_max_depth(self.parser.max_depth)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup.timeout_ms)
    }
}

fn read_positive<F>(lookup: &F, variable: &str) -> std::result::Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(variable) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidEnv {
            variable: variable.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.parser.max_depth, 50);
        assert_eq!(config.sandbox.timeout_ms, 1000);
        assert_eq!(config.sandbox.memory_limit_bytes, 8 * 1024 * 1024);
        assert_eq!(config.lookup.timeout_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_each_format() {
        let yaml = write_config(".yaml", "parser:\n  max_depth: 7\n");
        assert_eq!(EngineConfig::from_file(yaml.path()).unwrap().parser.max_depth, 7);

        let toml = write_config(".toml", "[sandbox]\ntimeout_ms = 250\n");
        let config = EngineConfig::from_file(toml.path()).unwrap();
        assert_eq!(config.sandbox.timeout_ms, 250);
        assert_eq!(config.sandbox.max_nesting, 64);

        let json = write_config(".json", r#"{"lookup": {"timeout_ms": 10}}"#);
        assert_eq!(EngineConfig::from_file(json.path()).unwrap().lookup.timeout_ms, 10);
    }

    #[test]
    fn test_file_errors() {
        let bad = write_config(".yaml", "parser: [not, a, map]");
        assert!(matches!(
            EngineConfig::from_file(bad.path()),
            Err(Error::Configuration(ConfigError::Format { .. }))
        ));

        let ini = write_config(".ini", "x=1");
        assert!(matches!(
            EngineConfig::from_file(ini.path()),
            Err(Error::Configuration(ConfigError::UnsupportedExtension { .. }))
        ));

        let zero = write_config(".json", r#"{"parser": {"max_depth": 0}}"#);
        assert!(matches!(
            EngineConfig::from_file(zero.path()),
            Err(Error::Configuration(ConfigError::Invalid { field: "parser.max_depth", .. }))
        ));

        assert!(matches!(
            EngineConfig::from_file(Path::new("/nonexistent/fieldmap.yaml")),
            Err(Error::Configuration(ConfigError::Io { .. }))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_MAX_DEPTH, "3"),
            (ENV_SCRIPT_MEMORY_LIMIT, "4096"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.parser.max_depth, 3);
        assert_eq!(config.sandbox.memory_limit_bytes, 4096);
        assert_eq!(config.sandbox.timeout_ms, 1000);
        assert_eq!(config.parse_options().max_depth, 3);
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        for raw in ["0", "-1", "ten", ""] {
            let mut config = EngineConfig::default();
            let err = config
                .apply_overrides(|name| (name == ENV_LOOKUP_TIMEOUT_MS).then(|| raw.to_string()))
                .unwrap_err();
            assert!(
                matches!(err, Error::Configuration(ConfigError::InvalidEnv { .. })),
                "{:?}",
                raw
            );
        }
    }
}
