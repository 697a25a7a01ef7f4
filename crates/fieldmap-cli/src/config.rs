//! Configuration management for the CLI
//!
//! This module handles loading and merging configuration from:
//! - Default values
//! - Configuration files (YAML/TOML/JSON)
//! - Environment variables (engine limits)

use crate::error::{Error, Result};
use fieldmap_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parser, sandbox and lookup limits handed to the core
    pub engine: EngineConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Use colored output by default
    pub color: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when neither `-v` nor RUST_LOG is given
    pub level: Option<String>,

    /// Log format (compact, full, json)
    pub format: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;

        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase);
        let config: Config = match extension.as_deref() {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)
                .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?,
            _ => serde_json::from_str(&content)?,
        };

        config.engine.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                match Self::from_file(&path) {
                    Ok(config) => {
                        debug!(path = %path.display(), "configuration loaded");
                        return Ok(config);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to load configuration");
                    }
                }
            }
        }

        Ok(Self::default())
    }

    /// Load from a specific file or default locations, then apply environment overrides
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::load()?,
        };
        config.engine.apply_env()?;
        Ok(config)
    }

    /// Get default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".fieldmap.yaml"),
            PathBuf::from(".fieldmap.yml"),
            PathBuf::from(".fieldmap.toml"),
            PathBuf::from(".fieldmap.json"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            let fieldmap_dir = config_dir.join("fieldmap");
            paths.push(fieldmap_dir.join("config.yaml"));
            paths.push(fieldmap_dir.join("config.toml"));
            paths.push(fieldmap_dir.join("config.json"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".fieldmap.yaml"));
            paths.push(home_dir.join(".fieldmap.toml"));
            paths.push(home_dir.join(".fieldmap.json"));
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_yaml_config() {
        let file = write_temp(
            ".yaml",
            "engine:\n  sandbox:\n    timeout_ms: 250\noutput:\n  color: false\nlogging:\n  format: json\n",
        );
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.engine.sandbox.timeout_ms, 250);
        assert_eq!(config.engine.parser.max_depth, 50);
        assert!(!config.output.color);
        assert_eq!(config.logging.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_toml_and_json_config() {
        let toml = write_temp(".toml", "[engine.lookup]\ntimeout_ms = 10\n");
        assert_eq!(Config::from_file(toml.path()).unwrap().engine.lookup.timeout_ms, 10);

        let json = write_temp(".json", r#"{"engine": {"parser": {"max_depth": 7}}}"#);
        assert_eq!(Config::from_file(json.path()).unwrap().engine.parser.max_depth, 7);
    }

    #[test]
    fn test_invalid_engine_limits_rejected() {
        let file = write_temp(".json", r#"{"engine": {"sandbox": {"timeout_ms": 0}}}"#);
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(fieldmap_core::Error::Configuration(
                fieldmap_core::ConfigError::Invalid { field: "sandbox.timeout_ms", .. }
            ))
        ));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
