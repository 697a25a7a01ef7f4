//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;

/// Fieldmap CLI - schema field trees, mapping validation and record transformation
///
/// Parses JSON Schema, JSON samples, XML samples and XSD files into one
/// canonical field tree, checks connections between two trees and runs
/// transformation rules over records.
#[derive(Parser, Debug)]
#[command(
    name = "fieldmap",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "FIELDMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, value_enum, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a schema or sample file into a field tree
    Parse(ParseArgs),

    /// Validate connections between a source and a target file
    Validate(ValidateArgs),

    /// Run transformation rules over a record
    Transform(TransformArgs),

    /// Generate shell completions for the specified shell
    Completions(CompletionsArgs),
}

/// Arguments for the parse command
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Schema or sample file (.json, .xml, .xsd)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Nesting depth beyond which children are dropped
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Skip detection and parse as this format
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Source schema or sample file
    #[arg(long, value_name = "FILE")]
    pub source: PathBuf,

    /// Target schema or sample file
    #[arg(long, value_name = "FILE")]
    pub target: PathBuf,

    /// JSON or YAML file holding the list of connections
    #[arg(long, value_name = "FILE")]
    pub connections: PathBuf,
}

/// Arguments for the transform command
#[derive(Parser, Debug)]
pub struct TransformArgs {
    /// JSON or YAML file holding the input record (a flat object)
    #[arg(long, value_name = "FILE")]
    pub record: PathBuf,

    /// JSON or YAML file holding the list of rules
    #[arg(long, value_name = "FILE")]
    pub rules: PathBuf,

    /// JSON file of lookup tables: {"table": {"key": value}}
    #[arg(long, value_name = "FILE")]
    pub lookup: Option<PathBuf>,

    /// Compute outputs without applying them
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for generating shell completions
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    Human,
    /// Compact JSON output
    Json,
    /// Pretty-printed JSON output
    JsonPretty,
    /// YAML output
    Yaml,
}

/// Input formats accepted by `parse --format`
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    JsonSchema,
    JsonSample,
    XmlSample,
    XmlSchema,
}

/// Supported shells for completion generation
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

impl From<FormatArg> for fieldmap_core::SchemaFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::JsonSchema => fieldmap_core::SchemaFormat::JsonSchema,
            FormatArg::JsonSample => fieldmap_core::SchemaFormat::JsonSample,
            FormatArg::XmlSample => fieldmap_core::SchemaFormat::XmlSample,
            FormatArg::XmlSchema => fieldmap_core::SchemaFormat::XmlSchema,
        }
    }
}

impl Shell {
    /// Convert to clap_complete shell type
    pub fn to_clap_shell(self) -> clap_complete::Shell {
        match self {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}
