//! Output formatting and writing utilities
//!
//! Results are written in the selected format. Machine formats (JSON, YAML)
//! serialize the core result types verbatim; the human format renders them
//! as coloured summaries.

use crate::cli::OutputFormat;
use crate::error::Result;
use colored::Colorize;
use fieldmap_core::{
    FieldNode, ParserResult, Severity, TransformationResult, ValidationResult,
};
use serde::Serialize;
use std::io::{self, Write};
use tracing::trace;

/// Serialize a value in a machine format; the human format falls back to pretty JSON
pub fn format_value<T: Serialize>(format: OutputFormat, value: &T) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string(value)?),
        OutputFormat::JsonPretty | OutputFormat::Human => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
    }
}

/// Output writer that handles different output formats and colors
pub struct OutputWriter {
    format: OutputFormat,
    use_color: bool,
    quiet: bool,
    writer: Box<dyn Write>,
}

impl OutputWriter {
    /// Create a new output writer on stdout
    pub fn new(format: OutputFormat, use_color: bool, quiet: bool) -> Self {
        Self::with_writer(format, use_color, quiet, Box::new(io::stdout()))
    }

    /// Create an output writer with a custom writer
    pub fn with_writer(
        format: OutputFormat,
        use_color: bool,
        quiet: bool,
        writer: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            use_color,
            quiet,
            writer,
        }
    }

    fn is_human(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Write a line of output
    pub fn writeln(&mut self, content: &str) -> Result<()> {
        writeln!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write an info message (human format only)
    pub fn info(&mut self, message: &str) -> Result<()> {
        if self.quiet || !self.is_human() {
            return Ok(());
        }
        if self.use_color {
            self.writeln(&format!("{} {}", "ℹ".blue(), message))
        } else {
            self.writeln(&format!("INFO: {}", message))
        }
    }

    fn styled(&mut self, message: &str, ok: bool) -> Result<()> {
        let line = match (self.use_color, ok) {
            (true, true) => message.green().to_string(),
            (true, false) => message.red().to_string(),
            (false, true) => message.to_string(),
            (false, false) => format!("ERROR: {}", message),
        };
        self.writeln(&line)
    }

    fn section(&mut self, title: &str) -> Result<()> {
        self.writeln("")?;
        if self.use_color {
            self.writeln(&format!("═══ {} ═══", title).bright_blue().to_string())
        } else {
            self.writeln(&format!("=== {} ===", title))
        }
    }

    /// Write data in the configured format
    pub fn data<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let formatted = format_value(self.format, value)?;
        trace!(bytes = formatted.len(), "writing data");
        // YAML already ends with a newline
        if self.format == OutputFormat::Yaml {
            write!(self.writer, "{}", formatted)?;
            self.writer.flush()?;
            Ok(())
        } else {
            self.writeln(&formatted)
        }
    }

    /// Write a parser result
    pub fn parser_result(&mut self, source: &str, result: &ParserResult) -> Result<()> {
        if !self.is_human() {
            return self.data(result);
        }

        let format = result
            .parser_type
            .map_or_else(|| "unknown format".to_string(), |f| f.to_string());
        if !result.success {
            self.styled(&format!("✗ Could not parse {} ({})", source, format), false)?;
            for error in &result.errors {
                self.writeln(&format!("  • {}", error))?;
            }
            return Ok(());
        }

        let total = fieldmap_core::count_nodes(&result.field_nodes);
        self.styled(
            &format!("✓ Parsed {} as {}: {} field(s)", source, format, total),
            true,
        )?;
        if self.quiet {
            return Ok(());
        }
        self.section("Fields")?;
        let mut lines = Vec::with_capacity(total);
        for node in &result.field_nodes {
            tree_lines(node, 0, &mut lines);
        }
        for line in lines {
            self.writeln(&line)?;
        }
        Ok(())
    }

    /// Write a mapping validation report
    pub fn validation_result(&mut self, result: &ValidationResult) -> Result<()> {
        if !self.is_human() {
            return self.data(result);
        }

        if result.valid && result.warning_count == 0 {
            return self.styled("✓ Mapping is valid", true);
        }
        let headline = format!(
            "{} {} error(s), {} warning(s)",
            if result.valid { "✓" } else { "✗" },
            result.error_count,
            result.warning_count
        );
        self.styled(&headline, result.valid)?;
        for error in &result.errors {
            let tag = match error.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            let tag = if self.use_color {
                match error.severity {
                    Severity::Error => tag.red().bold().to_string(),
                    Severity::Warning => tag.yellow().bold().to_string(),
                }
            } else {
                tag.to_string()
            };
            self.writeln(&format!("  {} [{}] {}", tag, error.target_field, error.message))?;
        }
        Ok(())
    }

    /// Write a pipeline run
    pub fn transformation_result(&mut self, result: &TransformationResult, dry_run: bool) -> Result<()> {
        if !self.is_human() {
            return self.data(result);
        }

        let failed = result.failed_rules().count();
        let mode = if dry_run { " (dry run)" } else { "" };
        if result.success {
            self.styled(
                &format!("✓ {} rule(s) applied{}", result.rule_results.len(), mode),
                true,
            )?;
        } else if result.rule_results.is_empty() {
            self.styled("✗ Rules rejected, nothing was executed", false)?;
        } else {
            self.styled(
                &format!(
                    "✗ {} of {} rule(s) failed{}",
                    failed,
                    result.rule_results.len(),
                    mode
                ),
                false,
            )?;
        }

        if !result.rule_results.is_empty() && !self.quiet {
            self.section("Rules")?;
            for rule in &result.rule_results {
                let status = if rule.success { "ok" } else { "failed" };
                let status = match (self.use_color, rule.success) {
                    (true, true) => status.green().to_string(),
                    (true, false) => status.red().to_string(),
                    (false, _) => status.to_string(),
                };
                let detail = match (&rule.output, &rule.error) {
                    (Some(output), _) => format!("→ {}", output),
                    (None, Some(error)) => error.clone(),
                    (None, None) => String::new(),
                };
                self.writeln(&format!(
                    "  {:<6} {} ({}, {}ms) {}",
                    status, rule.rule_id, rule.rule_type, rule.duration_ms, detail
                ))?;
            }
        }

        if !result.errors.is_empty() && (result.rule_results.is_empty() || self.quiet) {
            for error in &result.errors {
                self.writeln(&format!("  • {}", error))?;
            }
        }

        self.section("Record")?;
        let record = serde_json::to_string_pretty(&result.result)?;
        self.writeln(&record)
    }
}

fn tree_lines(node: &FieldNode, depth: usize, lines: &mut Vec<String>) {
    let marker = if node.required { " *" } else { "" };
    lines.push(format!(
        "{}{}: {}{}  ({})",
        "  ".repeat(depth + 1),
        node.name,
        node.field_type,
        marker,
        node.path
    ));
    for child in &node.children {
        tree_lines(child, depth + 1, lines);
    }
}
