//! Parse command handler

use super::utils::parse_schema_file;
use crate::cli::ParseArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::OutputWriter;
use fieldmap_core::ParseOptions;
use tracing::{info, instrument};

/// Handle the parse command
#[instrument(skip_all, fields(file = %args.file.display()))]
pub fn handle_parse(args: ParseArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let _timer = Timer::with_details("parse_command", &args.file.display().to_string());
    let options = args
        .max_depth
        .map(ParseOptions::with_max_depth)
        .unwrap_or_else(|| config.engine.parse_options());
    output.info(&format!("Parsing {}", args.file.display()))?;

    let result = parse_schema_file(&args.file, args.format.map(Into::into), &options)?;
    output.parser_result(&args.file.display().to_string(), &result)?;

    if !result.success {
        return Err(Error::ParseFailed {
            path: args.file,
            errors: result.errors,
        });
    }
    info!(
        roots = result.field_nodes.len(),
        format = ?result.parser_type,
        "parse finished"
    );
    Ok(())
}
