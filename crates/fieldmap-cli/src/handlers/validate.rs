//! Mapping validation command handler

use super::utils::{load_field_tree, read_structured};
use crate::cli::ValidateArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::OutputWriter;
use fieldmap_core::{validate_mapping, Connection};
use tracing::{info, instrument};

/// Handle the validate command
#[instrument(skip_all, fields(source = %args.source.display(), target = %args.target.display()))]
pub fn handle_validate(
    args: ValidateArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    let _timer = Timer::new("validate_command");
    let options = config.engine.parse_options();

    let source = load_field_tree(&args.source, &options)?;
    let target = load_field_tree(&args.target, &options)?;
    let connections: Vec<Connection> = read_structured(&args.connections)?;
    output.info(&format!(
        "Validating {} connection(s) from {} to {}",
        connections.len(),
        args.source.display(),
        args.target.display()
    ))?;

    let result = validate_mapping(&source, &target, &connections);
    info!(
        valid = result.valid,
        errors = result.error_count,
        warnings = result.warning_count,
        "mapping validated"
    );
    output.validation_result(&result)?;

    if result.valid {
        Ok(())
    } else {
        Err(Error::MappingInvalid {
            count: result.error_count,
        })
    }
}
