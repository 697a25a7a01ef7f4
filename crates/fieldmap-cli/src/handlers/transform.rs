//! Transform command handler

use super::utils::read_structured;
use crate::cli::TransformArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::OutputWriter;
use fieldmap_core::transformer::types::json_type_name;
use fieldmap_core::{
    InMemoryLookupStore, PipelineOptions, Record, TransformationContext, TransformationPipeline,
    TransformationRule,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Handle the transform command
#[instrument(skip_all, fields(record = %args.record.display(), rules = %args.rules.display(), dry_run = args.dry_run))]
pub async fn handle_transform(
    args: TransformArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    let _timer = Timer::new("transform_command");

    let record = load_record(&args.record)?;
    let rules: Vec<TransformationRule> = read_structured(&args.rules)?;

    let mut context = TransformationContext::from_config(&config.engine);
    if let Some(path) = &args.lookup {
        let store = load_lookup_store(path)?;
        debug!(tables = ?store.table_names(), "lookup tables loaded");
        context = context.with_lookup_store(Arc::new(store));
    }

    output.info(&format!(
        "Applying {} rule(s) to {}",
        rules.len(),
        args.record.display()
    ))?;
    let options = PipelineOptions {
        dry_run: args.dry_run,
    };
    let result = TransformationPipeline::new()
        .with_context(context)
        .add_rules(rules)
        .run(&record, options)
        .await;
    info!(
        success = result.success,
        errors = result.errors.len(),
        "transformation finished"
    );
    output.transformation_result(&result, args.dry_run)?;

    if result.success {
        Ok(())
    } else {
        Err(Error::TransformFailed {
            count: result.errors.len(),
        })
    }
}

fn load_record(path: &Path) -> Result<Record> {
    match read_structured::<Value>(path)? {
        Value::Object(record) => Ok(record),
        other => Err(Error::InvalidFormat {
            path: path.to_path_buf(),
            expected: "object".to_string(),
            message: format!("record must be an object, found {}", json_type_name(&other)),
        }),
    }
}

fn load_lookup_store(path: &Path) -> Result<InMemoryLookupStore> {
    let document: Value = read_structured(path)?;
    InMemoryLookupStore::from_json(&document).map_err(|e| Error::InvalidFormat {
        path: path.to_path_buf(),
        expected: "lookup tables".to_string(),
        message: e.to_string(),
    })
}
