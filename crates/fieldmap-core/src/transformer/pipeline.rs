//! Transformation pipeline implementation
//!
//! Rules are validated up front, ordered by `order` (stable on ties) and run
//! one at a time against a working copy of the input record. A failing rule
//! is recorded and the run moves on; a dry run computes every output without
//! writing any of them.
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

use super::functions::apply_builtin;
use super::lookup::{lookup_key, LookupStore};
use super::types::{parse_config, CustomConfig, LookupConfig, TransformError, TransformKind};
use crate::config::EngineConfig;
use crate::sandbox::{SandboxLimits, ScriptSandbox};
use crate::types::TransformationRule;
use crate::validation::validate_rules;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// A flat record keyed by field name
pub type Record = Map<String, Value>;

/// Collaborators and limits available to a pipeline run
#[derive(Clone)]
pub struct TransformationContext {
    lookup_store: Option<Arc<dyn LookupStore>>,
    lookup_timeout: Duration,
    sandbox: ScriptSandbox,
}

impl Default for TransformationContext {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl fmt::Debug for TransformationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationContext")
            .field("lookup_store", &self.lookup_store.is_some())
            .field("lookup_timeout", &self.lookup_timeout)
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

impl TransformationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits taken from an engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            lookup_store: None,
            lookup_timeout: config.lookup_timeout(),
            sandbox: ScriptSandbox::new(SandboxLimits::from(&config.sandbox)),
        }
    }

    pub fn with_lookup_store(mut self, store: Arc<dyn LookupStore>) -> Self {
        self.lookup_store = Some(store);
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_sandbox_limits(mut self, limits: SandboxLimits) -> Self {
        self.sandbox = ScriptSandbox::new(limits);
        self
    }

    pub fn sandbox(&self) -> &ScriptSandbox {
        &self.sandbox
    }
}

/// Per-run switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineOptions {
    /// Compute outputs without writing them to the record
    pub dry_run: bool,
}

impl PipelineOptions {
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// What happened to one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule_id: String,
    pub rule_type: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResult {
    /// True iff no rule failed and validation passed
    pub success: bool,
    /// Working record, or the untouched input on a dry run
    pub result: Record,
    pub errors: Vec<String>,
    pub rule_results: Vec<RuleResult>,
}

impl TransformationResult {
    pub fn failed_rules(&self) -> impl Iterator<Item = &RuleResult> {
        self.rule_results.iter().filter(|r| !r.success)
    }
}

/// Run `rules` against `record`
///
/// Never returns an error: rule validation failures abort the run before any
/// rule executes and are reported in `errors`, and per-rule failures are
/// recorded in `rule_results` while the remaining rules still run.
#[instrument(skip_all, fields(rules = rules.len(), dry_run = options.dry_run))]
pub async fn apply_transformations(
    record: &Record,
    rules: &[TransformationRule],
    context: &TransformationContext,
    options: PipelineOptions,
) -> TransformationResult {
    let validation_errors = validate_rules(rules);
    if !validation_errors.is_empty() {
        warn!(count = validation_errors.len(), "rule validation failed, nothing executed");
        return TransformationResult {
            success: false,
            result: record.clone(),
            errors: validation_errors,
            rule_results: Vec::new(),
        };
    }

    let mut ordered: Vec<&TransformationRule> = rules.iter().collect();
    ordered.sort_by_key(|rule| rule.order);

    let mut working = record.clone();
    let mut errors = Vec::new();
    let mut rule_results = Vec::with_capacity(ordered.len());

    for rule in ordered {
        let input = resolve_input(&working, &rule.source_fields);
        let started = Instant::now();
        let outcome = match rule.kind() {
            Some(kind) => execute_rule(kind, &input, &rule.config, context).await,
            None => Err(TransformError::UnknownKind {
                kind: rule.rule_type.clone(),
            }),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                debug!(rule = %rule.id, kind = %rule.rule_type, duration_ms, "rule applied");
                if !options.dry_run {
                    working.insert(rule.target_field.clone(), output.clone());
                }
                rule_results.push(RuleResult {
                    rule_id: rule.id.clone(),
                    rule_type: rule.rule_type.clone(),
                    success: true,
                    output: Some(output),
                    error: None,
                    duration_ms,
                });
            }
            Err(error) => {
                warn!(rule = %rule.id, kind = %rule.rule_type, error = %error, "rule failed");
                errors.push(format!("Rule {} ({}): {}", rule.id, rule.rule_type, error));
                rule_results.push(RuleResult {
                    rule_id: rule.id.clone(),
                    rule_type: rule.rule_type.clone(),
                    success: false,
                    output: None,
                    error: Some(error.to_string()),
                    duration_ms,
                });
            }
        }
    }

    info!(
        executed = rule_results.len(),
        failed = errors.len(),
        dry_run = options.dry_run,
        "transformation run finished"
    );

    TransformationResult {
        success: errors.is_empty(),
        result: if options.dry_run { record.clone() } else { working },
        errors,
        rule_results,
    }
}

/// A single source field yields its value; several yield an ordered array
fn resolve_input(record: &Record, source_fields: &[String]) -> Value {
    let read = |name: &String| record.get(name).cloned().unwrap_or(Value::Null);
    match source_fields {
        [single] => read(single),
        many => Value::Array(many.iter().map(read).collect()),
    }
}

/// Execute one transform, awaiting the store or sandbox when needed
pub async fn execute_rule(
    kind: TransformKind,
    input: &Value,
    config: &Value,
    context: &TransformationContext,
) -> Result<Value, TransformError> {
    match kind {
        TransformKind::Lookup => {
            let config: LookupConfig = parse_config(kind, config)?;
            lookup(input, &config, context).await
        }
        TransformKind::Custom => {
            let config: CustomConfig = parse_config(kind, config)?;
            Ok(context.sandbox.execute(&config.code, input).await?)
        }
        _ => apply_builtin(kind, input, config),
    }
}

async fn lookup(
    input: &Value,
    config: &LookupConfig,
    context: &TransformationContext,
) -> Result<Value, TransformError> {
    let Some(store) = &context.lookup_store else {
        return Err(TransformError::NoLookupStore {
            table: config.table_name.clone(),
        });
    };

    let found = tokio::time::timeout(context.lookup_timeout, store.lookup(&config.table_name, input))
        .await
        .map_err(|_| TransformError::LookupTimeout {
            table: config.table_name.clone(),
            timeout_ms: context.lookup_timeout.as_millis() as u64,
        })?
        .map_err(|e| TransformError::Lookup {
            message: e.to_string(),
        })?;

    match (found, &config.default_value) {
        (Some(value), _) => Ok(value),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(TransformError::LookupMiss {
            input: lookup_key(input),
            table: config.table_name.clone(),
        }),
    }
}

/// An ordered set of rules bound to an execution context
#[derive(Debug, Clone, Default)]
pub struct TransformationPipeline {
    rules: Vec<TransformationRule>,
    context: TransformationContext,
}

impl TransformationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: TransformationContext) -> Self {
        self.context = context;
        self
    }

    pub fn add_rule(mut self, rule: TransformationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn add_rules<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = TransformationRule>,
    {
        self.rules.extend(rules);
        self
    }

    pub fn rules(&self) -> &[TransformationRule] {
        &self.rules
    }

    pub async fn run(&self, record: &Record, options: PipelineOptions) -> TransformationResult {
        apply_transformations(record, &self.rules, &self.context, options).await
    }
}
