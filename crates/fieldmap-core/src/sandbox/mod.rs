//! Isolated evaluator for user-supplied script transforms
//!
//! Scripts are written in a small JavaScript-like language and run by a
//! tree-walking interpreter that owns its own value heap. Nothing from the host
//! is reachable: the only bindings in scope are the input (`value`, alias
//! `input`) and a fixed set of pure built-ins (`Math`, `String`, `Number`,
//! `parseInt`, ...).
//!
//! # Isolation
//!
//! - The input crosses into the sandbox as a deep copy and is converted into
//!   interpreter values; mutations never reach the caller's data.
//! - Evaluation runs on a blocking worker thread. The host bounds it with a
//!   wall-clock timeout and, on expiry, raises an interrupt flag the
//!   interpreter polls; the caller gets [`SandboxError::Timeout`] immediately.
//! - Every allocation the script causes is charged against a byte budget.
//!   Exceeding it aborts with [`SandboxError::MemoryLimit`].
//!
//! ```
//! use fieldmap_core::sandbox::{ScriptSandbox, SandboxLimits};
//! use serde_json::json;
//!
//! # tokio_test_block(async {
//! let sandbox = ScriptSandbox::new(SandboxLimits::default());
//! let out = sandbox.execute("return value.toUpperCase();", &json!("abc")).await.unwrap();
//! assert_eq!(out, json!("ABC"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! Copyright (c) 2025 Fieldmap Team
//! Licensed under the Apache-2.0 license

pub mod ast;
mod builtins;
pub mod interpreter;
pub mod lexer;
pub mod parser;
mod value;

use crate::config::SandboxConfig;
use interpreter::Interpreter;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Script failures, classified so callers can tell them apart
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// Code does not parse
    #[error("SyntaxError at position {position}: {message}")]
    Syntax { message: String, position: usize },

    /// An identifier that is not in scope
    #[error("ReferenceError: {name} is not defined")]
    Reference { name: String },

    #[error("TypeError: {message}")]
    Type { message: String },

    /// The script executed `throw`
    #[error("Uncaught {message}")]
    Thrown { message: String },

    #[error("Script timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Script exceeded the memory limit of {limit_bytes} bytes")]
    MemoryLimit { limit_bytes: usize },

    /// The worker running the script failed
    #[error("Sandbox failure: {message}")]
    Internal { message: String },
}

impl SandboxError {
    /// Stable machine-readable classification
    pub fn kind(&self) -> &'static str {
        match self {
            SandboxError::Syntax { .. } => "syntax",
            SandboxError::Reference { .. } => "reference",
            SandboxError::Type { .. } => "type",
            SandboxError::Thrown { .. } => "thrown",
            SandboxError::Timeout { .. } => "timeout",
            SandboxError::MemoryLimit { .. } => "memory_limit",
            SandboxError::Internal { .. } => "internal",
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }
}

/// Resource ceilings for one script execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLimits {
    pub timeout: Duration,
    pub memory_limit_bytes: usize,
    /// Syntactic nesting allowed in a script
    pub max_nesting: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        SandboxLimits::from(&SandboxConfig::default())
    }
}

impl From<&SandboxConfig> for SandboxLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            memory_limit_bytes: config.memory_limit_bytes,
            max_nesting: config.max_nesting,
        }
    }
}

/// Compiles and runs scripts under [`SandboxLimits`]
#[derive(Debug, Clone, Default)]
pub struct ScriptSandbox {
    limits: SandboxLimits,
}

impl ScriptSandbox {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Parse `code` without running it
    pub fn compile(&self, code: &str) -> Result<ast::Program, SandboxError> {
        let tokens = lexer::tokenize(code)?;
        parser::Parser::new(tokens, self.limits.max_nesting).parse_program()
    }

    /// Run `code` against a copy of `input` and return its result
    #[instrument(skip(self, code, input), fields(code_len = code.len()))]
    pub async fn execute(&self, code: &str, input: &Value) -> Result<Value, SandboxError> {
        let program = self.compile(code)?;
        let input = input.clone();
        let limits = self.limits.clone();
        let interrupt = Arc::new(AtomicBool::new(false));
        let worker_interrupt = Arc::clone(&interrupt);
        let deadline = Instant::now() + limits.timeout;

        let worker = tokio::task::spawn_blocking(move || {
            Interpreter::new(&limits, worker_interrupt, deadline).run(&program, input)
        });

        let timeout_ms = self.limits.timeout.as_millis() as u64;
        match tokio::time::timeout(self.limits.timeout, worker).await {
            Ok(Ok(outcome)) => {
                if let Err(e) = &outcome {
                    debug!(kind = e.kind(), error = %e, "script failed");
                }
                outcome
            }
            Ok(Err(join_error)) => Err(SandboxError::Internal {
                message: join_error.to_string(),
            }),
            Err(_) => {
                interrupt.store(true, Ordering::Relaxed);
                warn!(timeout_ms, "script interrupted");
                Err(SandboxError::Timeout { timeout_ms })
            }
        }
    }
}

#[cfg(test)]
mod tests;
