//! Expression sandbox
//!
//! An allow-listed arithmetic engine: tokenizer, recursive descent parser and
//! AST evaluator over `f64`. There is no string type, no member access, no
//! assignment and no way to reach parsing or compilation from inside an
//! expression, so the only thing an expression can do is compute a number.
//!
//! A [`Sandbox`] is immutable once built. The process-wide instance returned by
//! [`Sandbox::shared`] is built on first use and shared by every evaluation.
//! Evaluations keep no state between calls: each one tokenizes and parses its
//! own expression and only borrows the scope it is given.

pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod tokenizer;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use tracing::trace;

pub use evaluator::{EvalContext, EvalError};
pub use functions::{FunctionRegistry, FunctionSpec, DISABLED_CAPABILITIES};
pub use parser::{Expr, ParseError, DEFAULT_MAX_DEPTH};
pub use tokenizer::{Token, TokenizeError};

use crate::config::{EngineConfig, NumericConfig};
use crate::error::{KpiError, KpiResult};

/// Identifier → value bindings for one evaluation
pub type EvaluationScope = HashMap<String, f64>;

/// Default maximum expression length, in characters
pub const DEFAULT_MAX_EXPRESSION_LENGTH: usize = 4096;

static SHARED: LazyLock<Arc<Sandbox>> = LazyLock::new(|| Arc::new(Sandbox::builder().build()));

/// Capability-restricted expression engine
#[derive(Debug, Clone)]
pub struct Sandbox {
    functions: FunctionRegistry,
    numeric: NumericConfig,
    max_expression_length: usize,
    max_depth: usize,
}

impl Sandbox {
    /// The process-wide sandbox with default configuration
    pub fn shared() -> Arc<Sandbox> {
        Arc::clone(&SHARED)
    }

    pub fn builder() -> SandboxBuilder {
        SandboxBuilder::default()
    }

    /// Build a sandbox from the limits in an engine configuration
    pub fn from_config(config: &EngineConfig) -> Sandbox {
        Sandbox::builder()
            .numeric(config.numeric)
            .max_expression_length(config.max_expression_length)
            .max_depth(config.max_depth)
            .build()
    }

    /// Evaluate a placeholder-free expression against `scope`
    pub fn evaluate(&self, expression: &str, scope: &EvaluationScope) -> Result<f64, EvalError> {
        let ast = self.compile(expression)?;
        let ctx = EvalContext {
            scope,
            functions: &self.functions,
            numeric: &self.numeric,
        };
        let value = evaluator::evaluate(&ast, &ctx)?;
        trace!(expression, value, "sandbox evaluation");
        Ok(value)
    }

    /// Tokenize and parse an expression without evaluating it
    pub fn compile(&self, expression: &str) -> Result<Expr, EvalError> {
        let length = expression.chars().count();
        if length > self.max_expression_length {
            return Err(EvalError::new(format!(
                "Expression is too long ({} characters, limit {})",
                length, self.max_expression_length
            )));
        }
        let tokens = tokenizer::tokenize(expression)?;
        Ok(parser::Parser::with_max_depth(tokens, self.max_depth).parse()?)
    }

    pub fn numeric(&self) -> &NumericConfig {
        &self.numeric
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox::builder().build()
    }
}

/// Builder for a [`Sandbox`]. Starts from the built-in allow-list.
#[derive(Debug, Clone)]
pub struct SandboxBuilder {
    functions: FunctionRegistry,
    numeric: NumericConfig,
    max_expression_length: usize,
    max_depth: usize,
}

impl Default for SandboxBuilder {
    fn default() -> Self {
        Self {
            functions: FunctionRegistry::with_builtins(),
            numeric: NumericConfig::default(),
            max_expression_length: DEFAULT_MAX_EXPRESSION_LENGTH,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SandboxBuilder {
    pub fn numeric(mut self, numeric: NumericConfig) -> Self {
        self.numeric = numeric;
        self
    }

    pub fn max_expression_length(mut self, max: usize) -> Self {
        self.max_expression_length = max;
        self
    }

    pub fn max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    /// Allow an additional function. Disabled capability names are refused.
    pub fn function(mut self, spec: FunctionSpec) -> KpiResult<Self> {
        self.functions
            .register(spec)
            .map_err(|e| KpiError::Sandbox(e.message))?;
        Ok(self)
    }

    /// Remove a built-in from the allow-list
    pub fn without_function(mut self, name: &str) -> Self {
        self.functions.remove(name);
        self
    }

    pub fn build(self) -> Sandbox {
        Sandbox {
            functions: self.functions,
            numeric: self.numeric,
            max_expression_length: self.max_expression_length,
            max_depth: self.max_depth,
        }
    }
}
