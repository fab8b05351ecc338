//! Per-record formula evaluation

use std::sync::Arc;

use tracing::debug;

use super::placeholder::resolve;
use super::sandbox::Sandbox;
use crate::error::{KpiError, KpiResult};
use crate::types::Record;

/// Evaluates one formula against one record inside a [`Sandbox`].
///
/// Holds no per-call state, so one evaluator can serve any number of threads.
#[derive(Debug, Clone)]
pub struct RecordEvaluator {
    sandbox: Arc<Sandbox>,
}

impl Default for RecordEvaluator {
    fn default() -> Self {
        Self::shared()
    }
}

impl RecordEvaluator {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }

    /// Evaluator over the process-wide sandbox
    pub fn shared() -> Self {
        Self::new(Sandbox::shared())
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Value of `formula` for `record`.
    ///
    /// Non-finite results are returned as-is; deciding what to do with them
    /// is up to the caller. The record is never modified.
    pub fn evaluate(&self, formula: &str, record: &Record) -> KpiResult<f64> {
        let resolved = resolve(formula, record);
        match self.sandbox.evaluate(&resolved.expression, &resolved.scope) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(formula, error = %e, "record evaluation failed");
                Err(KpiError::Evaluation(e.message))
            }
        }
    }
}
