//! KPI engine: the public entry points
//!
//! Every operation here returns a value, never panics on user input, and
//! reports failures through [`CalculationResult`], [`ValidationResult`] or
//! [`FormulaTestResult`] rather than by unwinding. Only `aggregate` and
//! `calculate_on_records` return a [`KpiResult`], for callers that want `?`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::core::aggregator::{self, Aggregation};
use crate::core::record_evaluator::RecordEvaluator;
use crate::core::sandbox::{Sandbox, DEFAULT_MAX_DEPTH, DEFAULT_MAX_EXPRESSION_LENGTH};
use crate::core::validator::FormulaValidator;
use crate::error::{KpiError, KpiResult};
use crate::types::{
    CalculationResult, ExecutionLogEntry, FormulaTestResult, KpiDefinition, Record,
    ValidationResult,
};

/// Where KPI definitions and their records come from
pub trait RecordSource {
    /// The KPI `kpi_id` owned by `org_id`
    fn kpi(&self, kpi_id: &str, org_id: &str) -> KpiResult<KpiDefinition>;

    /// Every record of `org_id` the KPI is computed over
    fn records(&self, kpi: &KpiDefinition, org_id: &str) -> KpiResult<Vec<Record>>;
}

/// Sink for one entry per `calculate` run
pub trait ExecutionLog {
    fn record(&self, entry: &ExecutionLogEntry) -> KpiResult<()>;
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Validates and evaluates KPI formulas over record sets
#[derive(Debug, Clone)]
pub struct KpiEngine {
    config: EngineConfig,
    evaluator: RecordEvaluator,
    validator: FormulaValidator,
}

impl Default for KpiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl KpiEngine {
    /// Engine with the default configuration over the shared sandbox
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            evaluator: RecordEvaluator::shared(),
            validator: FormulaValidator::default(),
        }
    }

    /// Engine with a custom configuration.
    ///
    /// The shared sandbox is reused unless the configuration changes its
    /// numeric behaviour or limits.
    pub fn with_config(config: EngineConfig) -> KpiResult<Self> {
        config.check()?;

        let default_sandbox = config.numeric == EngineConfig::default().numeric
            && config.max_expression_length == DEFAULT_MAX_EXPRESSION_LENGTH
            && config.max_depth == DEFAULT_MAX_DEPTH;
        let sandbox = if default_sandbox {
            Sandbox::shared()
        } else {
            Arc::new(Sandbox::from_config(&config))
        };

        Ok(Self {
            validator: FormulaValidator::new(&config)?,
            evaluator: RecordEvaluator::new(sandbox),
            config,
        })
    }

    /// Engine over a caller-built sandbox, e.g. one with extra functions
    pub fn with_sandbox(config: EngineConfig, sandbox: Arc<Sandbox>) -> KpiResult<Self> {
        config.check()?;
        Ok(Self {
            validator: FormulaValidator::new(&config)?,
            evaluator: RecordEvaluator::new(sandbox),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &RecordEvaluator {
        &self.evaluator
    }

    /// Check a formula before it is ever run over real data
    pub fn validate_formula(&self, formula: &str) -> ValidationResult {
        self.validator.validate(formula, &self.evaluator)
    }

    /// Preview a formula against one sample record
    pub fn test_formula(&self, formula: &str, sample: &Record) -> FormulaTestResult {
        let validation = self.validate_formula(formula);
        if !validation.valid {
            return FormulaTestResult::failed(validation.error.unwrap_or_default());
        }

        match self.evaluator.evaluate(formula, sample) {
            Ok(value) if value.is_finite() => FormulaTestResult::passed(value),
            Ok(value) => FormulaTestResult::failed(format!(
                "Formula produced a non-finite result ({})",
                value
            )),
            Err(e) => FormulaTestResult::failed(e.to_string()),
        }
    }

    /// Sum `formula` over `records` with per-record outcomes.
    ///
    /// Fails when the formula itself is rejected by the static checks, or when
    /// finite record values add up past the range of `f64`. Record-level
    /// failures are skipped and listed in the diagnostics.
    pub fn aggregate(&self, formula: &str, records: &[Record]) -> KpiResult<Aggregation> {
        self.validator.check_static(formula)?;
        let agg = aggregator::aggregate(
            &self.evaluator,
            formula,
            records,
            self.config.collect_diagnostics,
        );
        if !agg.sum.is_finite() {
            warn!(counted = agg.counted, sum = agg.sum, "aggregate overflowed");
            return Err(KpiError::Calculation(format!(
                "Aggregate overflowed to {} over {} records",
                agg.sum, agg.counted
            )));
        }
        Ok(agg)
    }

    /// Aggregate value of `formula` over `records`
    pub fn calculate_on_records(&self, formula: &str, records: &[Record]) -> KpiResult<f64> {
        self.aggregate(formula, records).map(|agg| agg.sum)
    }

    /// Timed aggregation packaged as a [`CalculationResult`]
    pub fn calculate_records(&self, formula: &str, records: &[Record]) -> CalculationResult {
        let start = Instant::now();
        self.finish(formula, records, start)
    }

    fn finish(&self, formula: &str, records: &[Record], start: Instant) -> CalculationResult {
        match self.aggregate(formula, records) {
            Ok(agg) => CalculationResult::succeeded(
                agg.sum,
                agg.input_record_count,
                elapsed_ms(start),
                agg.diagnostics,
            ),
            Err(e) => CalculationResult::failed(e.to_string(), records.len(), elapsed_ms(start)),
        }
    }

    /// Compute a stored KPI for an organization and log the run.
    ///
    /// Fetch failures and unknown KPIs become a failed result. A failure of
    /// the execution log is reported with `warn!` and leaves the result as is.
    pub fn calculate(
        &self,
        kpi_id: &str,
        org_id: &str,
        user_id: &str,
        source: &dyn RecordSource,
        log: &dyn ExecutionLog,
    ) -> CalculationResult {
        let start = Instant::now();

        let kpi = match source.kpi(kpi_id, org_id) {
            Ok(kpi) => kpi,
            Err(e) => {
                debug!(kpi_id, org_id, error = %e, "KPI lookup failed");
                return CalculationResult::failed(e.to_string(), 0, elapsed_ms(start));
            }
        };

        let result = match source.records(&kpi, org_id) {
            Ok(records) => self.finish(&kpi.formula, &records, start),
            Err(e) => CalculationResult::failed(e.to_string(), 0, elapsed_ms(start)),
        };

        info!(
            kpi_id,
            org_id,
            user_id,
            success = result.success,
            records = result.input_record_count,
            "KPI calculated"
        );

        let entry = ExecutionLogEntry {
            id: Uuid::new_v4().to_string(),
            kpi_id: kpi.id.clone(),
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            formula: kpi.formula.clone(),
            success: result.success,
            value: result.value,
            input_record_count: result.input_record_count,
            execution_time_ms: result.execution_time_ms,
            error: result.error.clone(),
            executed_at: Utc::now(),
        };
        if let Err(e) = log.record(&entry) {
            warn!(kpi_id, error = %e, "failed to record KPI execution");
        }

        result
    }
}
