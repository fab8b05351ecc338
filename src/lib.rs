//! KPI Forge - sandboxed KPI formulas over untrusted records
//!
//! Organizations define business formulas such as `{monthlyRate} * 1.15`.
//! Each formula is evaluated against every record of a record set inside an
//! allow-listed expression sandbox, and the per-record values are summed
//! into a single KPI value. Records that fail, or whose value is not finite,
//! are skipped instead of failing the whole calculation.
//!
//! # Features
//!
//! - Allow-listed arithmetic sandbox: no strings, no member access, no
//!   assignment, no dynamic parsing from inside a formula
//! - Deny-list validation with a dry run on the real evaluation path
//! - Lenient numeric coercion of untrusted field values
//! - A process-wide sandbox that is safe to share across threads
//!
//! # Example
//!
//! ```
//! use royalbit_kpi_forge::{record, KpiEngine};
//!
//! let engine = KpiEngine::new();
//! assert!(engine.validate_formula("{monthlyRate} * 1.15").valid);
//!
//! let records = vec![
//!     record([("monthlyRate", 100.0)]),
//!     record([("monthlyRate", 200.0)]),
//! ];
//! let total = engine.calculate_on_records("{monthlyRate} * 2", &records)?;
//! assert_eq!(total, 600.0);
//! # Ok::<(), royalbit_kpi_forge::KpiError>(())
//! ```

pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod types;
pub mod workspace;

// Re-export commonly used types
pub use config::{EngineConfig, NumericConfig};
pub use engine::{ExecutionLog, KpiEngine, RecordSource};
pub use error::{KpiError, KpiResult};
pub use types::{
    record, CalculationResult, ExecutionLogEntry, FormulaTestResult, KpiDefinition, Record,
    RecordOutcome, RecordValue, ValidationResult,
};
