//! Core formula engine: sandbox, placeholder resolution, validation and aggregation

pub mod aggregator;
pub mod placeholder;
pub mod record_evaluator;
pub mod sandbox;
pub mod validator;

pub use aggregator::{aggregate, Aggregation};
pub use placeholder::{extract_placeholders, resolve, ResolvedFormula};
pub use record_evaluator::RecordEvaluator;
pub use sandbox::{EvaluationScope, Sandbox, SandboxBuilder};
pub use validator::FormulaValidator;
