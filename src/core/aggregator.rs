//! Record-set aggregation
//!
//! Sums the per-record values of a formula. A record whose evaluation fails,
//! or whose value is not finite, is skipped and never poisons the total. When
//! every record is skipped the sum is `0`.

use tracing::{debug, info};

use super::record_evaluator::RecordEvaluator;
use crate::types::{Record, RecordOutcome};

/// Sum of a formula over a record set, with per-record outcomes
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub sum: f64,
    /// Records that were fed in, skipped ones included
    pub input_record_count: usize,
    /// Records whose value went into `sum`
    pub counted: usize,
    pub outcomes: Vec<RecordOutcome>,
    /// `Record <id>: <reason>` for every skipped record
    pub diagnostics: Vec<String>,
}

impl Aggregation {
    pub fn skipped(&self) -> usize {
        self.input_record_count - self.counted
    }
}

/// Label used for a record in diagnostics: its `id` field, or its position
pub fn record_label(record: &Record, index: usize) -> String {
    match record.get("id") {
        Some(id) => id.to_string(),
        None => index.to_string(),
    }
}

/// Evaluate and classify one record
pub fn record_outcome(evaluator: &RecordEvaluator, formula: &str, record: &Record) -> RecordOutcome {
    match evaluator.evaluate(formula, record) {
        Ok(value) if value.is_finite() => RecordOutcome::Value(value),
        Ok(value) => RecordOutcome::Skipped {
            reason: format!("non-finite result ({})", value),
        },
        Err(e) => RecordOutcome::Skipped {
            reason: e.to_string(),
        },
    }
}

/// Sum `formula` over `records`, skipping records that fail
pub fn aggregate(
    evaluator: &RecordEvaluator,
    formula: &str,
    records: &[Record],
    collect_diagnostics: bool,
) -> Aggregation {
    let mut sum = 0.0;
    let mut counted = 0;
    let mut outcomes = Vec::with_capacity(records.len());
    let mut diagnostics = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let outcome = record_outcome(evaluator, formula, record);
        match &outcome {
            RecordOutcome::Value(value) => {
                sum += value;
                counted += 1;
            }
            RecordOutcome::Skipped { reason } => {
                let label = record_label(record, index);
                debug!(record = %label, reason = %reason, "record skipped");
                if collect_diagnostics {
                    diagnostics.push(format!("Record {}: {}", label, reason));
                }
            }
        }
        outcomes.push(outcome);
    }

    info!(
        records = records.len(),
        counted,
        skipped = records.len() - counted,
        sum,
        "aggregation complete"
    );

    Aggregation {
        sum,
        input_record_count: records.len(),
        counted,
        outcomes,
        diagnostics,
    }
}
