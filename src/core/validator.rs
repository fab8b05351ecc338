//! Formula validation
//!
//! Two gates, in order:
//!
//! 1. Static checks on the raw formula text, placeholders included: empty,
//!    too long, or matching a forbidden pattern.
//! 2. A dry run through [`RecordEvaluator::evaluate`] with every placeholder
//!    bound to the sentinel value. The dry run uses the exact evaluation path
//!    real records take.
//!
//! The deny-list is independent of the sandbox allow-list and is applied
//! whatever the sandbox configuration.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use super::placeholder::extract_placeholders;
use super::record_evaluator::RecordEvaluator;
use crate::config::EngineConfig;
use crate::error::{KpiError, KpiResult};
use crate::types::{Record, RecordValue, ValidationResult};

/// A deny-listed textual idiom
#[derive(Debug, Clone)]
pub struct ForbiddenPattern {
    pub label: String,
    regex: Regex,
}

impl ForbiddenPattern {
    pub fn new(label: impl Into<String>, pattern: &str) -> KpiResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| KpiError::Config(format!("invalid forbidden pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            label: label.into(),
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// (label, case-insensitive regex)
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    // dynamic code loading / execution
    ("eval", r"(?i)\beval\b"),
    ("Function", r"(?i)\bFunction\b"),
    ("new", r"(?i)\bnew\s+[a-z_$]"),
    ("import", r"(?i)\bimport\b"),
    ("require", r"(?i)\brequire\b"),
    ("setTimeout", r"(?i)\bsetTimeout\b"),
    ("setInterval", r"(?i)\bsetInterval\b"),
    // process / global objects
    ("process", r"(?i)\bprocess\b"),
    ("global", r"(?i)\bglobal(this)?\b"),
    ("__proto__", r"(?i)__proto__"),
    ("constructor", r"(?i)constructor"),
    ("prototype", r"(?i)prototype"),
    // filesystem / network
    ("fs", r"(?i)\bfs\b"),
    ("http", r"(?i)\bhttps?\b"),
    ("fetch", r"(?i)\bfetch\b"),
    ("XMLHttpRequest", r"(?i)XMLHttpRequest"),
    ("WebSocket", r"(?i)WebSocket"),
    // process spawning
    ("child_process", r"(?i)child_process"),
    ("exec", r"(?i)\bexec(sync)?\b"),
    ("spawn", r"(?i)\bspawn(sync)?\b"),
];

static BUILTIN_DENY_LIST: LazyLock<Vec<ForbiddenPattern>> = LazyLock::new(|| {
    BUILTIN_PATTERNS
        .iter()
        .map(|(label, pattern)| {
            ForbiddenPattern::new(*label, pattern)
                .expect("built-in forbidden patterns are valid regexes")
        })
        .collect()
});

/// Validates formulas before they are run against real data
#[derive(Debug, Clone)]
pub struct FormulaValidator {
    extra_patterns: Vec<ForbiddenPattern>,
    max_formula_length: usize,
    sentinel_value: f64,
}

impl Default for FormulaValidator {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            extra_patterns: Vec::new(),
            max_formula_length: config.max_formula_length,
            sentinel_value: config.sentinel_value,
        }
    }
}

impl FormulaValidator {
    pub fn new(config: &EngineConfig) -> KpiResult<Self> {
        let extra_patterns = config
            .extra_forbidden_patterns
            .iter()
            .map(|pattern| ForbiddenPattern::new(pattern.clone(), pattern))
            .collect::<KpiResult<Vec<_>>>()?;
        Ok(Self {
            extra_patterns,
            max_formula_length: config.max_formula_length,
            sentinel_value: config.sentinel_value,
        })
    }

    /// Label of the first forbidden pattern matching `formula`
    pub fn forbidden_match(&self, formula: &str) -> Option<&str> {
        BUILTIN_DENY_LIST
            .iter()
            .chain(self.extra_patterns.iter())
            .find(|p| p.is_match(formula))
            .map(|p| p.label.as_str())
    }

    /// Checks that need no evaluation: empty, too long, forbidden
    pub fn check_static(&self, formula: &str) -> KpiResult<()> {
        if formula.trim().is_empty() {
            return Err(KpiError::Validation("Formula cannot be empty".to_string()));
        }

        let length = formula.chars().count();
        if length > self.max_formula_length {
            return Err(KpiError::Validation(format!(
                "Formula is too long ({} characters, limit {})",
                length, self.max_formula_length
            )));
        }

        if let Some(label) = self.forbidden_match(formula) {
            warn!(pattern = label, "formula rejected by deny-list");
            return Err(KpiError::Validation(format!(
                "Formula contains forbidden pattern: {}",
                label
            )));
        }

        Ok(())
    }

    /// Record binding every placeholder of `formula` to the sentinel value
    pub fn sentinel_record(&self, formula: &str) -> Record {
        extract_placeholders(formula)
            .into_iter()
            .map(|field| (field, RecordValue::Number(self.sentinel_value)))
            .collect()
    }

    /// Full validation: static checks, then one dry run
    pub fn validate(&self, formula: &str, evaluator: &RecordEvaluator) -> ValidationResult {
        if let Err(e) = self.check_static(formula) {
            return ValidationResult::invalid(validation_message(e));
        }

        let parsed_variables = extract_placeholders(formula);
        let sample = self.sentinel_record(formula);

        match evaluator.evaluate(formula, &sample) {
            Ok(value) => {
                debug!(value, variables = parsed_variables.len(), "dry run passed");
                ValidationResult::valid(parsed_variables)
            }
            Err(e) => {
                debug!(error = %e, "dry run failed");
                ValidationResult::invalid(validation_message(e))
            }
        }
    }
}

/// Message without the error-kind prefix
fn validation_message(error: KpiError) -> String {
    match error {
        KpiError::Validation(msg) | KpiError::Evaluation(msg) => msg,
        other => other.to_string(),
    }
}
