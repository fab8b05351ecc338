//! Engine configuration
//!
//! Every field has a default, so an empty YAML document is a valid config:
//!
//! ```yaml
//! numeric:
//!   epsilon: 1.0e-12
//!   precision: 15
//! sentinel_value: 100
//! max_formula_length: 2000
//! extra_forbidden_patterns:
//!   - "\\bsystem\\b"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::sandbox::parser::MAX_DEPTH_LIMIT;
use crate::core::sandbox::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_EXPRESSION_LENGTH};
use crate::error::{KpiError, KpiResult};

/// Fixed numeric behaviour of the sandbox
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericConfig {
    /// Relative tolerance for equality and ordering comparisons
    pub epsilon: f64,
    /// Largest number of decimals `round(x, n)` accepts
    pub precision: u32,
}

impl Default for NumericConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-12,
            precision: 15,
        }
    }
}

/// Configuration for a [`crate::engine::KpiEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub numeric: NumericConfig,
    /// Value bound to every placeholder during a validation dry run
    pub sentinel_value: f64,
    /// Longest raw formula the validator accepts, in characters
    pub max_formula_length: usize,
    /// Longest resolved expression the sandbox accepts, in characters
    pub max_expression_length: usize,
    /// Deepest expression nesting the sandbox parses
    pub max_depth: usize,
    /// Regexes rejected in addition to the built-in deny-list
    pub extra_forbidden_patterns: Vec<String>,
    /// Keep a per-record message for every skipped record
    pub collect_diagnostics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            numeric: NumericConfig::default(),
            sentinel_value: 100.0,
            max_formula_length: 2000,
            max_expression_length: DEFAULT_MAX_EXPRESSION_LENGTH,
            max_depth: DEFAULT_MAX_DEPTH,
            extra_forbidden_patterns: Vec::new(),
            collect_diagnostics: true,
        }
    }
}

impl EngineConfig {
    /// Load a YAML config file
    pub fn from_path(path: &Path) -> KpiResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML config document and check its values
    pub fn from_yaml(content: &str) -> KpiResult<Self> {
        let config: EngineConfig = if content.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.check()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn check(&self) -> KpiResult<()> {
        if !(self.numeric.epsilon.is_finite() && self.numeric.epsilon >= 0.0) {
            return Err(KpiError::Config(format!(
                "numeric.epsilon must be a non-negative number, got {}",
                self.numeric.epsilon
            )));
        }
        if self.numeric.precision > 15 {
            return Err(KpiError::Config(format!(
                "numeric.precision must be at most 15, got {}",
                self.numeric.precision
            )));
        }
        if !self.sentinel_value.is_finite() {
            return Err(KpiError::Config(
                "sentinel_value must be a finite number".to_string(),
            ));
        }
        if self.max_formula_length == 0 || self.max_expression_length == 0 || self.max_depth == 0 {
            return Err(KpiError::Config(
                "length and depth limits must be greater than zero".to_string(),
            ));
        }
        if self.max_depth > MAX_DEPTH_LIMIT {
            return Err(KpiError::Config(format!(
                "max_depth must be at most {}, got {}",
                MAX_DEPTH_LIMIT, self.max_depth
            )));
        }
        for pattern in &self.extra_forbidden_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                KpiError::Config(format!("invalid forbidden pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}
