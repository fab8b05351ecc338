use thiserror::Error;

use crate::core::sandbox::EvalError;

pub type KpiResult<T> = Result<T, KpiError>;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Formula is empty or matched the deny-list. Never reaches the sandbox.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The sandbox could not compute the resolved expression.
    #[error("Formula evaluation error: {0}")]
    Evaluation(String),

    /// A CLI calculation finished with `success = false`.
    #[error("Calculation failed: {0}")]
    Calculation(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Record source error: {0}")]
    RecordSource(String),

    #[error("Execution log error: {0}")]
    ExecutionLog(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<EvalError> for KpiError {
    fn from(e: EvalError) -> Self {
        KpiError::Evaluation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_prefixes() {
        let err = KpiError::Validation("Formula cannot be empty".to_string());
        assert_eq!(err.to_string(), "Validation error: Formula cannot be empty");

        let err = KpiError::NotFound("KPI 'churn'".to_string());
        assert_eq!(err.to_string(), "Not found: KPI 'churn'");
    }

    #[test]
    fn test_eval_error_converts_to_evaluation() {
        let err: KpiError = EvalError::new("Undefined symbol x").into();
        assert!(matches!(err, KpiError::Evaluation(_)));
        assert!(err.to_string().contains("Undefined symbol x"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.yaml");
        let err: KpiError = io.into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
