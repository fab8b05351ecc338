use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

//==============================================================================
// Records
//==============================================================================

/// One field value of an untrusted record.
///
/// Deserializes from plain JSON/YAML: RFC 3339 strings become `Date`, other
/// strings stay `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Null,
    Boolean(bool),
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
    List(Vec<RecordValue>),
    Object(BTreeMap<String, RecordValue>),
}

impl From<f64> for RecordValue {
    fn from(n: f64) -> Self {
        RecordValue::Number(n)
    }
}

impl From<i64> for RecordValue {
    fn from(n: i64) -> Self {
        RecordValue::Number(n as f64)
    }
}

impl From<bool> for RecordValue {
    fn from(b: bool) -> Self {
        RecordValue::Boolean(b)
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::Text(s.to_string())
    }
}

impl From<DateTime<Utc>> for RecordValue {
    fn from(d: DateTime<Utc>) -> Self {
        RecordValue::Date(d)
    }
}

impl std::fmt::Display for RecordValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordValue::Null => write!(f, "null"),
            RecordValue::Boolean(b) => write!(f, "{}", b),
            RecordValue::Number(n) => write!(f, "{}", n),
            RecordValue::Date(d) => write!(f, "{}", d.to_rfc3339()),
            RecordValue::Text(s) => write!(f, "{}", s),
            RecordValue::List(items) => write!(f, "[{} items]", items.len()),
            RecordValue::Object(map) => write!(f, "{{{} fields}}", map.len()),
        }
    }
}

/// Field name → value. Never mutated by the engine.
pub type Record = HashMap<String, RecordValue>;

/// Build a record from `(field, value)` pairs
pub fn record<K, V, I>(fields: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<RecordValue>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

//==============================================================================
// Outcomes
//==============================================================================

/// Outcome of one record inside an aggregation
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Finite value added to the aggregate
    Value(f64),
    /// Record left out of the aggregate
    Skipped { reason: String },
}

impl RecordOutcome {
    pub fn is_counted(&self) -> bool {
        matches!(self, RecordOutcome::Value(_))
    }
}

/// Result of aggregating a formula over a full record set.
///
/// `success == false` always comes with `value == None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    pub success: bool,
    pub value: Option<f64>,
    /// Records fed into the computation, skipped ones included
    pub input_record_count: usize,
    pub execution_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `Record <id>: <reason>` for every skipped record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl CalculationResult {
    pub fn succeeded(
        value: f64,
        input_record_count: usize,
        execution_time_ms: f64,
        diagnostics: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            value: Some(value),
            input_record_count,
            execution_time_ms,
            error: None,
            diagnostics,
        }
    }

    pub fn failed(
        error: impl Into<String>,
        input_record_count: usize,
        execution_time_ms: f64,
    ) -> Self {
        Self {
            success: false,
            value: None,
            input_record_count,
            execution_time_ms,
            error: Some(error.into()),
            diagnostics: Vec::new(),
        }
    }
}

/// Whether a formula is safe and usable, independent of any record.
///
/// `valid == true` always comes with `parsed_variables` populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_variables: Option<Vec<String>>,
}

impl ValidationResult {
    pub fn valid(parsed_variables: Vec<String>) -> Self {
        Self {
            valid: true,
            error: None,
            parsed_variables: Some(parsed_variables),
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            parsed_variables: None,
        }
    }
}

/// Preview of a formula against one sample record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaTestResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FormulaTestResult {
    pub fn passed(value: f64) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(error.into()),
        }
    }
}

//==============================================================================
// Collaborator data
//==============================================================================

/// A KPI as stored by the surrounding application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub formula: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One `calculate` run, handed to the execution-log collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub id: String,
    pub kpi_id: String,
    pub org_id: String,
    pub user_id: String,
    pub formula: String,
    pub success: bool,
    pub value: Option<f64>,
    pub input_record_count: usize,
    pub execution_time_ms: f64,
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_value_from_json() {
        let rec: Record = serde_json::from_str(
            r#"{"a": 1.5, "b": "text", "c": null, "d": true, "e": "2024-01-01T00:00:00Z", "f": [1], "g": {"x": 1}}"#,
        )
        .unwrap();
        assert_eq!(rec["a"], RecordValue::Number(1.5));
        assert_eq!(rec["b"], RecordValue::Text("text".to_string()));
        assert_eq!(rec["c"], RecordValue::Null);
        assert_eq!(rec["d"], RecordValue::Boolean(true));
        assert_eq!(
            rec["e"],
            RecordValue::Date(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(rec["f"], RecordValue::List(vec![RecordValue::Number(1.0)]));
        assert!(matches!(rec["g"], RecordValue::Object(_)));
    }

    #[test]
    fn test_record_value_from_yaml() {
        let rec: Record = serde_yaml::from_str("cost: 10\nname: widget\nmissing: ~\n").unwrap();
        assert_eq!(rec["cost"], RecordValue::Number(10.0));
        assert_eq!(rec["name"], RecordValue::Text("widget".to_string()));
        assert_eq!(rec["missing"], RecordValue::Null);
    }

    #[test]
    fn test_record_helper() {
        let rec = record([("cost", 100.0)]);
        assert_eq!(rec.get("cost"), Some(&RecordValue::Number(100.0)));
    }

    #[test]
    fn test_calculation_result_invariants() {
        let failed = CalculationResult::failed("boom", 3, 1.0);
        assert!(!failed.success);
        assert_eq!(failed.value, None);

        let ok = CalculationResult::succeeded(30.0, 3, 1.0, vec![]);
        assert!(ok.success);
        assert_eq!(ok.value, Some(30.0));
    }

    #[test]
    fn test_calculation_result_serializes_camel_case() {
        let result = CalculationResult::succeeded(1.0, 2, 0.5, vec![]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["inputRecordCount"], 2);
        assert_eq!(json["executionTimeMs"], 0.5);
        assert!(json.get("error").is_none());
        assert!(json.get("diagnostics").is_none());
    }

    #[test]
    fn test_validation_result_invariants() {
        let valid = ValidationResult::valid(vec![]);
        assert!(valid.valid);
        assert_eq!(valid.parsed_variables, Some(vec![]));

        let invalid = ValidationResult::invalid("Formula cannot be empty");
        assert!(!invalid.valid);
        assert!(invalid.parsed_variables.is_none());
    }

    #[test]
    fn test_record_value_display() {
        assert_eq!(RecordValue::Null.to_string(), "null");
        assert_eq!(RecordValue::from("abc").to_string(), "abc");
        assert_eq!(RecordValue::from(42_i64).to_string(), "42");
    }
}
