//! File-backed collaborators for the `kpi-forge` CLI
//!
//! A workspace file holds KPI definitions and the records of each
//! organization:
//!
//! ```yaml
//! kpis:
//!   - id: revenue
//!     org_id: acme
//!     name: Monthly revenue
//!     formula: "{monthlyRate} * 1.15"
//! records:
//!   acme:
//!     - { id: c-1, monthlyRate: 100 }
//!     - { id: c-2, monthlyRate: 250 }
//! ```
//!
//! Files ending in `.json` are read as JSON, everything else as YAML.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::{ExecutionLog, RecordSource};
use crate::error::{KpiError, KpiResult};
use crate::types::{ExecutionLogEntry, KpiDefinition, Record};

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// KPI definitions plus records keyed by organization id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workspace {
    pub kpis: Vec<KpiDefinition>,
    pub records: HashMap<String, Vec<Record>>,
}

impl Workspace {
    pub fn from_path(path: &Path) -> KpiResult<Self> {
        let content = std::fs::read_to_string(path)?;
        if is_json(path) {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_yaml(content: &str) -> KpiResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> KpiResult<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

impl RecordSource for Workspace {
    fn kpi(&self, kpi_id: &str, org_id: &str) -> KpiResult<KpiDefinition> {
        self.kpis
            .iter()
            .find(|kpi| kpi.id == kpi_id && kpi.org_id == org_id)
            .cloned()
            .ok_or_else(|| {
                KpiError::NotFound(format!("KPI '{}' in organization '{}'", kpi_id, org_id))
            })
    }

    fn records(&self, _kpi: &KpiDefinition, org_id: &str) -> KpiResult<Vec<Record>> {
        Ok(self.records.get(org_id).cloned().unwrap_or_default())
    }
}

/// Load a list of records from a JSON or YAML file
pub fn load_records(path: &Path) -> KpiResult<Vec<Record>> {
    let content = std::fs::read_to_string(path)?;
    if is_json(path) {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Load one record from a file, or from inline JSON when `source` starts with `{`
pub fn load_record(source: &str) -> KpiResult<Record> {
    if source.trim_start().starts_with('{') {
        return Ok(serde_json::from_str(source)?);
    }
    let path = Path::new(source);
    let content = std::fs::read_to_string(path)?;
    if is_json(path) {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Writes every execution to the `tracing` log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExecutionLog;

impl ExecutionLog for TracingExecutionLog {
    fn record(&self, entry: &ExecutionLogEntry) -> KpiResult<()> {
        info!(
            id = %entry.id,
            kpi_id = %entry.kpi_id,
            org_id = %entry.org_id,
            user_id = %entry.user_id,
            success = entry.success,
            value = ?entry.value,
            records = entry.input_record_count,
            execution_time_ms = entry.execution_time_ms,
            error = ?entry.error,
            "KPI execution"
        );
        Ok(())
    }
}

/// Keeps every execution in memory
#[derive(Debug, Default)]
pub struct MemoryExecutionLog {
    entries: Mutex<Vec<ExecutionLogEntry>>,
}

impl MemoryExecutionLog {
    pub fn entries(&self) -> Vec<ExecutionLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ExecutionLog for MemoryExecutionLog {
    fn record(&self, entry: &ExecutionLogEntry) -> KpiResult<()> {
        self.entries
            .lock()
            .map_err(|e| KpiError::ExecutionLog(e.to_string()))?
            .push(entry.clone());
        Ok(())
    }
}
