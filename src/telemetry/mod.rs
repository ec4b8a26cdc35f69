//! Append-only, thread-safe ledger of model calls (§4.2).
//!
//! Backed by a single JSON file, replaced atomically on every write via a
//! temp-file-then-rename so a crash mid-write never corrupts the existing
//! log. A process-wide [`CostLedger`] holds the in-flight task id so agent
//! code can log calls without threading it through every function call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ResearchError, Result};
use crate::models::{ApiCallOperation, ApiCallRecord};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    last_updated: Option<chrono::DateTime<Utc>>,
    total_records: usize,
    records: Vec<ApiCallRecord>,
}

struct LedgerState {
    records: Vec<ApiCallRecord>,
    current_task_id: Option<String>,
}

pub struct CostLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SummaryStatistics {
    pub total_calls: usize,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub average_cost_per_call: f64,
    pub cost_by_operation: HashMap<String, f64>,
    pub cost_by_model: HashMap<String, f64>,
}

/// Per-1K-token pricing used to turn a token count into a dollar cost before
/// logging it. Unknown models fall back to the gpt-4o-mini rate.
pub fn estimate_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    let (prompt_rate, completion_rate) = match model {
        "gpt-4o-mini" => (0.00015, 0.0006),
        "gpt-4o" => (0.0025, 0.01),
        "text-embedding-3-small" => (0.00002, 0.0),
        _ => (0.00015, 0.0006),
    };
    (prompt_tokens as f64 / 1000.0) * prompt_rate + (completion_tokens as f64 / 1000.0) * completion_rate
}

impl CostLedger {
    /// Load existing records from `path`, tolerating a missing file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ResearchError::Internal(anyhow::anyhow!(
                    "failed to create telemetry log directory: {e}"
                ))
            })?;
        }

        let records = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<LedgerFile>(&contents) {
                Ok(file) => {
                    info!(count = file.records.len(), "loaded existing cost records");
                    file.records
                }
                Err(e) => {
                    warn!(error = %e, "failed to parse existing cost ledger, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                records,
                current_task_id: None,
            }),
        })
    }

    /// Set the task id subsequent `log_api_call` invocations are tagged with.
    pub fn set_task_id(&self, task_id: impl Into<String>) {
        self.state.lock().unwrap().current_task_id = Some(task_id.into());
    }

    pub fn clear_task_id(&self) {
        self.state.lock().unwrap().current_task_id = None;
    }

    /// Append one record and flush atomically.
    pub fn log_api_call(
        &self,
        model: impl Into<String>,
        prompt_tokens: u32,
        completion_tokens: u32,
        operation: ApiCallOperation,
        cost: f64,
        method: impl Into<String>,
        duration: f64,
    ) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            let record = ApiCallRecord {
                timestamp: Utc::now(),
                task_id: state.current_task_id.clone(),
                model: model.into(),
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                cost,
                operation,
                method: method.into(),
                duration,
            };
            state.records.push(record);
        }
        self.flush()
    }

    fn flush(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        let file = LedgerFile {
            last_updated: Some(Utc::now()),
            total_records: state.records.len(),
            records: state.records.clone(),
        };
        drop(state);

        let contents = serde_json::to_string_pretty(&file)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, contents).map_err(|e| {
            ResearchError::Internal(anyhow::anyhow!("failed to write telemetry temp file: {e}"))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            ResearchError::Internal(anyhow::anyhow!("failed to replace telemetry log: {e}"))
        })?;
        Ok(())
    }

    pub fn total_cost(&self) -> f64 {
        self.state.lock().unwrap().records.iter().map(|r| r.cost).sum()
    }

    pub fn query_cost(&self, task_id: &str) -> f64 {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.task_id.as_deref() == Some(task_id))
            .map(|r| r.cost)
            .sum()
    }

    pub fn summary_statistics(&self) -> SummaryStatistics {
        let state = self.state.lock().unwrap();
        if state.records.is_empty() {
            return SummaryStatistics::default();
        }

        let total_cost: f64 = state.records.iter().map(|r| r.cost).sum();
        let total_tokens: u64 = state.records.iter().map(|r| r.total_tokens as u64).sum();
        let mut cost_by_operation: HashMap<String, f64> = HashMap::new();
        let mut cost_by_model: HashMap<String, f64> = HashMap::new();
        for r in &state.records {
            *cost_by_operation.entry(r.operation.to_string()).or_insert(0.0) += r.cost;
            *cost_by_model.entry(r.model.clone()).or_insert(0.0) += r.cost;
        }

        SummaryStatistics {
            total_calls: state.records.len(),
            total_cost,
            total_tokens,
            average_cost_per_call: total_cost / state.records.len() as f64,
            cost_by_operation,
            cost_by_model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_and_flush_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cost_tracking.json");
        let ledger = CostLedger::load(&path).unwrap();
        ledger.set_task_id("task-1");
        ledger
            .log_api_call(
                "gpt-4o-mini",
                100,
                50,
                ApiCallOperation::Synthesis,
                0.002,
                "chat_completion",
                1.2,
            )
            .unwrap();

        assert_eq!(ledger.total_cost(), 0.002);
        assert_eq!(ledger.query_cost("task-1"), 0.002);

        let reloaded = CostLedger::load(&path).unwrap();
        assert_eq!(reloaded.total_cost(), 0.002);
    }

    #[test]
    fn summary_statistics_breaks_down_by_operation_and_model() {
        let dir = tempdir().unwrap();
        let ledger = CostLedger::load(dir.path().join("cost.json")).unwrap();
        ledger
            .log_api_call(
                "gpt-4o-mini",
                10,
                10,
                ApiCallOperation::QueryExpansion,
                0.001,
                "chat_completion",
                0.1,
            )
            .unwrap();
        ledger
            .log_api_call(
                "text-embedding-3-small",
                10,
                0,
                ApiCallOperation::Embedding,
                0.0001,
                "create_embedding",
                0.05,
            )
            .unwrap();

        let summary = ledger.summary_statistics();
        assert_eq!(summary.total_calls, 2);
        assert!(summary.cost_by_operation.contains_key("query_expansion"));
        assert!(summary.cost_by_operation.contains_key("embedding"));
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let ledger = CostLedger::load(dir.path().join("does-not-exist.json")).unwrap();
        assert_eq!(ledger.total_cost(), 0.0);
    }
}
