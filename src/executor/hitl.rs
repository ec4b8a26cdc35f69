//! HITL Review Controller (§4.8): dispatches approve/edit/reject decisions
//! against a task pending review, bounding reject-triggered regeneration at
//! `MAX_REGEN` so a stubborn low-confidence query can't loop forever.

use crate::constants::MAX_REGEN;
use crate::error::{ResearchError, Result};
use crate::store::TaskStore;

use super::WorkflowExecutor;

pub enum RejectOutcome {
    Requeued,
    MaxRegenerationsExceeded,
}

pub fn approve(store: &TaskStore, task_id: &str) -> Result<()> {
    store.approve(task_id)
}

pub fn edit(store: &TaskStore, task_id: &str, new_report: &str) -> Result<()> {
    store.edit(task_id, new_report)
}

/// Rejects the pending draft and, if the task hasn't already exhausted its
/// regeneration budget, re-enqueues the original query for another run.
/// Once the budget is exhausted the task is failed instead of looping.
pub fn reject(
    store: &TaskStore,
    executor: &WorkflowExecutor,
    task_id: &str,
    reason: &str,
) -> Result<RejectOutcome> {
    let (_, result) = store
        .get_result(task_id)?
        .ok_or_else(|| ResearchError::NotFound(format!("task {task_id} not found")))?;

    let regeneration_count = result
        .metadata
        .get("regeneration_count")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;

    if regeneration_count >= MAX_REGEN {
        store.mark_failed(
            task_id,
            &format!("rejected after {regeneration_count} regenerations: {reason}"),
        )?;
        return Ok(RejectOutcome::MaxRegenerationsExceeded);
    }

    let query = store.reject_for_regeneration(task_id)?;
    executor.try_enqueue_with_regen(task_id, query, regeneration_count + 1)?;
    Ok(RejectOutcome::Requeued)
}
