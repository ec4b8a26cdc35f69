//! Workflow Executor (§4.6): a bounded worker pool draining a bounded job
//! queue off the HTTP request path. Submission is fail-fast — a full queue
//! is reported to the caller immediately rather than applying backpressure,
//! since the caller is an HTTP handler that must return *something* to the
//! client within its own timeout budget.

pub mod hitl;

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::agents::AgentContext;
use crate::constants::{RESULT_MAX_SOURCES, SYNTHESIS_MIN_RECOMMENDED_SOURCES};
use crate::error::{ResearchError, Result};
use crate::models::{ResearchState, SourceSummary, TaskStatus};
use crate::store::TaskStore;
use crate::workflow::{self, WorkflowOutcome};

struct Job {
    task_id: String,
    query: String,
    regeneration_count: u32,
}

#[derive(Clone)]
pub struct WorkflowExecutor {
    sender: mpsc::Sender<Job>,
}

impl WorkflowExecutor {
    /// Spawns `pool_size` workers all pulling from one `queue_capacity`-deep
    /// channel, and returns a handle for submitting new jobs.
    pub fn spawn(
        store: Arc<TaskStore>,
        ctx: AgentContext,
        pool_size: usize,
        queue_capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..pool_size {
            let rx = rx.clone();
            let store = store.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(job) = job else {
                        tracing::info!(worker_id, "executor worker shutting down, channel closed");
                        break;
                    };
                    process(job, &store, &ctx).await;
                }
            });
        }

        Self { sender: tx }
    }

    /// Enqueues a fresh run for `task_id`. Returns `Saturated` immediately
    /// if the queue is full rather than waiting for room.
    pub fn try_enqueue(&self, task_id: impl Into<String>, query: impl Into<String>) -> Result<()> {
        self.try_enqueue_with_regen(task_id, query, 0)
    }

    fn try_enqueue_with_regen(
        &self,
        task_id: impl Into<String>,
        query: impl Into<String>,
        regeneration_count: u32,
    ) -> Result<()> {
        self.sender
            .try_send(Job {
                task_id: task_id.into(),
                query: query.into(),
                regeneration_count,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ResearchError::Saturated,
                mpsc::error::TrySendError::Closed(_) => {
                    ResearchError::Internal(anyhow::anyhow!("executor queue is closed"))
                }
            })
    }
}

async fn process(job: Job, store: &TaskStore, ctx: &AgentContext) {
    let Job {
        task_id,
        query,
        regeneration_count,
    } = job;

    if let Err(e) = store.update(&task_id, Some(TaskStatus::Processing), Some("search"), Some(0), None) {
        tracing::error!(task_id, error = %e, "failed to mark task processing");
        return;
    }

    ctx.cost_ledger.set_task_id(task_id.clone());
    let mut state = ResearchState::new(task_id.clone(), query);
    state.regeneration_count = regeneration_count;

    let outcome = workflow::run(state, ctx, store).await;
    ctx.cost_ledger.clear_task_id();

    if let Err(e) = persist_outcome(&task_id, outcome, store) {
        tracing::error!(task_id, error = %e, "failed to persist workflow outcome");
    }
}

fn persist_outcome(task_id: &str, outcome: WorkflowOutcome, store: &TaskStore) -> Result<()> {
    match outcome {
        WorkflowOutcome::Completed(state) => {
            let sources = build_sources(&state);
            let metadata = serde_json::json!({
                "search_queries": state.search_queries,
                "num_sources": state.source_count,
                "hitl_completed": false,
                "regeneration_count": state.regeneration_count,
            });
            store.store_result(
                task_id,
                &state.final_report,
                &sources,
                state.confidence_score,
                false,
                metadata,
            )
        }
        WorkflowOutcome::NeedsReview(state) => {
            let sources = build_sources(&state);
            let metadata = serde_json::json!({
                "search_queries": state.search_queries,
                "num_sources": state.source_count,
                "hitl_completed": false,
                "regeneration_count": state.regeneration_count,
                "validation_result": state.validation_result,
            });
            store.store_result(
                task_id,
                &state.report_draft,
                &sources,
                state.confidence_score,
                true,
                metadata,
            )
        }
        WorkflowOutcome::Failed(state) => {
            let message = state.error.unwrap_or_else(|| "unknown workflow failure".to_string());
            store.mark_failed(task_id, &message)
        }
    }
}

/// Builds the source list stored alongside the report: capped at
/// `RESULT_MAX_SOURCES`, with relevance decaying 2% per rank and an arXiv
/// URL synthesized from the doc id when no native URL is present.
fn build_sources(state: &ResearchState) -> Vec<SourceSummary> {
    if state.source_count < SYNTHESIS_MIN_RECOMMENDED_SOURCES {
        tracing::warn!(
            task_id = %state.task_id,
            source_count = state.source_count,
            "fewer sources than recommended in final result"
        );
    }

    state
        .retrieved_chunks
        .iter()
        .take(RESULT_MAX_SOURCES)
        .enumerate()
        .map(|(i, chunk)| SourceSummary {
            source_id: (i + 1) as u32,
            title: chunk.title.clone().unwrap_or_else(|| "Untitled".to_string()),
            url: chunk.url.clone().unwrap_or_else(|| arxiv_fallback_url(&chunk.doc_id)),
            relevance_score: (1.0 - i as f64 * 0.02).max(0.0),
        })
        .collect()
}

fn arxiv_fallback_url(doc_id: &str) -> String {
    format!("https://arxiv.org/pdf/{doc_id}.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetrievedChunk;

    #[test]
    fn build_sources_decays_relevance_by_rank() {
        let mut state = ResearchState::new("task-1", "q");
        state.retrieved_chunks = vec![
            RetrievedChunk {
                chunk_id: "c1".into(),
                doc_id: "doc-1".into(),
                text: "t".into(),
                title: Some("A".into()),
                url: Some("https://a".into()),
                score: 0.9,
            },
            RetrievedChunk {
                chunk_id: "c2".into(),
                doc_id: "doc-2".into(),
                text: "t".into(),
                title: None,
                url: None,
                score: 0.8,
            },
        ];
        let sources = build_sources(&state);
        assert_eq!(sources[0].relevance_score, 1.0);
        assert_eq!(sources[1].relevance_score, 0.98);
        assert_eq!(sources[1].title, "Untitled");
        assert_eq!(sources[1].url, "https://arxiv.org/pdf/doc-2.pdf");
    }

    #[test]
    fn build_sources_caps_at_result_max_sources() {
        let mut state = ResearchState::new("task-1", "q");
        state.retrieved_chunks = (0..30)
            .map(|i| RetrievedChunk {
                chunk_id: format!("c{i}"),
                doc_id: format!("doc-{i}"),
                text: "t".into(),
                title: None,
                url: None,
                score: 0.5,
            })
            .collect();
        let sources = build_sources(&state);
        assert_eq!(sources.len(), RESULT_MAX_SOURCES);
    }
}
