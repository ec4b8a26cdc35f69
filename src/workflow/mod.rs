//! Workflow Engine (§4.5): the fixed directed graph wiring the four agent
//! nodes together, with one conditional edge out of validation.
//!
//! `search -> synthesis -> validation -> {hitl_review | set_final_report} -> END`
//!
//! There is no generic graph executor here — the graph shape never changes
//! at runtime, so it is just a sequence of `await`s with one branch, which
//! reads far more plainly than a node registry would for four fixed steps.

use crate::agents::{finalize, search, synthesis, validation, AgentContext};
use crate::error::Result;
use crate::models::ResearchState;
use crate::store::TaskStore;

/// Outcome of running the graph to its first stopping point.
pub enum WorkflowOutcome {
    Completed(ResearchState),
    NeedsReview(ResearchState),
    Failed(ResearchState),
}

/// Runs `search -> synthesis -> validation` and then takes the conditional
/// edge. A node failure never propagates as an `Err` — it is captured into
/// `Failed`, with the draft-falls-back-to-final-report behavior from the
/// original human-review node applied so a failure never leaves both
/// `error` and `final_report` unset.
pub async fn run(initial: ResearchState, ctx: &AgentContext, store: &TaskStore) -> WorkflowOutcome {
    match run_inner(initial.clone(), ctx, store).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let mut state = initial;
            state.error = Some(e.to_string());
            if state.final_report.is_empty() && !state.report_draft.is_empty() {
                state.final_report = state.report_draft.clone();
            }
            WorkflowOutcome::Failed(state)
        }
    }
}

async fn run_inner(state: ResearchState, ctx: &AgentContext, store: &TaskStore) -> Result<WorkflowOutcome> {
    let state = search::run(state, ctx).await?;
    report_progress(store, &state.task_id, "search", 40);

    let state = synthesis::run(state, ctx).await?;
    report_progress(store, &state.task_id, "synthesis", 70);

    let state = validation::run(state, ctx).await?;
    report_progress(store, &state.task_id, "validation", 90);

    if state.needs_hitl {
        Ok(WorkflowOutcome::NeedsReview(state))
    } else {
        let state = finalize::run(state).await?;
        Ok(WorkflowOutcome::Completed(state))
    }
}

/// Pushes an intermediate status update after a node completes. Best-effort:
/// a failed progress write is logged, never escalated into a node failure.
fn report_progress(store: &TaskStore, task_id: &str, current_agent: &str, progress: u8) {
    if let Err(e) = store.update(task_id, None, Some(current_agent), Some(progress), None) {
        tracing::warn!(task_id, error = %e, "failed to push progress update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{BlobStore, ChatRequest, ChatResponse, LlmProvider, VectorStore};
    use crate::telemetry::CostLedger;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubLlm;

    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            let text = if request.system.as_deref().unwrap_or("").contains("fact checker") {
                r#"{"confidence": 0.95, "unsupported_claims": [], "issues": []}"#.to_string()
            } else if request.system.as_deref().unwrap_or("").contains("expand") {
                r#"["sub query one"]"#.to_string()
            } else {
                "Report body [Source 1].".to_string()
            };
            Ok(ChatResponse {
                text,
                prompt_tokens: 10,
                completion_tokens: 10,
            })
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0; 1536])
        }
    }

    struct StubVectors;

    #[async_trait]
    impl VectorStore for StubVectors {
        async fn query(
            &self,
            _embedding: &[f32],
            _top_k: usize,
            _namespace: &str,
        ) -> Result<Vec<crate::models::SearchResult>> {
            Ok(vec![crate::models::SearchResult {
                doc_id: "doc-1".to_string(),
                chunk_id: Some("chunk-1".to_string()),
                score: 0.9,
                text: "some text".to_string(),
                title: Some("Title".to_string()),
                url: Some("https://example.com".to_string()),
                origin_query: None,
                extra_metadata: Default::default(),
            }])
        }

        async fn upsert(&self, _namespace: &str, _id: &str, _embedding: &[f32]) -> Result<()> {
            Ok(())
        }
    }

    struct StubBlobs;

    #[async_trait]
    impl BlobStore for StubBlobs {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(Some(r#"{"text": "chunk body", "title": "T", "url": "https://x"}"#.to_string()))
        }

        async fn put(&self, _key: &str, _body: &str) -> Result<()> {
            Ok(())
        }

        async fn list(&self, _prefix: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn test_context() -> AgentContext {
        AgentContext {
            llm: Arc::new(StubLlm),
            vectors: Arc::new(StubVectors),
            blobs: Arc::new(StubBlobs),
            cost_ledger: Arc::new(CostLedger::load(std::env::temp_dir().join(format!(
                "workflow-test-{}.json",
                uuid::Uuid::new_v4()
            ))).unwrap()),
        }
    }

    #[tokio::test]
    async fn high_confidence_run_completes_without_review() {
        let ctx = test_context();
        let store = crate::store::TaskStore::open_in_memory().unwrap();
        let task_id = store
            .create("what is attention?", None, crate::models::Depth::Standard)
            .unwrap();
        store
            .update(&task_id, Some(crate::models::TaskStatus::Processing), Some("search"), Some(0), None)
            .unwrap();
        let state = ResearchState::new(task_id, "what is attention?");
        match run(state, &ctx, &store).await {
            WorkflowOutcome::Completed(state) => {
                assert!(!state.final_report.is_empty());
                assert!(!state.needs_hitl);
            }
            WorkflowOutcome::NeedsReview(_) => panic!("expected completion"),
            WorkflowOutcome::Failed(state) => panic!("workflow failed: {:?}", state.error),
        }
    }
}
