//! The four agent nodes (§4.4): pure functions from one `ResearchState` to
//! the next, each taking only the capability handles it actually needs.
//! Unlike the stateful agent-trait-object pattern this module used to hold,
//! there is no `can_handle`/dispatch step — the workflow graph (§4.5) decides
//! which node runs next.

pub mod finalize;
pub mod search;
pub mod synthesis;
pub mod validation;

use std::sync::Arc;

use crate::retrieval::{BlobStore, LlmProvider, VectorStore};
use crate::telemetry::CostLedger;

/// Capability handles shared by every node, cloned cheaply per workflow run.
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Arc<dyn LlmProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub cost_ledger: Arc<CostLedger>,
}
