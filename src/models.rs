use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Analysis depth requested for a research task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    Standard,
    Comprehensive,
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Depth::Quick => "quick",
            Depth::Standard => "standard",
            Depth::Comprehensive => "comprehensive",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Depth {
    type Err = crate::error::ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(Depth::Quick),
            "standard" => Ok(Depth::Standard),
            "comprehensive" => Ok(Depth::Comprehensive),
            other => Err(crate::error::ResearchError::InputError(format!(
                "invalid depth: {other}"
            ))),
        }
    }
}

/// Closed enum of legal task statuses (§3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    PendingReview,
    Completed,
    Approved,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::PendingReview => "pending_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Approved => "approved",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskStatus {
    type Err = crate::error::ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "pending_review" => Ok(TaskStatus::PendingReview),
            "completed" => Ok(TaskStatus::Completed),
            "approved" => Ok(TaskStatus::Approved),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(crate::error::ResearchError::Internal(anyhow::anyhow!(
                "unknown task status in store: {other}"
            ))),
        }
    }
}

impl TaskStatus {
    /// True for states that will never again be written to by the executor.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Approved | TaskStatus::Failed
        )
    }

    /// Legal transition check per the state machine in §4.3.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Processing, PendingReview)
                | (Processing, Completed)
                | (Processing, Failed)
                | (PendingReview, Approved)
                | (PendingReview, Processing)
                | (PendingReview, Failed)
                | (Completed, Approved)
        )
    }
}

/// A single search hit before chunk hydration (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub doc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub score: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_query: Option<String>,
    #[serde(default)]
    pub extra_metadata: HashMap<String, String>,
}

impl SearchResult {
    /// URL if present, else doc_id — the dedup key used by the Search Agent.
    pub fn dedup_key(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.doc_id)
    }
}

/// A fully hydrated source chunk, numbered stably within one run (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub doc_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub score: f64,
}

impl RetrievedChunk {
    /// chunk_id if non-empty, else doc_id — the dedup key used by Synthesis.
    pub fn dedup_key(&self) -> &str {
        if self.chunk_id.is_empty() {
            &self.doc_id
        } else {
            &self.chunk_id
        }
    }
}

/// Structured validator output (§3, §4.4.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub llm_confidence: f64,
    pub final_confidence: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub citation_coverage: f64,
    #[serde(default)]
    pub invalid_citations: Vec<i64>,
    #[serde(default)]
    pub unsupported_claims: Vec<String>,
    #[serde(default)]
    pub has_contradictions: bool,
}

/// The single object threaded through the workflow (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub task_id: String,
    pub user_query: String,
    pub current_agent: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    #[serde(default)]
    pub retrieved_chunks: Vec<RetrievedChunk>,
    #[serde(default)]
    pub source_count: usize,
    #[serde(default)]
    pub report_draft: String,
    #[serde(default)]
    pub validation_result: ValidationResult,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub needs_hitl: bool,
    #[serde(default)]
    pub final_report: String,
    #[serde(default)]
    pub regeneration_count: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl ResearchState {
    pub fn new(task_id: impl Into<String>, user_query: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            user_query: user_query.into(),
            current_agent: "search".to_string(),
            search_queries: Vec::new(),
            search_results: Vec::new(),
            retrieved_chunks: Vec::new(),
            source_count: 0,
            report_draft: String::new(),
            validation_result: ValidationResult::default(),
            confidence_score: 0.0,
            needs_hitl: false,
            final_report: String::new(),
            regeneration_count: 0,
            error: None,
        }
    }
}

/// Persisted task record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub depth: Depth,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One source summary copied into a ResultRecord (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source_id: u32,
    pub title: String,
    pub url: String,
    pub relevance_score: f64,
}

/// Persisted result record, one per task after production (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub task_id: String,
    pub report: String,
    pub sources: Vec<SourceSummary>,
    pub confidence_score: f64,
    pub needs_hitl: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One append-only telemetry record for a single model call (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost: f64,
    pub operation: ApiCallOperation,
    pub method: String,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCallOperation {
    QueryExpansion,
    Synthesis,
    Validation,
    Embedding,
}

impl fmt::Display for ApiCallOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApiCallOperation::QueryExpansion => "query_expansion",
            ApiCallOperation::Synthesis => "synthesis",
            ApiCallOperation::Validation => "validation",
            ApiCallOperation::Embedding => "embedding",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_status_transitions_follow_the_graph() {
        assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::PendingReview));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::PendingReview.can_transition_to(TaskStatus::Approved));
        assert!(TaskStatus::PendingReview.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::PendingReview.can_transition_to(TaskStatus::Failed));
        assert!(TaskStatus::Completed.can_transition_to(TaskStatus::Approved));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Failed.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Approved.can_transition_to(TaskStatus::PendingReview));
    }

    #[test]
    fn search_result_dedup_key_prefers_url() {
        let with_url = SearchResult {
            doc_id: "doc-1".into(),
            chunk_id: None,
            score: 0.9,
            text: String::new(),
            title: None,
            url: Some("https://example.com/a".into()),
            origin_query: None,
            extra_metadata: HashMap::new(),
        };
        assert_eq!(with_url.dedup_key(), "https://example.com/a");

        let without_url = SearchResult {
            url: None,
            ..with_url
        };
        assert_eq!(without_url.dedup_key(), "doc-1");
    }
}
