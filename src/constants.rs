use std::time::Duration;

/// Confidence below which a draft is routed to human review (§4.4.3).
pub const HITL_CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Maximum number of reject-triggered regenerations per task (§4.4.4).
pub const MAX_REGEN: u32 = 2;

/// Search agent: sub-queries fanned out per expansion.
pub const SEARCH_TOP_K: usize = 10;
pub const SEARCH_RESULTS_RETAINED: usize = 20;
pub const SEARCH_NAMESPACE: &str = "research_papers";

/// Synthesis agent: broader-recall pass and chunk bounds.
pub const SYNTHESIS_TOP_K: usize = 15;
pub const SYNTHESIS_MIN_RECOMMENDED_SOURCES: usize = 5;
pub const SYNTHESIS_MAX_SOURCES: usize = 30;

/// Executor: up to this many sources are copied into the ResultRecord.
pub const RESULT_MAX_SOURCES: usize = 20;

/// Embedding dimensionality for `text-embedding-3-small`.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Workflow executor worker pool and queue bounds (§4.6).
pub const EXECUTOR_WORKER_POOL_SIZE: usize = 4;
pub const EXECUTOR_QUEUE_CAPACITY: usize = 1024;

/// Per-principal rate limit (§4.7).
pub const RATE_LIMIT_PER_MINUTE: u32 = 5;
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Status response cache TTL (§4.7).
pub const STATUS_CACHE_TTL: Duration = Duration::from_secs(2);

/// External call timeouts (§5).
pub const SHORT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
pub const LONG_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Query length bounds enforced at the API boundary (§4.7).
pub const QUERY_MIN_LENGTH: usize = 10;
pub const QUERY_MAX_LENGTH: usize = 500;

/// Per-agent time estimates used to compute `estimated_completion`.
pub const SEARCH_ESTIMATE_SECS: i64 = 30;
pub const SYNTHESIS_ESTIMATE_SECS: i64 = 60;
pub const VALIDATION_ESTIMATE_SECS: i64 = 20;

/// LLM call parameters, fixed per node (§4.4).
pub const QUERY_EXPANSION_TEMPERATURE: f32 = 0.3;
pub const QUERY_EXPANSION_MAX_TOKENS: u32 = 500;
pub const SYNTHESIS_TEMPERATURE: f32 = 0.3;
pub const SYNTHESIS_MAX_TOKENS: u32 = 2000;
pub const VALIDATION_TEMPERATURE: f32 = 0.1;
pub const VALIDATION_MAX_TOKENS: u32 = 800;

/// Retry policy for the LLM/vector-store capability clients.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
