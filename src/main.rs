use std::sync::Arc;

use tracing::{info, Level};

use research_orchestration_core::agents::AgentContext;
use research_orchestration_core::api::{ApiServer, AppState};
use research_orchestration_core::config::Config;
use research_orchestration_core::constants::{EXECUTOR_QUEUE_CAPACITY, EXECUTOR_WORKER_POOL_SIZE};
use research_orchestration_core::executor::WorkflowExecutor;
use research_orchestration_core::llm::OpenAiLlmProvider;
use research_orchestration_core::retrieval::pinecone::PineconeVectorStore;
use research_orchestration_core::retrieval::s3::S3BlobStore;
use research_orchestration_core::store::TaskStore;
use research_orchestration_core::telemetry::CostLedger;
use research_orchestration_core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Research Orchestration Core");

    let config = Config::load()?;
    let http_client = reqwest::Client::new();

    let store = Arc::new(TaskStore::open(&config.task_db_path)?);
    let cost_ledger = Arc::new(CostLedger::load(&config.telemetry_log_path)?);

    let ctx = AgentContext {
        llm: Arc::new(OpenAiLlmProvider::new(&config.llm, http_client.clone())),
        vectors: Arc::new(PineconeVectorStore::new(&config.vector_store, http_client.clone())),
        blobs: Arc::new(S3BlobStore::new(&config.blob_store, http_client)),
        cost_ledger: cost_ledger.clone(),
    };

    let executor = WorkflowExecutor::spawn(
        store.clone(),
        ctx.clone(),
        EXECUTOR_WORKER_POOL_SIZE,
        EXECUTOR_QUEUE_CAPACITY,
    );

    let state = Arc::new(AppState {
        store,
        executor,
        cost_ledger,
        status_cache: Default::default(),
    });

    let api_server = ApiServer::new(&config, state)?;
    api_server.run().await
}
