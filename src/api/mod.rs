//! HTTP API Layer (§4.7): axum router wiring the research/status/report/
//! review/health endpoints together with tracing, CORS, and per-principal
//! rate limiting.

pub mod dto;
pub mod handlers;
pub mod status;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::Result;
use crate::middleware::RateLimitState;

pub use handlers::AppState;

pub struct ApiServer {
    addr: SocketAddr,
    router: Router,
}

impl ApiServer {
    pub fn new(config: &Config, state: Arc<AppState>) -> Result<Self> {
        let rate_limit_state = RateLimitState::new();

        let router = Router::new()
            .route("/api/v1/research", post(handlers::submit_research))
            .route("/api/v1/status/{task_id}", get(handlers::get_task_status))
            .route("/api/v1/report/{task_id}", get(handlers::get_report))
            .route("/api/v1/review/{task_id}", post(handlers::submit_review))
            .route("/api/v1/health", get(handlers::health))
            .layer(axum::middleware::from_fn_with_state(
                rate_limit_state,
                crate::middleware::rate_limit_layer,
            ))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
            .parse()
            .map_err(|e| crate::error::ResearchError::Configuration(format!("invalid API address: {e}")))?;

        Ok(Self { addr, router })
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!(addr = %self.addr, "starting HTTP API server");
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| crate::error::ResearchError::Internal(anyhow::anyhow!("failed to bind {}: {e}", self.addr)))?;
        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| crate::error::ResearchError::Internal(anyhow::anyhow!("API server error: {e}")))
    }
}
