use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Crate-wide error type. Each variant maps to exactly one entry in the
/// taxonomy the HTTP layer and workflow executor agree on.
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("invalid input: {0}")]
    InputError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("executor queue saturated")]
    Saturated,

    #[error("provider error: {0}")]
    ProviderError(String),

    #[error("data error: {0}")]
    DataError(String),

    #[error("not implemented: {0}")]
    Unsupported(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ResearchError>;

impl From<rusqlite::Error> for ResearchError {
    fn from(err: rusqlite::Error) -> Self {
        ResearchError::Database(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl ResearchError {
    fn taxonomy(&self) -> (StatusCode, &'static str) {
        match self {
            ResearchError::InputError(_) => (StatusCode::BAD_REQUEST, "InputError"),
            ResearchError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ResearchError::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            ResearchError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RateLimited"),
            ResearchError::Saturated => (StatusCode::SERVICE_UNAVAILABLE, "Saturated"),
            ResearchError::ProviderError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ProviderError")
            }
            ResearchError::DataError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DataError"),
            ResearchError::Unsupported(_) => (StatusCode::NOT_IMPLEMENTED, "Unsupported"),
            ResearchError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration")
            }
            ResearchError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database"),
            ResearchError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Serialization")
            }
            ResearchError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "Timeout"),
            ResearchError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
        }
    }
}

impl IntoResponse for ResearchError {
    fn into_response(self) -> Response {
        let (status, tag) = self.taxonomy();
        // Provider/internal detail is logged, never handed to the client verbatim.
        tracing::error!(error = %self, taxonomy = tag, "request failed");

        let message = match &self {
            ResearchError::ProviderError(_) | ResearchError::Internal(_) => {
                "an internal error occurred while processing the request".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: tag,
                message,
                detail: None,
            }),
        )
            .into_response();

        if let ResearchError::RateLimited { retry_after_secs } = self {
            response.headers_mut().insert(
                "Retry-After",
                retry_after_secs.to_string().parse().unwrap(),
            );
        }
        if matches!(status, StatusCode::SERVICE_UNAVAILABLE) {
            response
                .headers_mut()
                .insert("Retry-After", "1".parse().unwrap());
        }

        response
    }
}
