//! HTTP handlers for the research API surface (§6).

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::sync::Mutex as AsyncMutex;

use crate::constants::STATUS_CACHE_TTL;
use crate::error::{ResearchError, Result};
use crate::executor::{hitl, WorkflowExecutor};
use crate::models::ResultRecord;
use crate::store::TaskStore;
use crate::telemetry::CostLedger;
use crate::validation::{validate_depth, validate_query, validate_task_id};

use super::dto::{
    HealthResponse, ReportQuery, ReportResponse, ReviewAction, ReviewRequest, ReviewResponse,
    StatusResponse, SubmitRequest, SubmitResponse,
};
use super::status::{estimated_completion, status_message};

pub struct AppState {
    pub store: Arc<TaskStore>,
    pub executor: WorkflowExecutor,
    pub cost_ledger: Arc<CostLedger>,
    pub status_cache: AsyncMutex<std::collections::HashMap<String, (Instant, StatusResponse)>>,
}

pub async fn submit_research(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitRequest>,
) -> Result<(axum::http::StatusCode, Json<SubmitResponse>)> {
    validate_query(&body.query)?;
    let depth = match &body.depth {
        Some(d) => validate_depth(d)?,
        None => crate::models::Depth::Standard,
    };

    let task_id = state
        .store
        .create(&body.query, body.user_id.as_deref(), depth)?;

    state.executor.try_enqueue(task_id.clone(), body.query)?;

    let record = state
        .store
        .get_status(&task_id)?
        .ok_or_else(|| ResearchError::Internal(anyhow::anyhow!("task vanished immediately after creation")))?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(SubmitResponse {
            task_id,
            status: record.status,
            message: "Research task queued".to_string(),
            created_at: record.created_at,
        }),
    ))
}

pub async fn get_task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusResponse>> {
    validate_task_id(&task_id)?;

    {
        let cache = state.status_cache.lock().await;
        if let Some((cached_at, response)) = cache.get(&task_id) {
            if cached_at.elapsed() < STATUS_CACHE_TTL {
                return Ok(Json(response.clone()));
            }
        }
    }

    let record = state
        .store
        .get_status(&task_id)?
        .ok_or_else(|| ResearchError::NotFound(format!("task {task_id} not found")))?;

    let response = StatusResponse {
        task_id: record.task_id.clone(),
        status: record.status,
        current_agent: record.current_agent.clone(),
        progress: record.progress,
        message: status_message(record.status, record.current_agent.as_deref(), record.error_message.as_deref()),
        estimated_completion: estimated_completion(record.status, record.current_agent.as_deref(), record.updated_at),
        error: record.error_message.clone(),
    };

    let mut cache = state.status_cache.lock().await;
    cache.retain(|_, (cached_at, _)| cached_at.elapsed() < Duration::from_secs(60));
    cache.insert(task_id, (Instant::now(), response.clone()));

    Ok(Json(response))
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Response> {
    validate_task_id(&task_id)?;

    if !matches!(query.format.as_str(), "json" | "markdown" | "pdf") {
        return Err(ResearchError::InputError(format!(
            "unsupported report format: {} (expected json, markdown, or pdf)",
            query.format
        )));
    }

    let (_, result) = match state.store.get_result(&task_id)? {
        Some(pair) => pair,
        None => {
            return match state.store.get_status(&task_id)? {
                Some(record) if record.status == crate::models::TaskStatus::Failed => {
                    Err(ResearchError::InputError(format!(
                        "task {task_id} failed: {}",
                        record.error_message.unwrap_or_default()
                    )))
                }
                Some(record) => Err(ResearchError::Conflict(format!(
                    "task {task_id} is not ready (status: {})",
                    record.status
                ))),
                None => Err(ResearchError::NotFound(format!("task {task_id} not found"))),
            };
        }
    };

    match query.format.as_str() {
        "markdown" => Ok((
            [("content-type", "text/markdown; charset=utf-8")],
            render_markdown(&result),
        )
            .into_response()),
        "pdf" => Err(ResearchError::Unsupported(
            "pdf report rendering is not implemented".to_string(),
        )),
        _ => Ok(Json(ReportResponse {
            task_id: result.task_id,
            report: result.report,
            sources: result.sources,
            confidence_score: result.confidence_score,
            needs_hitl: result.needs_hitl,
            created_at: result.created_at,
        })
        .into_response()),
    }
}

fn render_markdown(result: &ResultRecord) -> String {
    let mut out = format!("# Research Report\n\n{}\n\n## Sources\n\n", result.report);
    for source in &result.sources {
        out.push_str(&format!(
            "{}. [{}]({}) — relevance {:.2}\n",
            source.source_id, source.title, source.url, source.relevance_score
        ));
    }
    out
}

pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>> {
    validate_task_id(&task_id)?;

    let record = state
        .store
        .get_status(&task_id)?
        .ok_or_else(|| ResearchError::NotFound(format!("task {task_id} not found")))?;

    if record.status != crate::models::TaskStatus::PendingReview {
        return Err(ResearchError::Conflict(format!(
            "task {task_id} is not pending review (status: {})",
            record.status
        )));
    }

    let now = chrono::Utc::now();
    match body.action {
        ReviewAction::Approve => {
            hitl::approve(&state.store, &task_id)?;
            Ok(Json(ReviewResponse {
                task_id,
                action: "approved",
                message: "Report approved".to_string(),
                timestamp: now,
                reason: None,
            }))
        }
        ReviewAction::Edit => {
            let edited = body
                .edited_report
                .ok_or_else(|| ResearchError::InputError("edited_report is required for edit".to_string()))?;
            hitl::edit(&state.store, &task_id, &edited)?;
            Ok(Json(ReviewResponse {
                task_id,
                action: "edited",
                message: "Report edited and approved".to_string(),
                timestamp: now,
                reason: None,
            }))
        }
        ReviewAction::Reject => {
            let reason = body
                .rejection_reason
                .ok_or_else(|| ResearchError::InputError("rejection_reason is required for reject".to_string()))?;
            match hitl::reject(&state.store, &state.executor, &task_id, &reason)? {
                hitl::RejectOutcome::Requeued => Ok(Json(ReviewResponse {
                    task_id,
                    action: "rejected",
                    message: "Report rejected, regenerating".to_string(),
                    timestamp: now,
                    reason: Some(reason),
                })),
                hitl::RejectOutcome::MaxRegenerationsExceeded => Ok(Json(ReviewResponse {
                    task_id,
                    action: "rejected",
                    message: "Report rejected, maximum regenerations exceeded".to_string(),
                    timestamp: now,
                    reason: Some(reason),
                })),
            }
        }
    }
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
