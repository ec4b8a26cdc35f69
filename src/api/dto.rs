//! Request/response bodies for the HTTP surface (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SourceSummary, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub depth: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(default = "default_report_format")]
    pub format: String,
}

fn default_report_format() -> String {
    "json".to_string()
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub task_id: String,
    pub report: String,
    pub sources: Vec<SourceSummary>,
    pub confidence_score: f64,
    pub needs_hitl: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub action: ReviewAction,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub edited_report: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Edit,
    Reject,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub task_id: String,
    pub action: &'static str,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
