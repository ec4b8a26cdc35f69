//! Human-readable status messages and estimated-completion times (§4.7).
//! Both are pure functions of the current status/agent pair so the status
//! endpoint never has to guess at wording.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::constants::{SEARCH_ESTIMATE_SECS, SYNTHESIS_ESTIMATE_SECS, VALIDATION_ESTIMATE_SECS};
use crate::models::TaskStatus;

pub fn status_message(status: TaskStatus, current_agent: Option<&str>, error_message: Option<&str>) -> String {
    match status {
        TaskStatus::Queued => "Task is queued and waiting to start".to_string(),
        TaskStatus::Processing => match current_agent {
            Some("search") => "Searching for relevant sources".to_string(),
            Some("synthesis") => "Synthesizing research report".to_string(),
            Some("validation") => "Validating report accuracy".to_string(),
            _ => "Processing research task".to_string(),
        },
        TaskStatus::PendingReview => "Report is awaiting human review".to_string(),
        TaskStatus::Completed => "Research task completed successfully".to_string(),
        TaskStatus::Approved => "Report reviewed and approved".to_string(),
        TaskStatus::Failed => match error_message {
            Some(msg) => format!("Task failed: {msg}"),
            None => "Task failed".to_string(),
        },
    }
}

/// `None` for terminal statuses and for `pending_review` / `hitl_review`,
/// where completion depends on a human rather than a fixed-duration agent.
pub fn estimated_completion(
    status: TaskStatus,
    current_agent: Option<&str>,
    updated_at: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status.is_terminal() || status == TaskStatus::PendingReview {
        return None;
    }

    let estimate_secs = match current_agent {
        Some("search") => SEARCH_ESTIMATE_SECS,
        Some("synthesis") => SYNTHESIS_ESTIMATE_SECS,
        Some("validation") => VALIDATION_ESTIMATE_SECS,
        _ => return None,
    };

    Some(updated_at + ChronoDuration::seconds(estimate_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_estimate() {
        let now = Utc::now();
        assert!(estimated_completion(TaskStatus::Completed, None, now).is_none());
        assert!(estimated_completion(TaskStatus::Failed, None, now).is_none());
        assert!(estimated_completion(TaskStatus::PendingReview, None, now).is_none());
    }

    #[test]
    fn processing_with_known_agent_adds_the_right_offset() {
        let now = Utc::now();
        let est = estimated_completion(TaskStatus::Processing, Some("synthesis"), now).unwrap();
        assert_eq!((est - now).num_seconds(), SYNTHESIS_ESTIMATE_SECS);
    }

    #[test]
    fn failed_status_message_includes_error_text() {
        let msg = status_message(TaskStatus::Failed, None, Some("boom"));
        assert_eq!(msg, "Task failed: boom");
    }
}
