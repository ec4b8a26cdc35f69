//! Finalize node (§4.4.4): the non-interactive terminus taken when
//! validation found the draft confident enough to skip human review.
//! Mirrors `set_final_report_node` — copies the draft into `final_report`
//! only if nothing has claimed that field already.

use crate::error::Result;
use crate::models::ResearchState;

pub async fn run(mut state: ResearchState) -> Result<ResearchState> {
    if state.final_report.is_empty() && !state.report_draft.is_empty() {
        state.final_report = state.report_draft.clone();
    }
    state.current_agent = "completed".to_string();
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn copies_draft_into_final_report_when_unset() {
        let mut state = ResearchState::new("task-1", "query");
        state.report_draft = "drafted report".to_string();
        let state = run(state).await.unwrap();
        assert_eq!(state.final_report, "drafted report");
        assert_eq!(state.current_agent, "completed");
    }

    #[tokio::test]
    async fn does_not_overwrite_an_already_set_final_report() {
        let mut state = ResearchState::new("task-1", "query");
        state.report_draft = "drafted report".to_string();
        state.final_report = "already decided".to_string();
        let state = run(state).await.unwrap();
        assert_eq!(state.final_report, "already decided");
    }
}
