//! Input validation at the HTTP boundary (§4.7): query length, depth, and
//! task id format are all checked here so handlers never see malformed
//! input and every rejection gets a consistent `400`.

use uuid::Uuid;

use crate::constants::{QUERY_MAX_LENGTH, QUERY_MIN_LENGTH};
use crate::error::{ResearchError, Result};
use crate::models::Depth;

pub fn validate_query(query: &str) -> Result<()> {
    let len = query.trim().chars().count();
    if len < QUERY_MIN_LENGTH {
        return Err(ResearchError::InputError(format!(
            "query must be at least {QUERY_MIN_LENGTH} characters"
        )));
    }
    if len > QUERY_MAX_LENGTH {
        return Err(ResearchError::InputError(format!(
            "query must be at most {QUERY_MAX_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_depth(depth: &str) -> Result<Depth> {
    depth.parse()
}

pub fn validate_task_id(task_id: &str) -> Result<Uuid> {
    Uuid::parse_str(task_id)
        .map_err(|_| ResearchError::InputError(format!("invalid task id: {task_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_queries_shorter_than_minimum() {
        assert!(validate_query("too short").is_err());
    }

    #[test]
    fn rejects_queries_longer_than_maximum() {
        let long = "a".repeat(QUERY_MAX_LENGTH + 1);
        assert!(validate_query(&long).is_err());
    }

    #[test]
    fn accepts_query_within_bounds() {
        assert!(validate_query("what are transformer attention mechanisms?").is_ok());
    }

    #[test]
    fn rejects_malformed_task_id() {
        assert!(validate_task_id("not-a-uuid").is_err());
    }

    #[test]
    fn rejects_unknown_depth() {
        assert!(validate_depth("extreme").is_err());
    }
}
