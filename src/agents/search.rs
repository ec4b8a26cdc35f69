//! Search node (§4.4.1): expands the user query into sub-queries, runs
//! semantic search for each, dedups and hydrates the surviving hits.

use std::collections::HashSet;

use crate::constants::{
    QUERY_EXPANSION_MAX_TOKENS, QUERY_EXPANSION_TEMPERATURE, SEARCH_NAMESPACE,
    SEARCH_RESULTS_RETAINED, SEARCH_TOP_K,
};
use crate::error::{ResearchError, Result};
use crate::models::{ApiCallOperation, ResearchState};
use crate::retrieval::{hydrate_chunks, semantic_search, ChatRequest};
use crate::telemetry::estimate_cost;

use super::AgentContext;

const SYSTEM_PROMPT: &str = "You expand a research question into focused search queries. \
Respond with a JSON array of 3 to 5 short search query strings and nothing else.";

pub async fn run(mut state: ResearchState, ctx: &AgentContext) -> Result<ResearchState> {
    let expansion = ctx
        .llm
        .chat(ChatRequest {
            model: "gpt-4o-mini".to_string(),
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt: state.user_query.clone(),
            temperature: QUERY_EXPANSION_TEMPERATURE,
            max_tokens: QUERY_EXPANSION_MAX_TOKENS,
        })
        .await?;

    ctx.cost_ledger.log_api_call(
        "gpt-4o-mini",
        expansion.prompt_tokens,
        expansion.completion_tokens,
        ApiCallOperation::QueryExpansion,
        estimate_cost("gpt-4o-mini", expansion.prompt_tokens, expansion.completion_tokens),
        "chat_completion",
        0.0,
    )?;

    let queries = parse_query_list(&expansion.text);
    if queries.is_empty() {
        return Err(ResearchError::DataError(
            "query expansion produced no sub-queries".to_string(),
        ));
    }
    state.search_queries = queries.clone();

    let mut seen: HashSet<String> = HashSet::new();
    let mut hits = Vec::new();
    let mut any_succeeded = false;
    for query in &queries {
        match semantic_search(&*ctx.llm, &*ctx.vectors, query, SEARCH_TOP_K, SEARCH_NAMESPACE).await {
            Ok(results) => {
                any_succeeded = true;
                for hit in results {
                    if seen.insert(hit.dedup_key().to_string()) {
                        hits.push(hit);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "sub-query search failed, continuing with remaining queries");
            }
        }
    }
    if !any_succeeded {
        return Err(ResearchError::DataError(
            "all sub-query searches failed".to_string(),
        ));
    }

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(SEARCH_RESULTS_RETAINED);

    state.retrieved_chunks = hydrate_chunks(&*ctx.blobs, &hits).await?;
    state.source_count = state.retrieved_chunks.len();
    state.search_results = hits;
    state.current_agent = "synthesis".to_string();
    Ok(state)
}

/// Parses the model's sub-query list, tolerating a response wrapped in a
/// markdown code fence or surrounded by prose.
fn parse_query_list(text: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(text.trim()) {
        return list;
    }
    if let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) {
        if end > start {
            if let Ok(list) = serde_json::from_str::<Vec<String>>(&text[start..=end]) {
                return list;
            }
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_list_reads_plain_json_array() {
        let out = parse_query_list(r#"["a", "b", "c"]"#);
        assert_eq!(out, vec!["a", "b", "c"]);
    }

    #[test]
    fn parse_query_list_extracts_array_from_surrounding_prose() {
        let out = parse_query_list("Here are the queries:\n```json\n[\"x\", \"y\"]\n```");
        assert_eq!(out, vec!["x", "y"]);
    }

    #[test]
    fn parse_query_list_returns_empty_on_garbage() {
        assert!(parse_query_list("not json at all").is_empty());
    }
}
