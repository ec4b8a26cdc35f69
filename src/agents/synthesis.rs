//! Synthesis node (§4.4.2): broadens recall with one more semantic search
//! pass over the original query, then asks the model to draft a cited report
//! over the merged, deduplicated context.

use crate::constants::{
    SEARCH_NAMESPACE, SYNTHESIS_MAX_SOURCES, SYNTHESIS_MAX_TOKENS, SYNTHESIS_MIN_RECOMMENDED_SOURCES,
    SYNTHESIS_TEMPERATURE, SYNTHESIS_TOP_K,
};
use crate::error::{ResearchError, Result};
use crate::models::{ApiCallOperation, ResearchState};
use crate::retrieval::{format_context, hydrate_chunks, semantic_search, ChatRequest};
use crate::telemetry::estimate_cost;

use super::AgentContext;

const SYSTEM_PROMPT: &str = "You are a research assistant. Using only the numbered sources in the \
context, write a well-organized report answering the user's question. Cite every claim with a \
bracketed reference like [Source 2]. Do not invent sources or facts not present in the context.";

pub async fn run(mut state: ResearchState, ctx: &AgentContext) -> Result<ResearchState> {
    if state.retrieved_chunks.is_empty() {
        return Err(ResearchError::DataError(
            "no sources available for synthesis".to_string(),
        ));
    }

    let broader = semantic_search(
        &*ctx.llm,
        &*ctx.vectors,
        &state.user_query,
        SYNTHESIS_TOP_K,
        SEARCH_NAMESPACE,
    )
    .await?;
    let broader_chunks = hydrate_chunks(&*ctx.blobs, &broader).await?;

    let mut seen: std::collections::HashSet<String> = state
        .retrieved_chunks
        .iter()
        .map(|c| c.dedup_key().to_string())
        .collect();
    for chunk in broader_chunks {
        if seen.insert(chunk.dedup_key().to_string()) {
            state.retrieved_chunks.push(chunk);
        }
    }
    state.retrieved_chunks.truncate(SYNTHESIS_MAX_SOURCES);
    state.source_count = state.retrieved_chunks.len();

    if state.source_count < SYNTHESIS_MIN_RECOMMENDED_SOURCES {
        tracing::warn!(
            source_count = state.source_count,
            recommended = SYNTHESIS_MIN_RECOMMENDED_SOURCES,
            "fewer sources than recommended for synthesis"
        );
    }

    let context = format_context(&state.retrieved_chunks);
    let prompt = format!(
        "Question: {}\n\nContext:\n{}",
        state.user_query, context
    );

    let response = ctx
        .llm
        .chat(ChatRequest {
            model: "gpt-4o-mini".to_string(),
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt,
            temperature: SYNTHESIS_TEMPERATURE,
            max_tokens: SYNTHESIS_MAX_TOKENS,
        })
        .await?;

    ctx.cost_ledger.log_api_call(
        "gpt-4o-mini",
        response.prompt_tokens,
        response.completion_tokens,
        ApiCallOperation::Synthesis,
        estimate_cost("gpt-4o-mini", response.prompt_tokens, response.completion_tokens),
        "chat_completion",
        0.0,
    )?;

    state.report_draft = response.text;
    state.current_agent = "validation".to_string();
    Ok(state)
}
