//! Validation node (§4.4.3): checks citations against the source list with a
//! plain regex (never delegated to the model) and combines that with an
//! LLM judgment of factual support to produce the final confidence score.

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::constants::{HITL_CONFIDENCE_THRESHOLD, VALIDATION_MAX_TOKENS, VALIDATION_TEMPERATURE};
use crate::error::Result;
use crate::models::{ApiCallOperation, ResearchState, ValidationResult};
use crate::retrieval::{format_context, ChatRequest};
use crate::telemetry::estimate_cost;

use super::AgentContext;

const SYSTEM_PROMPT: &str = "You are a meticulous fact checker. Given a report and the sources it \
was written from, judge whether every claim is supported. Respond with a JSON object: \
{\"confidence\": 0.0-1.0, \"unsupported_claims\": [string], \"issues\": [string]}. List any \
contradiction or inconsistency you find as an entry in \"issues\".";

fn citation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\[Source\s+(\d+)\]").unwrap())
}

/// Every distinct source number cited in `report`, in first-seen order.
fn extract_citations(report: &str) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for cap in citation_regex().captures_iter(report) {
        if let Ok(n) = cap[1].parse::<i64>() {
            if seen.insert(n) {
                out.push(n);
            }
        }
    }
    out
}

#[derive(Debug, Deserialize, Default)]
struct JudgmentResponse {
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    unsupported_claims: Vec<String>,
    #[serde(default)]
    issues: Vec<String>,
}

/// Contradiction signal is mined from the judgment's own issue list rather
/// than trusted as a model-reported boolean.
fn derive_has_contradictions(issues: &[String]) -> bool {
    issues.iter().any(|issue| {
        let lower = issue.to_lowercase();
        lower.contains("contradict") || lower.contains("inconsistent")
    })
}

fn parse_judgment(text: &str) -> JudgmentResponse {
    if let Ok(parsed) = serde_json::from_str::<JudgmentResponse>(text.trim()) {
        return parsed;
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            if let Ok(parsed) = serde_json::from_str::<JudgmentResponse>(&text[start..=end]) {
                return parsed;
            }
        }
    }
    JudgmentResponse::default()
}

pub async fn run(mut state: ResearchState, ctx: &AgentContext) -> Result<ResearchState> {
    let citations = extract_citations(&state.report_draft);
    let source_count = state.source_count as i64;
    let invalid_citations: Vec<i64> = citations
        .iter()
        .copied()
        .filter(|&n| n < 1 || n > source_count)
        .collect();
    let valid_count = citations.len() - invalid_citations.len();
    let citation_coverage = if source_count > 0 {
        valid_count as f64 / source_count as f64
    } else {
        0.0
    };

    let context = format_context(&state.retrieved_chunks);
    let prompt = format!(
        "Report:\n{}\n\nSources:\n{}",
        state.report_draft, context
    );

    let response = ctx
        .llm
        .chat(ChatRequest {
            model: "gpt-4o-mini".to_string(),
            system: Some(SYSTEM_PROMPT.to_string()),
            prompt,
            temperature: VALIDATION_TEMPERATURE,
            max_tokens: VALIDATION_MAX_TOKENS,
        })
        .await?;

    ctx.cost_ledger.log_api_call(
        "gpt-4o-mini",
        response.prompt_tokens,
        response.completion_tokens,
        ApiCallOperation::Validation,
        estimate_cost("gpt-4o-mini", response.prompt_tokens, response.completion_tokens),
        "chat_completion",
        0.0,
    )?;

    let judgment = parse_judgment(&response.text);
    let has_contradictions = derive_has_contradictions(&judgment.issues);

    let mut final_confidence = judgment.confidence;
    if !invalid_citations.is_empty() {
        final_confidence -= 0.3;
    }
    if judgment.unsupported_claims.len() >= 3 {
        final_confidence -= 0.2;
    }
    if has_contradictions {
        final_confidence -= 0.3;
    }
    final_confidence = final_confidence.clamp(0.0, 1.0);

    let needs_hitl = final_confidence < HITL_CONFIDENCE_THRESHOLD;

    state.validation_result = ValidationResult {
        valid: invalid_citations.is_empty() && !has_contradictions,
        llm_confidence: judgment.confidence,
        final_confidence,
        issues: judgment.issues,
        citation_coverage,
        invalid_citations,
        unsupported_claims: judgment.unsupported_claims,
        has_contradictions,
    };
    state.confidence_score = final_confidence;
    state.needs_hitl = needs_hitl;
    state.current_agent = if needs_hitl {
        "hitl_review".to_string()
    } else {
        "set_final_report".to_string()
    };
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_citations_is_case_insensitive_and_dedups() {
        let out = extract_citations("See [source 1] and [Source 2] and again [SOURCE 1].");
        assert_eq!(out, vec![1, 2]);
    }

    #[test]
    fn extract_citations_on_uncited_report_is_empty() {
        assert!(extract_citations("no citations here").is_empty());
    }

    #[test]
    fn parse_judgment_extracts_object_from_surrounding_prose() {
        let judgment = parse_judgment("Sure, here you go:\n{\"confidence\": 0.8, \"issues\": []}");
        assert_eq!(judgment.confidence, 0.8);
        assert!(judgment.issues.is_empty());
    }

    #[test]
    fn derive_has_contradictions_matches_contradict_and_inconsistent() {
        assert!(derive_has_contradictions(&["Source 2 Contradicts source 1".to_string()]));
        assert!(derive_has_contradictions(&["dates are inconsistent across sources".to_string()]));
        assert!(!derive_has_contradictions(&["claim is unsupported".to_string()]));
        assert!(!derive_has_contradictions(&[]));
    }
}
