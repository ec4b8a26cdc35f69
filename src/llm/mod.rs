//! HTTP-backed `LlmProvider` (§6), wrapping every call in the circuit
//! breaker kept from the original Claude Code integration plus a bounded
//! exponential-backoff retry loop — the original subprocess client never
//! needed retry since a failed CLI invocation just errored out, but a flaky
//! HTTP dependency does.

pub mod circuit_breaker;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::sleep;

use crate::config::LlmConfig;
use crate::constants::{RETRY_BASE_DELAY, RETRY_MAX_ATTEMPTS};
use crate::error::{ResearchError, Result};
use crate::retrieval::{ChatRequest, ChatResponse, LlmProvider};

use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

pub struct OpenAiLlmProvider {
    client: Client,
    api_key: String,
    base_url: String,
    breaker: CircuitBreaker,
}

impl OpenAiLlmProvider {
    pub fn new(config: &LlmConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
        }
    }

    /// Retries `op` with exponential backoff while the circuit allows
    /// requests, recording each outcome against the breaker.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if !self.breaker.should_allow_request().await {
                return Err(ResearchError::ProviderError(
                    "circuit breaker open, provider unavailable".to_string(),
                ));
            }

            match op().await {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(e) => {
                    self.breaker.record_failure().await;
                    attempt += 1;
                    if attempt >= RETRY_MAX_ATTEMPTS {
                        return Err(e);
                    }
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    tracing::warn!(attempt, error = %e, "provider call failed, retrying");
                    sleep(delay).await;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessageContent,
}

#[derive(Deserialize)]
struct ChatMessageContent {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.with_retry(|| async {
            let mut messages = Vec::new();
            if let Some(system) = &request.system {
                messages.push(ChatMessage {
                    role: "system".to_string(),
                    content: system.clone(),
                });
            }
            messages.push(ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            });

            let resp = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&ChatCompletionRequest {
                    model: request.model.clone(),
                    messages,
                    temperature: request.temperature,
                    max_tokens: request.max_tokens,
                })
                .send()
                .await
                .map_err(|e| ResearchError::ProviderError(format!("chat request failed: {e}")))?;

            if !resp.status().is_success() {
                return Err(ResearchError::ProviderError(format!(
                    "chat completion returned {}",
                    resp.status()
                )));
            }

            let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| {
                ResearchError::ProviderError(format!("chat response parse failed: {e}"))
            })?;

            let choice = parsed
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ResearchError::ProviderError("empty choices in chat response".to_string()))?;

            Ok(ChatResponse {
                text: choice.message.content,
                prompt_tokens: parsed.usage.prompt_tokens,
                completion_tokens: parsed.usage.completion_tokens,
            })
        })
        .await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.with_retry(|| async {
            let resp = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&json!({
                    "model": "text-embedding-3-small",
                    "input": text,
                }))
                .send()
                .await
                .map_err(|e| ResearchError::ProviderError(format!("embedding request failed: {e}")))?;

            if !resp.status().is_success() {
                return Err(ResearchError::ProviderError(format!(
                    "embedding endpoint returned {}",
                    resp.status()
                )));
            }

            let parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                ResearchError::ProviderError(format!("embedding response parse failed: {e}"))
            })?;

            let embedding = parsed
                .data
                .into_iter()
                .next()
                .map(|d| d.embedding)
                .ok_or_else(|| ResearchError::ProviderError("empty data in embedding response".to_string()))?;

            if embedding.len() != crate::constants::EMBEDDING_DIMENSIONS {
                tracing::warn!(
                    expected = crate::constants::EMBEDDING_DIMENSIONS,
                    actual = embedding.len(),
                    "embedding dimension mismatch"
                );
            }

            Ok(embedding)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use std::time::Duration;

    #[tokio::test]
    async fn circuit_opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            timeout_duration: Duration::from_secs(60),
            success_threshold: 1,
            failure_window: Duration::from_secs(300),
        });

        assert!(breaker.should_allow_request().await);
        breaker.record_failure().await;
        assert!(breaker.should_allow_request().await);
        breaker.record_failure().await;
        assert!(!breaker.should_allow_request().await);
    }
}
