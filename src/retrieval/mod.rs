//! Retrieval Library (§4.1): capability traits for the external services the
//! agent nodes depend on, plus the pure operations built on top of them.
//!
//! Keeping `LlmProvider`, `VectorStore` and `BlobStore` as narrow traits lets
//! the agent nodes and the workflow engine stay entirely free of HTTP/SDK
//! detail — tests exercise them against in-memory fakes instead of real
//! network calls.

pub mod pinecone;
pub mod s3;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{RetrievedChunk, SearchResult};

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn query(&self, embedding: &[f32], top_k: usize, namespace: &str)
        -> Result<Vec<SearchResult>>;

    async fn upsert(&self, namespace: &str, id: &str, embedding: &[f32]) -> Result<()>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, body: &str) -> Result<()>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Embeds `query` and runs it against the vector store, mirroring
/// `semantic_search` — errors from the embedding or query step are
/// propagated, never swallowed (unlike chunk hydration below).
pub async fn semantic_search(
    llm: &dyn LlmProvider,
    vectors: &dyn VectorStore,
    query: &str,
    top_k: usize,
    namespace: &str,
) -> Result<Vec<SearchResult>> {
    let embedding = llm.embed(query).await?;
    let mut results = vectors.query(&embedding, top_k, namespace).await?;
    for r in &mut results {
        r.origin_query = Some(query.to_string());
    }
    Ok(results)
}

/// `silver/chunks/{chunk_id}.json` convention for the chunk blob key.
fn chunk_blob_key(chunk_id: &str) -> String {
    format!("silver/chunks/{chunk_id}.json")
}

#[derive(Debug, Deserialize)]
struct StoredChunk {
    #[serde(default)]
    chunk_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Fetches full chunk bodies for a set of search hits. A chunk that fails to
/// fetch or parse is logged and skipped rather than failing the whole batch —
/// one bad chunk should not sink an entire research run.
pub async fn hydrate_chunks(
    blobs: &dyn BlobStore,
    hits: &[SearchResult],
) -> Result<Vec<RetrievedChunk>> {
    let mut chunks = Vec::with_capacity(hits.len());
    for hit in hits {
        let chunk_id = hit.chunk_id.clone().unwrap_or_else(|| hit.doc_id.clone());
        let key = chunk_blob_key(&chunk_id);
        let body = match blobs.get(&key).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::warn!(chunk_id, "chunk blob missing, skipping");
                continue;
            }
            Err(e) => {
                tracing::warn!(chunk_id, error = %e, "failed to fetch chunk, skipping");
                continue;
            }
        };

        let (text, title, url, resolved_id) = match serde_json::from_str::<StoredChunk>(&body) {
            Ok(parsed) => {
                let text = parsed.text.or(parsed.content).unwrap_or_else(|| body.clone());
                let id = parsed.chunk_id.unwrap_or(chunk_id.clone());
                (text, parsed.title, parsed.url, id)
            }
            Err(_) => (body.clone(), None, None, chunk_id.clone()),
        };

        chunks.push(RetrievedChunk {
            chunk_id: resolved_id,
            doc_id: hit.doc_id.clone(),
            text,
            title: title.or_else(|| hit.title.clone()),
            url: url.or_else(|| hit.url.clone()),
            score: hit.score,
        });
    }
    Ok(chunks)
}

/// Exact context-block format expected by the synthesis and validation
/// prompts: one block per chunk, numbered 1-based, with a blank line
/// separator, trailing whitespace stripped.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    let mut blocks = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let title = chunk.title.as_deref().unwrap_or("Untitled");
        let doc_id = if chunk.doc_id.is_empty() {
            "unknown"
        } else {
            chunk.doc_id.as_str()
        };
        let url = chunk.url.as_deref().unwrap_or("N/A");
        blocks.push(format!(
            "[Source {}] Title: {} (Doc ID: {}, URL: {})\nContent: {}\n",
            i + 1,
            title,
            doc_id,
            url,
            chunk.text
        ));
    }
    blocks.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(n: &str, title: Option<&str>, doc_id: &str, url: Option<&str>, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: n.to_string(),
            doc_id: doc_id.to_string(),
            text: text.to_string(),
            title: title.map(str::to_string),
            url: url.map(str::to_string),
            score: 0.9,
        }
    }

    #[test]
    fn format_context_fills_fallbacks_for_missing_fields() {
        let chunks = vec![chunk("c1", None, "", None, "some text")];
        let out = format_context(&chunks);
        assert_eq!(
            out,
            "[Source 1] Title: Untitled (Doc ID: unknown, URL: N/A)\nContent: some text"
        );
    }

    #[test]
    fn format_context_numbers_sources_sequentially_and_separates_with_blank_line() {
        let chunks = vec![
            chunk("c1", Some("A"), "doc-1", Some("https://a"), "first"),
            chunk("c2", Some("B"), "doc-2", Some("https://b"), "second"),
        ];
        let out = format_context(&chunks);
        assert!(out.contains("[Source 1] Title: A (Doc ID: doc-1, URL: https://a)\nContent: first"));
        assert!(out.contains("[Source 2] Title: B (Doc ID: doc-2, URL: https://b)\nContent: second"));
        assert!(out.contains("first\n\n[Source 2]"));
    }

    #[test]
    fn format_context_of_empty_chunks_is_empty_string() {
        assert_eq!(format_context(&[]), "");
    }
}
