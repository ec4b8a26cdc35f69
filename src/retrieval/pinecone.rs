//! Vector store backed by Pinecone's query/upsert REST API (§4.1).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::VectorStoreConfig;
use crate::error::{ResearchError, Result};
use crate::models::SearchResult;

use super::VectorStore;

pub struct PineconeVectorStore {
    client: Client,
    api_key: String,
    index_host: String,
}

impl PineconeVectorStore {
    pub fn new(config: &VectorStoreConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            index_host: format!("https://{}.svc.pinecone.io", config.index_name),
        }
    }
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    namespace: &'a str,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    matches: Vec<Match>,
}

#[derive(Deserialize)]
struct Match {
    id: String,
    score: f64,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    namespace: &'a str,
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn query(
        &self,
        embedding: &[f32],
        top_k: usize,
        namespace: &str,
    ) -> Result<Vec<SearchResult>> {
        let resp = self
            .client
            .post(format!("{}/query", self.index_host))
            .header("Api-Key", &self.api_key)
            .json(&QueryRequest {
                vector: embedding,
                top_k,
                namespace,
                include_metadata: true,
            })
            .send()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("pinecone query failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ResearchError::ProviderError(format!(
                "pinecone query returned {}",
                resp.status()
            )));
        }

        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("pinecone response parse failed: {e}")))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| {
                let meta = &m.metadata;
                SearchResult {
                    doc_id: m.id,
                    chunk_id: meta.get("chunk_id").and_then(|v| v.as_str()).map(str::to_string),
                    score: m.score,
                    text: meta.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                    title: meta.get("title").and_then(|v| v.as_str()).map(str::to_string),
                    url: meta.get("url").and_then(|v| v.as_str()).map(str::to_string),
                    origin_query: None,
                    extra_metadata: Default::default(),
                }
            })
            .collect())
    }

    async fn upsert(&self, namespace: &str, id: &str, embedding: &[f32]) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/vectors/upsert", self.index_host))
            .header("Api-Key", &self.api_key)
            .json(&UpsertRequest {
                vectors: vec![UpsertVector { id, values: embedding }],
                namespace,
            })
            .send()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("pinecone upsert failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(ResearchError::ProviderError(format!(
                "pinecone upsert returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
