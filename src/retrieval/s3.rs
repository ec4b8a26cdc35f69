//! Blob store backed by S3's REST API, used to hydrate chunk bodies stored
//! under the `silver/chunks/{chunk_id}.json` convention (§4.1).

use async_trait::async_trait;
use reqwest::Client;

use crate::config::BlobStoreConfig;
use crate::error::{ResearchError, Result};

use super::BlobStore;

pub struct S3BlobStore {
    client: Client,
    endpoint: String,
}

impl S3BlobStore {
    pub fn new(config: &BlobStoreConfig, client: Client) -> Self {
        Self {
            client,
            endpoint: format!("https://{}.s3.{}.amazonaws.com", config.bucket_name, config.region),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, key)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(self.object_url(key))
            .send()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("s3 get failed: {e}")))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(ResearchError::ProviderError(format!(
                "s3 get {key} returned {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("s3 body read failed: {e}")))?;
        Ok(Some(body))
    }

    async fn put(&self, key: &str, body: &str) -> Result<()> {
        let resp = self
            .client
            .put(self.object_url(key))
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("s3 put failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ResearchError::ProviderError(format!(
                "s3 put {key} returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let resp = self
            .client
            .get(format!("{}?list-type=2&prefix={}", self.endpoint, prefix))
            .send()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("s3 list failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ResearchError::ProviderError(format!(
                "s3 list {prefix} returned {}",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ResearchError::ProviderError(format!("s3 list body read failed: {e}")))?;

        let keys = body
            .split("<Key>")
            .skip(1)
            .filter_map(|chunk| chunk.split("</Key>").next())
            .map(|s| s.to_string())
            .collect();
        Ok(keys)
    }
}
