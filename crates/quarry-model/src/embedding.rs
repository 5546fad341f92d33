// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::ModelError;

/// Embedding provider seam.  One call embeds one batch; the result has
/// the same length and order as the input.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// The fixed dimension every returned vector must have.
    fn dimensions(&self) -> usize;
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbeddingClient {
    embeddings_url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    client: reqwest::Client,
}

impl OpenAiEmbeddingClient {
    /// `base_url` ends before `/embeddings`, e.g. `http://host:8082/v1`.
    pub fn new(base_url: &str, model: String, api_key: Option<String>, dimensions: usize) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            embeddings_url: format!("{base}/embeddings"),
            model,
            api_key,
            dimensions,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = inputs.len(), model = %self.model, "embedding batch");

        let body = json!({
            "model": self.model,
            "input": inputs,
        });
        let mut http_req = self.client.post(&self.embeddings_url).json(&body);
        if let Some(key) = &self.api_key {
            http_req = http_req.bearer_auth(key);
        }
        let resp = http_req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ModelError::refused(status, text));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| ModelError::ProviderMalformed(format!("invalid JSON body: {e}")))?;
        let data = v["data"]
            .as_array()
            .ok_or_else(|| ModelError::ProviderMalformed("response has no data array".into()))?;

        if data.len() != inputs.len() {
            return Err(ModelError::ProviderMalformed(format!(
                "embedding count mismatch: sent {}, got {}",
                inputs.len(),
                data.len()
            )));
        }

        // The API is not required to return items in order; sort by index.
        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for item in data {
            let idx = item["index"].as_u64().unwrap_or(0) as usize;
            let emb: Vec<f32> = item["embedding"]
                .as_array()
                .ok_or_else(|| ModelError::ProviderMalformed("item has no embedding".into()))?
                .iter()
                .map(|n| n.as_f64().unwrap_or(0.0) as f32)
                .collect();
            if emb.len() != self.dimensions {
                return Err(ModelError::ProviderMalformed(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    emb.len()
                )));
            }
            indexed.push((idx, emb));
        }
        indexed.sort_by_key(|(i, _)| *i);
        Ok(indexed.into_iter().map(|(_, e)| e).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        // No request is made for an empty batch, so an unreachable URL is fine.
        let c = OpenAiEmbeddingClient::new("http://127.0.0.1:1/v1", "m".into(), None, 4);
        let out = c.embed(&[]).await.unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn dimensions_reports_configured_value() {
        let c = OpenAiEmbeddingClient::new("http://x/v1", "m".into(), None, 768);
        assert_eq!(c.dimensions(), 768);
    }

    #[test]
    fn url_is_derived_from_base() {
        let c = OpenAiEmbeddingClient::new("http://x/v1/", "m".into(), None, 8);
        assert_eq!(c.embeddings_url, "http://x/v1/embeddings");
    }
}
