use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::LlmConfig;

/// Maximum characters to send per text to the embedding API. Wiki pages can
/// run to hundreds of kilobytes; anything past this prefix adds little to the
/// embedding and risks blowing the model's context window.
const MAX_EMBED_CHARS: usize = 8_000;

/// Truncate `text` to at most `MAX_EMBED_CHARS`, splitting on a UTF-8 char boundary.
pub fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Embedding provider seam. The vector index only sees this trait, so tests
/// swap in [`MockEmbedder`] and production wires up [`HttpEmbedder`].
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimensions(&self) -> usize;
}

// ─── OpenAI-compatible HTTP embedder ─────────────────────

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Embeddings via an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.config.base_url);

        let req = EmbedRequest {
            model: self.config.embedding_model.clone(),
            input: vec![truncate_for_embedding(text).to_string()],
        };

        let mut request = self.client.post(&url).json(&req);
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let resp = request
            .send()
            .await
            .context("Failed to call embeddings API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Embeddings API returned {status}: {body}");
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .context("Failed to parse embeddings response")?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("No embedding returned")
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dim
    }
}

// ─── Deterministic test embedder ─────────────────────────

/// Deterministic embedder for tests: the vector is derived from a SHA-256
/// digest of the text, so equal texts embed identically and the call counter
/// exposes whether a cache actually short-circuited the call.
pub struct MockEmbedder {
    dims: usize,
    fail: bool,
    pub call_count: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fail: false,
            call_count: AtomicUsize::new(0),
        }
    }

    /// An embedder whose every call fails, for degraded-path tests.
    pub fn failing(dims: usize) -> Self {
        Self {
            dims,
            fail: true,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("mock embedder configured to fail");
        }
        let digest = Sha256::digest(text.as_bytes());
        let vector = (0..self.dims)
            .map(|i| digest[i % digest.len()] as f32 / 255.0 + 0.01)
            .collect();
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate_for_embedding("hello"), "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // Multi-byte chars straddling the cut point must not split
        let text = "é".repeat(MAX_EMBED_CHARS);
        let truncated = truncate_for_embedding(&text);
        assert!(truncated.len() <= MAX_EMBED_CHARS);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_mock_embedder_is_deterministic() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.embed("expense policy").await.unwrap();
        let b = embedder.embed("expense policy").await.unwrap();
        let c = embedder.embed("vacation policy").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_failing_mock_embedder_errors() {
        let embedder = MockEmbedder::failing(8);
        assert!(embedder.embed("anything").await.is_err());
        assert_eq!(embedder.calls(), 1);
    }
}
