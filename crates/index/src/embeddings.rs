use anyhow::{Context, Result};
use async_trait::async_trait;
use extract::{AttemptError, RetryPolicy};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::debug;

/// Text embedding transport. Output order matches input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of the vectors this embedder produces, from one probe request.
    async fn get_dimension(&self) -> Result<usize> {
        let probe = self.embed(&["test".to_string()]).await?;
        probe
            .first()
            .map(Vec::len)
            .context("Embedding service returned no vectors")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens_per_call: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            max_tokens_per_call: 8000,
        }
    }
}

#[derive(Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    max_tokens_per_call: usize,
    policy: RetryPolicy,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Rough token count: one token per four characters, at least one.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}

/// Greedy consecutive packing under a token budget.
///
/// A text larger than the budget on its own forms a single-item batch.
pub fn pack_batches(texts: &[String], max_tokens: usize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut used = 0;

    for (idx, text) in texts.iter().enumerate() {
        let tokens = estimate_tokens(text);
        if idx > start && used + tokens > max_tokens {
            batches.push(start..idx);
            start = idx;
            used = 0;
        }
        used += tokens;
    }

    if start < texts.len() {
        batches.push(start..texts.len());
    }
    batches
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig, policy: RetryPolicy) -> Self {
        Self {
            base_url: config.base_url,
            model: config.model,
            max_tokens_per_call: config.max_tokens_per_call.max(1),
            policy,
            client: reqwest::Client::new(),
        }
    }

    pub fn default() -> Self {
        Self::new(EmbeddingConfig::default(), RetryPolicy::default())
    }

    /// One `/api/embed` round trip.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        if !response.status().is_success() {
            anyhow::bail!("Embedding request failed: {}", response.status());
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if embedding_response.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: sent {}, received {}",
                texts.len(),
                embedding_response.embeddings.len()
            );
        }

        Ok(embedding_response.embeddings)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches = pack_batches(texts, self.max_tokens_per_call);
        debug!(texts = texts.len(), batches = batches.len(), "Embedding request packed");

        let results = try_join_all(batches.into_iter().map(|range| async move {
            self.policy
                .retry("embedding", || async {
                    self.embed_batch(&texts[range.clone()])
                        .await
                        .map_err(AttemptError::Transient)
                })
                .await
                .map_err(anyhow::Error::from)
        }))
        .await?;

        Ok(results.into_iter().flatten().collect())
    }
}
