use crate::cache::EmbeddingCache;
use crate::embeddings::{l2_normalize, Embedder};
use crate::error::{BenchError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// Request structure for OpenAI embeddings API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Response structure from OpenAI embeddings API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in API response
#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI embeddings client
///
/// Handles batch embedding generation with retry logic and rate limiting.
/// The HTTP client is async; an owned current-thread runtime turns each call
/// into a blocking one, so this type must not be used from inside another
/// tokio runtime.
pub struct OpenAIEmbedder {
    client: Client,
    runtime: Runtime,
    api_key: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
    max_retries: usize,
    cache: Option<Arc<EmbeddingCache>>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "text-embedding-3-small")
    /// * `dimensions` - Expected vector length
    /// * `batch_size` - Maximum number of texts to send per API request (max 2048)
    pub fn new(api_key: String, model: String, dimensions: usize, batch_size: usize) -> Result<Self> {
        Self::new_with_cache(api_key, model, dimensions, batch_size, None)
    }

    /// Create a new OpenAI embedder with an LRU cache for single-text embeddings
    pub fn new_with_cache(
        api_key: String,
        model: String,
        dimensions: usize,
        batch_size: usize,
        cache: Option<Arc<EmbeddingCache>>,
    ) -> Result<Self> {
        // OpenAI rejects larger batches
        let batch_size = batch_size.clamp(1, 2048);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BenchError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            client,
            runtime,
            api_key,
            model,
            dimensions,
            batch_size,
            max_retries: 3,
            cache,
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Only the text-embedding-3 family accepts a `dimensions` override
    fn requested_dimensions(&self) -> Option<usize> {
        if self.model.starts_with("text-embedding-3") {
            Some(self.dimensions)
        } else {
            None
        }
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.embed_batch_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);

            // Rate limiting: small delay between full batches
            if chunk.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }

        Ok(all_embeddings)
    }

    async fn embed_batch_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.embed_batch_internal(texts).await {
                Ok(embeddings) => {
                    log::debug!(
                        "Embedding API call for {} texts took {:?} (attempt {})",
                        texts.len(),
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(embeddings);
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    log::warn!("Retry {}/{} after error: {}", attempt + 1, self.max_retries, e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Single API request; returns normalized vectors in input order
    async fn embed_batch_internal(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions(),
        };

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| BenchError::Embedding(format!("Network error: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(BenchError::Embedding(format!(
                "OpenAI API error {}: {}",
                status, body
            )));
        }

        let mut result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| BenchError::Embedding(format!("Failed to parse response: {}", e)))?;

        if result.data.len() != texts.len() {
            return Err(BenchError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        result.data.sort_by_key(|d| d.index);

        result
            .data
            .into_iter()
            .map(|d| {
                let mut embedding = d.embedding;
                if embedding.len() != self.dimensions {
                    return Err(BenchError::Embedding(format!(
                        "Unexpected embedding dimension: expected {}, got {}",
                        self.dimensions,
                        embedding.len()
                    )));
                }
                l2_normalize(&mut embedding);
                Ok(embedding)
            })
            .collect()
    }
}

/// 429 rate limits and 5xx server errors are worth retrying
fn is_retryable(e: &BenchError) -> bool {
    let msg = e.to_string();
    ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| msg.contains(code))
}

impl Embedder for OpenAIEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text) {
                log::debug!("Cache hit for query: {}", text);
                return Ok(cached);
            }
        }

        let input = [text.to_string()];
        let mut embeddings = self.runtime.block_on(self.embed_batch_with_retry(&input))?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| BenchError::Embedding("Empty response from OpenAI API".to_string()))?;

        if let Some(cache) = &self.cache {
            cache.put(text.to_string(), embedding.clone());
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.runtime.block_on(self.embed_all(texts))
    }

    fn embedding_dim(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
