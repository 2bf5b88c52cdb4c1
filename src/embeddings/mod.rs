//! Embedding capability used by the dense retrievers.
//!
//! Retrievers receive an `Arc<dyn Embedder>` at construction; the model is
//! built once at startup by [`build_embedder`] and shared.

pub mod hashing;
pub mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAIEmbedder;

use crate::cache::EmbeddingCache;
use crate::config::EmbeddingsConfig;
use crate::error::{BenchError, Result};
use std::sync::Arc;

/// Turns text into fixed-length, L2-normalized vectors.
///
/// Every call is blocking and atomic from the caller's point of view.
pub trait Embedder: Send + Sync {
    /// Embed a single text (queries)
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, one vector per input in the same order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every returned vector
    fn embedding_dim(&self) -> usize;

    /// Stable model identifier, used in cache keys and retriever names
    fn model_name(&self) -> &str;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of two equal-length vectors
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Construct the configured embedder.
///
/// Fails with `MissingDependency` when the provider is not one this build supports.
pub fn build_embedder(config: &EmbeddingsConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                BenchError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                    config.api_key_env
                ))
            })?;

            // Repeated evaluation queries hit the LRU instead of the API
            let cache = if config.cache_capacity > 0 {
                Some(Arc::new(EmbeddingCache::new(config.cache_capacity)))
            } else {
                None
            };

            let embedder = OpenAIEmbedder::new_with_cache(
                api_key,
                config.model.clone(),
                config.dimensions,
                config.batch_size,
                cache,
            )?
            .with_max_retries(config.max_retries);
            Ok(Arc::new(embedder))
        }
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        other => Err(BenchError::MissingDependency(format!(
            "embedding provider '{}' is not available in this build; supported providers: openai, hashing",
            other
        ))),
    }
}
