//! Brute-force dense index shared by the embedding retrievers.
//!
//! Rows are unit vectors, so the dot product is the cosine similarity.

use crate::cache::{CacheEntries, CacheKind, VectorCache};
use crate::corpus::Corpus;
use crate::embeddings::{dot, Embedder};
use crate::error::{BenchError, Result};
use std::cmp::Ordering;
use std::path::Path;

/// Row-aligned ids and vectors
#[derive(Debug, Clone, Default)]
pub struct DenseIndex {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl DenseIndex {
    pub fn new(ids: Vec<String>, vectors: Vec<Vec<f32>>, dimension: usize) -> Result<Self> {
        if ids.len() != vectors.len() {
            return Err(BenchError::InvalidInput(format!(
                "{} ids for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(BenchError::Embedding(format!(
                "Unexpected embedding dimension: expected {}, got {}",
                dimension,
                bad.len()
            )));
        }
        Ok(Self {
            ids,
            vectors,
            dimension,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn id(&self, row: usize) -> &str {
        &self.ids[row]
    }

    /// Similarity of the query against every row, in row order
    pub fn similarities(&self, query: &[f32]) -> Result<Vec<f32>> {
        if query.len() != self.dimension {
            return Err(BenchError::Embedding(format!(
                "Query embedding has dimension {}, index has {}",
                query.len(),
                self.dimension
            )));
        }
        Ok(self.vectors.iter().map(|v| dot(query, v)).collect())
    }

    /// Best `n` (row, score) pairs
    pub fn search(&self, query: &[f32], n: usize) -> Result<Vec<(usize, f32)>> {
        Ok(top_k_indices(&self.similarities(query)?, n))
    }

    /// One row per corpus section, embedded from `Section::embedding_text`.
    ///
    /// A valid cache at `cache_file` is reused; a stale one is rebuilt and
    /// overwritten. Row order follows the cache when reused, the corpus otherwise.
    pub fn build_for_sections(
        corpus: &Corpus,
        embedder: &dyn Embedder,
        cache_file: Option<&Path>,
    ) -> Result<Self> {
        let dimension = embedder.embedding_dim();
        let expected_ids = corpus.id_set();

        let cached = load_valid_cache(cache_file, |cache| {
            cache.validate(
                CacheKind::Sections,
                embedder.model_name(),
                0,
                dimension,
                &expected_ids,
            )
        })?;
        if let Some(VectorCache {
            entries: CacheEntries::Sections(ids),
            embeddings,
            ..
        }) = cached
        {
            return Self::new(ids, embeddings, dimension);
        }

        let ids = corpus.ids();
        let texts: Vec<String> = corpus.iter().map(|s| s.embedding_text()).collect();
        log::info!(
            "Embedding {} sections with {}",
            texts.len(),
            embedder.model_name()
        );
        let embeddings = embed_all(embedder, &texts)?;

        store_cache(
            cache_file,
            &VectorCache {
                model_name: embedder.model_name().to_string(),
                chunk_size: 0,
                dimension,
                entries: CacheEntries::Sections(ids.clone()),
                embeddings: embeddings.clone(),
            },
        )?;

        Self::new(ids, embeddings, dimension)
    }
}

/// Indices of the `n` highest scores, best first. Equal scores keep input order.
pub fn top_k_indices(scores: &[f32], n: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(n);
    ranked
}

/// Embed texts in one batch call and check the returned shape.
pub(crate) fn embed_all(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let embeddings = embedder.embed_batch(texts)?;
    if embeddings.len() != texts.len() {
        return Err(BenchError::Embedding(format!(
            "Embedder returned {} vectors for {} texts",
            embeddings.len(),
            texts.len()
        )));
    }
    Ok(embeddings)
}

/// Read the cache at `cache_file` and run `check` on it.
///
/// `Ok(None)` means "build from scratch": caching is disabled, no file exists,
/// or the file no longer matches (logged). Unreadable files are errors.
pub(crate) fn load_valid_cache<F>(cache_file: Option<&Path>, check: F) -> Result<Option<VectorCache>>
where
    F: FnOnce(&VectorCache) -> Result<()>,
{
    let path = match cache_file {
        Some(path) => path,
        None => return Ok(None),
    };

    let cache = match VectorCache::read(path)? {
        Some(cache) => cache,
        None => {
            log::debug!("No vector cache at {}", path.display());
            return Ok(None);
        }
    };

    match check(&cache) {
        Ok(()) => {
            log::info!(
                "Loaded {} cached embeddings from {}",
                cache.entries.len(),
                path.display()
            );
            Ok(Some(cache))
        }
        Err(BenchError::CacheMismatch(reason)) => {
            log::warn!(
                "Vector cache {} is stale ({}), rebuilding",
                path.display(),
                reason
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub(crate) fn store_cache(cache_file: Option<&Path>, cache: &VectorCache) -> Result<()> {
    if let Some(path) = cache_file {
        cache.write(path)?;
        log::info!("Saved {} embeddings to {}", cache.entries.len(), path.display());
    }
    Ok(())
}
