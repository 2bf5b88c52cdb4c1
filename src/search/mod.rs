//! Retriever family: a common contract and four strategies.
//!
//! | kind       | index                          | query path                       |
//! |------------|--------------------------------|----------------------------------|
//! | baseline   | external vectors per section   | caller supplies the query vector |
//! | section    | one embedding per section      | dense top-k                      |
//! | sentence   | embeddings of sentence windows | dense top-3k, dedup to sections  |
//! | hybrid     | BM25 + one embedding/section   | RRF over sparse and dense top-3k |

pub mod baseline;
pub mod bm25;
pub mod dense;
pub mod fusion;
pub mod hybrid;
pub mod section;
pub mod sentence;

pub use baseline::BaselineRetriever;
pub use hybrid::HybridRetriever;
pub use section::SectionRetriever;
pub use sentence::SentenceChunkRetriever;

use crate::config::Config;
use crate::corpus::{Corpus, Section};
use crate::embeddings::Embedder;
use crate::error::{BenchError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// One ranked hit. Lists of results are ordered by `score` descending.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub section_id: String,
    pub score: f32,
    pub title: String,
    pub content: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RetrievalResult {
    pub fn from_section(section: &Section, score: f32) -> Self {
        Self {
            section_id: section.id.clone(),
            score,
            title: section.title.clone(),
            content: section.content.clone(),
            metadata: HashMap::new(),
        }
    }
}

/// Timing captured by [`Retriever::retrieve_with_metrics`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RetrievalMetrics {
    pub latency_ms: f64,
    pub result_count: usize,
}

/// Index lifecycle. A retriever starts `NotBuilt`; `build_index` replaces the
/// whole value with an immutable `Built` index.
#[derive(Debug)]
pub enum IndexState<T> {
    NotBuilt,
    Built(T),
}

impl<T> Default for IndexState<T> {
    fn default() -> Self {
        IndexState::NotBuilt
    }
}

impl<T> IndexState<T> {
    /// The built index, or `IndexNotBuilt` naming the retriever
    pub fn get(&self, retriever_name: &str) -> Result<&T> {
        match self {
            IndexState::Built(index) => Ok(index),
            IndexState::NotBuilt => Err(BenchError::IndexNotBuilt(retriever_name.to_string())),
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self, IndexState::Built(_))
    }
}

/// Common contract for every retrieval strategy.
///
/// `build_index` must complete before `retrieve`; neither is meant to run
/// concurrently with the other on the same instance.
pub trait Retriever {
    /// Stable identifier, unique per configuration; used as the report key
    fn name(&self) -> String;

    /// Index the corpus, reusing a valid on-disk cache when one exists
    fn build_index(&mut self, corpus: &Corpus) -> Result<()>;

    /// At most `top_k` results, best first
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>>;

    /// `retrieve` plus wall-clock latency
    fn retrieve_with_metrics(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<(Vec<RetrievalResult>, RetrievalMetrics)> {
        let start = Instant::now();
        let results = self.retrieve(query, top_k)?;
        let metrics = RetrievalMetrics {
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            result_count: results.len(),
        };
        Ok((results, metrics))
    }
}

/// Retriever variants selectable from configuration or the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieverKind {
    Baseline,
    Section,
    SentenceChunk,
    Hybrid,
}

impl RetrieverKind {
    pub const ALL: [RetrieverKind; 4] = [
        RetrieverKind::Baseline,
        RetrieverKind::Section,
        RetrieverKind::SentenceChunk,
        RetrieverKind::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetrieverKind::Baseline => "baseline",
            RetrieverKind::Section => "section",
            RetrieverKind::SentenceChunk => "sentence",
            RetrieverKind::Hybrid => "hybrid",
        }
    }

    /// Build an unindexed retriever of this kind from configuration
    pub fn create(&self, config: &Config, embedder: Arc<dyn Embedder>) -> Box<dyn Retriever> {
        let cache_dir = Some(config.cache_dir().to_path_buf());
        match self {
            RetrieverKind::Baseline => Box::new(BaselineRetriever::new()),
            RetrieverKind::Section => Box::new(SectionRetriever::new(embedder, cache_dir)),
            RetrieverKind::SentenceChunk => Box::new(SentenceChunkRetriever::new(
                embedder,
                config.chunking.chunk_size,
                config.chunking.expand_to_section,
                cache_dir,
            )),
            RetrieverKind::Hybrid => Box::new(
                HybridRetriever::new(embedder, cache_dir)
                    .with_bm25_params(config.hybrid.k1, config.hybrid.b)
                    .with_dense_weight(config.hybrid.dense_weight)
                    .with_rrf_k(config.hybrid.rrf_k),
            ),
        }
    }
}

impl FromStr for RetrieverKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "baseline" => Ok(RetrieverKind::Baseline),
            "section" => Ok(RetrieverKind::Section),
            "sentence" | "sentence_chunk" | "sentence-chunk" => Ok(RetrieverKind::SentenceChunk),
            "hybrid" => Ok(RetrieverKind::Hybrid),
            other => Err(BenchError::InvalidInput(format!(
                "unknown retriever '{}' (expected baseline, section, sentence or hybrid)",
                other
            ))),
        }
    }
}
