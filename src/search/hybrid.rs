//! Sparse + dense retrieval fused with weighted Reciprocal Rank Fusion.
//!
//! BM25 runs over `title + " " + content`, the dense side over one embedding
//! per section. Each side contributes its top `3 × top_k` candidates; RRF
//! combines them by rank and the fused list is cut to `top_k`.

use super::bm25::{Bm25Index, DEFAULT_B, DEFAULT_K1};
use super::dense::DenseIndex;
use super::fusion::{reciprocal_rank_fusion, DEFAULT_RRF_K};
use super::{IndexState, RetrievalResult, Retriever};
use crate::cache::VectorCache;
use crate::corpus::Corpus;
use crate::embeddings::Embedder;
use crate::error::{BenchError, Result};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

const CACHE_PREFIX: &str = "hybrid";
const OVERFETCH: usize = 3;
pub const DEFAULT_DENSE_WEIGHT: f32 = 0.5;

struct HybridIndex {
    sparse: Bm25Index,
    dense: DenseIndex,
    /// Dense row -> corpus position; both rankings are fused in corpus positions
    dense_positions: Vec<usize>,
    corpus: Corpus,
}

pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    cache_dir: Option<PathBuf>,
    k1: f32,
    b: f32,
    dense_weight: f32,
    rrf_k: f32,
    state: IndexState<HybridIndex>,
}

impl HybridRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            embedder,
            cache_dir,
            k1: DEFAULT_K1,
            b: DEFAULT_B,
            dense_weight: DEFAULT_DENSE_WEIGHT,
            rrf_k: DEFAULT_RRF_K,
            state: IndexState::NotBuilt,
        }
    }

    pub fn with_bm25_params(mut self, k1: f32, b: f32) -> Self {
        self.k1 = k1;
        self.b = b;
        self
    }

    /// Weight of the dense ranking; the sparse ranking gets `1 - dense_weight`.
    /// Clamped to `[0, 1]`.
    pub fn with_dense_weight(mut self, dense_weight: f32) -> Self {
        self.dense_weight = dense_weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_rrf_k(mut self, rrf_k: f32) -> Self {
        self.rrf_k = rrf_k;
        self
    }

    pub fn dense_weight(&self) -> f32 {
        self.dense_weight
    }

    fn cache_file(&self) -> Option<PathBuf> {
        self.cache_dir
            .as_deref()
            .map(|dir| {
                VectorCache::path_for(
                    dir,
                    CACHE_PREFIX,
                    self.embedder.model_name(),
                    self.embedder.embedding_dim(),
                    None,
                )
            })
    }
}

impl Retriever for HybridRetriever {
    fn name(&self) -> String {
        let mut name = format!(
            "hybrid_{}_d{}_dw{}_k1{}_b{}",
            self.embedder.model_name(),
            self.embedder.embedding_dim(),
            self.dense_weight,
            self.k1,
            self.b
        );
        if self.rrf_k != DEFAULT_RRF_K {
            name.push_str(&format!("_rrf{}", self.rrf_k));
        }
        name
    }

    fn build_index(&mut self, corpus: &Corpus) -> Result<()> {
        let documents: Vec<String> = corpus
            .iter()
            .map(|s| format!("{} {}", s.title, s.content))
            .collect();
        let sparse = Bm25Index::build(&documents, self.k1, self.b);

        let cache_file = self.cache_file();
        let dense = DenseIndex::build_for_sections(corpus, self.embedder.as_ref(), cache_file.as_deref())?;

        let positions: HashMap<&str, usize> = corpus
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.id.as_str(), pos))
            .collect();
        let dense_positions = dense
            .ids()
            .iter()
            .map(|id| {
                positions.get(id.as_str()).copied().ok_or_else(|| {
                    BenchError::InvalidInput(format!("dense row for unknown section {}", id))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        log::info!(
            "{}: indexed {} sections (sparse + dense)",
            self.name(),
            corpus.len()
        );
        self.state = IndexState::Built(HybridIndex {
            sparse,
            dense,
            dense_positions,
            corpus: corpus.clone(),
        });
        Ok(())
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let index = self.state.get(&self.name())?;
        if index.corpus.is_empty() {
            return Ok(Vec::new());
        }
        let candidates = top_k.saturating_mul(OVERFETCH);

        let sparse = index.sparse.top_n(query, candidates);

        let query_vec = self.embedder.embed(query)?;
        let dense: Vec<(usize, f32)> = index
            .dense
            .search(&query_vec, candidates)?
            .into_iter()
            .map(|(row, score)| (index.dense_positions[row], score))
            .collect();

        log::debug!(
            "Hybrid candidates for {:?}: {} sparse, {} dense",
            query,
            sparse.len(),
            dense.len()
        );

        let sparse_rank: HashMap<usize, usize> =
            sparse.iter().enumerate().map(|(rank, (pos, _))| (*pos, rank + 1)).collect();
        let dense_rank: HashMap<usize, usize> =
            dense.iter().enumerate().map(|(rank, (pos, _))| (*pos, rank + 1)).collect();

        let mut fused = reciprocal_rank_fusion(&sparse, &dense, self.dense_weight, self.rrf_k);
        fused.truncate(top_k);

        Ok(fused
            .into_iter()
            .map(|(pos, score)| {
                let section = &index.corpus.sections()[pos];
                let mut result = RetrievalResult::from_section(section, score);
                result.metadata.insert("sparse_rank".to_string(), json!(sparse_rank.get(&pos)));
                result.metadata.insert("dense_rank".to_string(), json!(dense_rank.get(&pos)));
                result
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Section;
    use crate::embeddings::HashingEmbedder;
    use crate::search::test_support::{spell_corpus, FixedEmbedder};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn hashing(dim: usize) -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(dim))
    }

    #[test]
    fn test_retrieve_before_build_fails() {
        let retriever = HybridRetriever::new(hashing(64), None);
        assert!(matches!(
            retriever.retrieve("fire", 3),
            Err(BenchError::IndexNotBuilt(_))
        ));
    }

    #[test]
    fn test_lexical_match_ranks_first() {
        let mut retriever = HybridRetriever::new(hashing(512), None);
        retriever.build_index(&spell_corpus()).unwrap();
        let results = retriever.retrieve("fire damage", 3).unwrap();
        assert_eq!(results[0].section_id, "A");
        assert_eq!(results[0].metadata["sparse_rank"], json!(1));
        assert!(results.len() <= 3);
        let ids: HashSet<&str> = results.iter().map(|r| r.section_id.as_str()).collect();
        assert_eq!(ids.len(), results.len());
    }

    #[test]
    fn test_scores_are_fused_ranks() {
        let mut retriever = HybridRetriever::new(hashing(512), None).with_rrf_k(60.0);
        retriever.build_index(&spell_corpus()).unwrap();
        let results = retriever.retrieve("fire damage", 3).unwrap();
        // Best possible fused score: rank 1 in both lists
        let max = 0.5 / 61.0 + 0.5 / 61.0;
        for r in &results {
            assert!(r.score > 0.0 && r.score <= max + 1e-7);
        }
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_pure_sparse_weight_follows_bm25() {
        // Dense side points the other way: "fire damage" embeds next to Counterspell
        let corpus = spell_corpus();
        let texts: Vec<String> = corpus.iter().map(|s| s.embedding_text()).collect();
        let embedder = Arc::new(FixedEmbedder::new(
            2,
            &[
                (texts[0].as_str(), vec![1.0, 0.0]),
                (texts[1].as_str(), vec![0.0, 1.0]),
                (texts[2].as_str(), vec![0.6, 0.8]),
                ("fire damage", vec![0.0, 1.0]),
            ],
        ));

        let mut sparse_only = HybridRetriever::new(embedder.clone(), None).with_dense_weight(0.0);
        sparse_only.build_index(&corpus).unwrap();
        assert_eq!(sparse_only.retrieve("fire damage", 1).unwrap()[0].section_id, "A");

        let mut dense_only = HybridRetriever::new(embedder, None).with_dense_weight(1.0);
        dense_only.build_index(&corpus).unwrap();
        assert_eq!(dense_only.retrieve("fire damage", 1).unwrap()[0].section_id, "B");
    }

    #[test]
    fn test_name_embeds_configuration() {
        let a = HybridRetriever::new(hashing(64), None);
        assert_eq!(a.name(), "hybrid_hashing-64_d64_dw0.5_k11.5_b0.75");
        let b = HybridRetriever::new(hashing(64), None).with_dense_weight(0.7);
        let c = HybridRetriever::new(hashing(64), None).with_bm25_params(1.2, 0.75);
        let d = HybridRetriever::new(hashing(64), None).with_rrf_k(10.0);
        let names: HashSet<String> = [a.name(), b.name(), c.name(), d.name()].into_iter().collect();
        assert_eq!(names.len(), 4);
        assert_eq!(HybridRetriever::new(hashing(64), None).with_dense_weight(3.0).dense_weight(), 1.0);
    }

    #[test]
    fn test_close_parameters_get_distinct_names() {
        let a = HybridRetriever::new(hashing(64), None).with_dense_weight(0.501);
        let b = HybridRetriever::new(hashing(64), None).with_dense_weight(0.504);
        assert_ne!(a.name(), b.name());

        let c = HybridRetriever::new(hashing(64), None).with_bm25_params(1.2, 0.751);
        let d = HybridRetriever::new(hashing(64), None).with_bm25_params(1.2, 0.749);
        assert_ne!(c.name(), d.name());
    }

    #[test]
    fn test_uses_own_cache_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut retriever = HybridRetriever::new(hashing(32), Some(temp_dir.path().to_path_buf()));
        retriever.build_index(&spell_corpus()).unwrap();
        assert!(temp_dir.path().join("hybrid_hashing-32_d32.bin").exists());
    }

    #[test]
    fn test_cached_row_order_maps_to_corpus() {
        let temp_dir = TempDir::new().unwrap();
        let dir = Some(temp_dir.path().to_path_buf());
        let mut first = HybridRetriever::new(hashing(256), dir.clone());
        first.build_index(&spell_corpus()).unwrap();

        // Same ids, different insertion order: the cache is reused as-is
        let corpus = spell_corpus();
        let reordered = Corpus::from_sections(corpus.sections().iter().rev().cloned());
        let mut second = HybridRetriever::new(hashing(256), dir);
        second.build_index(&reordered).unwrap();

        let results = second.retrieve("slashing longsword", 1).unwrap();
        assert_eq!(results[0].section_id, "C");
        assert_eq!(results[0].title, "Longsword");
    }

    #[test]
    fn test_no_lexical_overlap_still_returns_dense_hits() {
        let mut retriever = HybridRetriever::new(hashing(64), None);
        let corpus = Corpus::from_sections(vec![Section::new("x", "Grapple", "Contested athletics check")]);
        retriever.build_index(&corpus).unwrap();
        let results = retriever.retrieve("zzz", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata["sparse_rank"], serde_json::Value::Null);
    }
}
