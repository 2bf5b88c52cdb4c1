use super::dense::DenseIndex;
use super::{IndexState, RetrievalResult, Retriever};
use crate::cache::VectorCache;
use crate::corpus::Corpus;
use crate::embeddings::Embedder;
use crate::error::{BenchError, Result};
use std::path::PathBuf;
use std::sync::Arc;

const CACHE_PREFIX: &str = "section";

struct SectionIndex {
    dense: DenseIndex,
    corpus: Corpus,
}

/// Whole-section dense retrieval: one embedding per section.
pub struct SectionRetriever {
    embedder: Arc<dyn Embedder>,
    cache_dir: Option<PathBuf>,
    state: IndexState<SectionIndex>,
}

impl SectionRetriever {
    /// `cache_dir` of `None` disables the on-disk embedding cache.
    pub fn new(embedder: Arc<dyn Embedder>, cache_dir: Option<PathBuf>) -> Self {
        Self {
            embedder,
            cache_dir,
            state: IndexState::NotBuilt,
        }
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

impl Retriever for SectionRetriever {
    fn name(&self) -> String {
        format!(
            "section_{}_d{}",
            self.embedder.model_name(),
            self.embedder.embedding_dim()
        )
    }

    fn build_index(&mut self, corpus: &Corpus) -> Result<()> {
        let cache_file = self.cache_file();
        let dense = DenseIndex::build_for_sections(corpus, self.embedder.as_ref(), cache_file.as_deref())?;
        log::info!("{}: indexed {} sections", self.name(), dense.len());
        self.state = IndexState::Built(SectionIndex {
            dense,
            corpus: corpus.clone(),
        });
        Ok(())
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let index = self.state.get(&self.name())?;
        if index.dense.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query)?;
        index
            .dense
            .search(&query_vec, top_k)?
            .into_iter()
            .map(|(row, score)| {
                let id = index.dense.id(row);
                let section = index.corpus.get(id).ok_or_else(|| {
                    BenchError::InvalidInput(format!("indexed section {} missing from corpus", id))
                })?;
                Ok(RetrievalResult::from_section(section, score))
            })
            .collect()
    }
}
