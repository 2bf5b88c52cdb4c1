//! Reference retriever over externally supplied section vectors.
//!
//! The vectors come with the corpus (or from the baseline vector store), and
//! so must the query vectors: this retriever has no embedder of its own.
//! Text queries are rejected; use [`BaselineRetriever::retrieve_with_embedding`].

use super::dense::top_k_indices;
use super::{IndexState, RetrievalResult, Retriever};
use crate::corpus::{Corpus, Section};
use crate::embeddings::{dot, l2_normalize};
use crate::error::{BenchError, Result};

struct BaselineIndex {
    sections: Vec<Section>,
    dimension: usize,
}

#[derive(Default)]
pub struct BaselineRetriever {
    state: IndexState<BaselineIndex>,
}

impl BaselineRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rank sections against a precomputed query vector
    pub fn retrieve_with_embedding(&self, query_vec: &[f32], top_k: usize) -> Result<Vec<RetrievalResult>> {
        let index = self.state.get(&self.name())?;
        if index.sections.is_empty() {
            return Ok(Vec::new());
        }
        if query_vec.len() != index.dimension {
            return Err(BenchError::InvalidInput(format!(
                "query vector has dimension {}, section vectors have {}",
                query_vec.len(),
                index.dimension
            )));
        }

        let mut query = query_vec.to_vec();
        l2_normalize(&mut query);
        if query.iter().all(|x| *x == 0.0) {
            return Ok(Vec::new());
        }

        let scores: Vec<f32> = index
            .sections
            .iter()
            .map(|s| s.vector.as_deref().map(|v| dot(&query, v)).unwrap_or(0.0))
            .collect();

        Ok(top_k_indices(&scores, top_k)
            .into_iter()
            .map(|(pos, score)| RetrievalResult::from_section(&index.sections[pos], score))
            .collect())
    }
}

impl Retriever for BaselineRetriever {
    fn name(&self) -> String {
        "baseline".to_string()
    }

    /// Index every section that carries a vector; the rest are skipped.
    fn build_index(&mut self, corpus: &Corpus) -> Result<()> {
        let mut sections = Vec::new();
        let mut dimension = None;

        for section in corpus.iter() {
            let vector = match &section.vector {
                Some(v) => v,
                None => continue,
            };
            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(BenchError::InvalidInput(format!(
                        "section {} has a {}-dimensional vector, expected {}",
                        section.id,
                        vector.len(),
                        d
                    )));
                }
                Some(_) => {}
            }
            let mut section = section.clone();
            if let Some(v) = section.vector.as_mut() {
                l2_normalize(v);
            }
            sections.push(section);
        }

        let skipped = corpus.len() - sections.len();
        if skipped > 0 {
            log::warn!("baseline: {} of {} sections have no vector and are not indexed", skipped, corpus.len());
        }
        log::info!("baseline: indexed {} sections", sections.len());

        self.state = IndexState::Built(BaselineIndex {
            sections,
            dimension: dimension.unwrap_or(0),
        });
        Ok(())
    }

    fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<RetrievalResult>> {
        Err(BenchError::UnsupportedOperation(
            "baseline retriever cannot embed query text; use retrieve_with_embedding with a precomputed query vector"
                .to_string(),
        ))
    }
}
