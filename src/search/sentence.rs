//! Sentence-window retrieval.
//!
//! Each section is cut into overlapping windows of `chunk_size` sentences
//! (plus its title as a standalone chunk). Queries search the chunks and
//! collapse hits back to their parent sections.

use super::dense::{embed_all, load_valid_cache, store_cache, DenseIndex};
use super::{IndexState, RetrievalResult, Retriever};
use crate::cache::{CacheEntries, CacheKind, VectorCache};
use crate::corpus::{Corpus, Section};
use crate::embeddings::Embedder;
use crate::error::{BenchError, Result};
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

const CACHE_PREFIX: &str = "sentence";
const MIN_SENTENCE_CHARS: usize = 10;
const OVERFETCH: usize = 3;
const PREVIEW_CHARS: usize = 200;

/// A span of a section indexed on its own
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub section_id: String,
    /// First sentence of the window; `None` for title chunks
    pub start_index: Option<usize>,
    pub is_title: bool,
}

fn sentence_boundary() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[.!?]\s+").expect("Invalid regex pattern"))
}

/// Split after `.`, `!` or `?` followed by whitespace. Fragments shorter
/// than ten characters after trimming are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for m in sentence_boundary().find_iter(text) {
        // Terminators are single-byte, keep them with the sentence
        pieces.push(&text[last..m.start() + 1]);
        last = m.end();
    }
    pieces.push(&text[last..]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|s| s.chars().count() >= MIN_SENTENCE_CHARS)
        .map(str::to_string)
        .collect()
}

/// Title chunk (if any) followed by sentence windows stepping by
/// `max(1, chunk_size - 1)`, so consecutive windows share one sentence.
pub fn chunk_section(section: &Section, chunk_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    let title = section.title.trim();
    if !title.is_empty() {
        chunks.push(Chunk {
            text: title.to_string(),
            section_id: section.id.clone(),
            start_index: None,
            is_title: true,
        });
    }

    let sentences = split_sentences(&section.content);
    if sentences.is_empty() {
        let content = section.content.trim();
        if !content.is_empty() {
            chunks.push(Chunk {
                text: content.to_string(),
                section_id: section.id.clone(),
                start_index: Some(0),
                is_title: false,
            });
        }
        return chunks;
    }

    let window = chunk_size.max(1);
    let step = window.saturating_sub(1).max(1);
    let mut start = 0;
    loop {
        let end = (start + window).min(sentences.len());
        chunks.push(Chunk {
            text: sentences[start..end].join(" "),
            section_id: section.id.clone(),
            start_index: Some(start),
            is_title: false,
        });
        if end >= sentences.len() {
            break;
        }
        start += step;
    }

    chunks
}

struct ChunkIndex {
    chunks: Vec<Chunk>,
    dense: DenseIndex,
    corpus: Corpus,
}

pub struct SentenceChunkRetriever {
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    expand_to_section: bool,
    cache_dir: Option<PathBuf>,
    state: IndexState<ChunkIndex>,
}

impl SentenceChunkRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        expand_to_section: bool,
        cache_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            embedder,
            chunk_size: chunk_size.max(1),
            expand_to_section,
            cache_dir,
            state: IndexState::NotBuilt,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of indexed chunks, zero before `build_index`
    pub fn chunk_count(&self) -> usize {
        match &self.state {
            IndexState::Built(index) => index.chunks.len(),
            IndexState::NotBuilt => 0,
        }
    }

    fn cache_file(&self) -> Option<PathBuf> {
        self.cache_dir.as_deref().map(|dir| {
            VectorCache::path_for(
                dir,
                CACHE_PREFIX,
                self.embedder.model_name(),
                self.embedder.embedding_dim(),
                Some(self.chunk_size),
            )
        })
    }

    fn load_or_embed(&self, corpus: &Corpus) -> Result<(Vec<Chunk>, Vec<Vec<f32>>)> {
        let embedder = self.embedder.as_ref();
        let cache_file = self.cache_file();

        let chunks: Vec<Chunk> = corpus
            .iter()
            .flat_map(|section| chunk_section(section, self.chunk_size))
            .collect();
        let covered: HashSet<&str> = chunks.iter().map(|c| c.section_id.as_str()).collect();

        let cached = load_valid_cache(cache_file.as_deref(), |cache| {
            cache.validate(
                CacheKind::Chunks,
                embedder.model_name(),
                self.chunk_size,
                embedder.embedding_dim(),
                &covered,
            )
        })?;
        if let Some(VectorCache {
            entries: CacheEntries::Chunks(cached_chunks),
            embeddings,
            ..
        }) = cached
        {
            return Ok((cached_chunks, embeddings));
        }

        log::info!(
            "Embedding {} chunks from {} sections (chunk size {})",
            chunks.len(),
            corpus.len(),
            self.chunk_size
        );
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embed_all(embedder, &texts)?;

        store_cache(
            cache_file.as_deref(),
            &VectorCache {
                model_name: embedder.model_name().to_string(),
                chunk_size: self.chunk_size,
                dimension: embedder.embedding_dim(),
                entries: CacheEntries::Chunks(chunks.clone()),
                embeddings: embeddings.clone(),
            },
        )?;
        Ok((chunks, embeddings))
    }
}

impl Retriever for SentenceChunkRetriever {
    fn name(&self) -> String {
        let mut name = format!(
            "sentence_chunk_{}_d{}_cs{}",
            self.embedder.model_name(),
            self.embedder.embedding_dim(),
            self.chunk_size
        );
        if !self.expand_to_section {
            name.push_str("_chunktext");
        }
        name
    }

    fn build_index(&mut self, corpus: &Corpus) -> Result<()> {
        let (chunks, embeddings) = self.load_or_embed(corpus)?;
        let ids = chunks.iter().map(|c| c.section_id.clone()).collect();
        let dense = DenseIndex::new(ids, embeddings, self.embedder.embedding_dim())?;
        log::info!(
            "{}: indexed {} chunks across {} sections",
            self.name(),
            chunks.len(),
            corpus.len()
        );
        self.state = IndexState::Built(ChunkIndex {
            chunks,
            dense,
            corpus: corpus.clone(),
        });
        Ok(())
    }

    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let index = self.state.get(&self.name())?;
        if index.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed(query)?;
        let candidates = index.dense.search(&query_vec, top_k.saturating_mul(OVERFETCH))?;

        // Candidates arrive best first, so the first chunk seen per section is its best
        let mut seen: HashSet<&str> = HashSet::new();
        let mut best: Vec<(usize, f32)> = candidates
            .into_iter()
            .filter(|(row, _)| seen.insert(index.chunks[*row].section_id.as_str()))
            .collect();
        best.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        best.truncate(top_k);

        best.into_iter()
            .map(|(row, score)| {
                let chunk = &index.chunks[row];
                let section = index.corpus.get(&chunk.section_id).ok_or_else(|| {
                    BenchError::InvalidInput(format!(
                        "chunk references unknown section {}",
                        chunk.section_id
                    ))
                })?;

                let mut result = RetrievalResult::from_section(section, score);
                if !self.expand_to_section {
                    result.content = chunk.text.clone();
                }
                let preview: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
                result.metadata.insert("matched_chunk".to_string(), json!(preview));
                result.metadata.insert("chunk_index".to_string(), json!(row));
                result.metadata.insert("is_title_chunk".to_string(), json!(chunk.is_title));
                Ok(result)
            })
            .collect()
    }
}
