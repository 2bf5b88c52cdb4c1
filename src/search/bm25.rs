//! BM25 keyword ranking over tokenized sections.
//!
//! Wraps the [`bm25`](https://crates.io/crates/bm25) crate with the shared
//! [`tokenize`] rule instead of its language-aware default tokenizer. For each
//! distinct query token `t` present in document `d`:
//!
//! ```text
//! idf(t)     = ln(1 + (N - df(t) + 0.5) / (df(t) + 0.5))
//! score(d)  += idf(t) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * |d| / avgdl))
//! ```

use bm25::{Document, SearchEngine, SearchEngineBuilder, Tokenizer};
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_K1: f32 = 1.5;
pub const DEFAULT_B: f32 = 0.75;

fn non_word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\s]").expect("Invalid regex pattern"))
}

/// Lowercase, replace anything that is not a word or space character with a
/// space, split on whitespace. Shared by indexing and querying.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    non_word_pattern()
        .replace_all(&lowered, " ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// [`tokenize`] as a `bm25` tokenizer: no stemming, no stop words.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionTokenizer;

impl Tokenizer for SectionTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        tokenize(input_text)
    }
}

/// BM25 search engine keyed by document position
pub struct Bm25Index {
    engine: SearchEngine<usize, u32, SectionTokenizer>,
    document_count: usize,
}

impl Bm25Index {
    /// Index documents in order; result positions refer to this order.
    pub fn build<S: AsRef<str>>(documents: &[S], k1: f32, b: f32) -> Self {
        let docs: Vec<Document<usize>> = documents
            .iter()
            .enumerate()
            .map(|(id, text)| Document {
                id,
                contents: text.as_ref().to_string(),
            })
            .collect();

        let engine = SearchEngineBuilder::<usize, u32, SectionTokenizer>::with_tokenizer_and_documents(
            SectionTokenizer,
            docs,
        )
        .k1(k1)
        .b(b)
        .build();

        log::debug!("BM25 index built: {} documents (k1={}, b={})", documents.len(), k1, b);

        Self {
            engine,
            document_count: documents.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.document_count
    }

    pub fn is_empty(&self) -> bool {
        self.document_count == 0
    }

    /// Score of every document for the query, in document order
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.len()];
        if self.is_empty() {
            return scores;
        }
        for result in self.engine.search(query, None) {
            if let Some(slot) = scores.get_mut(result.document.id) {
                *slot = result.score;
            }
        }
        scores
    }

    /// Top `n` (document, score) pairs with a positive score, best first;
    /// ties keep document order.
    pub fn top_n(&self, query: &str, n: usize) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(n);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<String> {
        vec![
            "Fireball deals fire damage".to_string(),
            "Counterspell negates spells".to_string(),
            "Longsword deals slashing damage".to_string(),
        ]
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("Fire-ball, deals 8d6!"), vec!["fire", "ball", "deals", "8d6"]);
        assert_eq!(tokenize("  snake_case   words "), vec!["snake_case", "words"]);
        assert!(tokenize("?!...").is_empty());
    }

    #[test]
    fn test_tokenize_unicode_words() {
        assert_eq!(tokenize("Élan vital"), vec!["élan", "vital"]);
    }

    #[test]
    fn test_scores_rank_matching_document_first() {
        let index = Bm25Index::build(&rules(), DEFAULT_K1, DEFAULT_B);
        let top = index.top_n("fire damage", 3);
        assert_eq!(top[0].0, 0);
        // Longsword matches "damage" only; Counterspell matches nothing
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].0, 2);
        assert!(top[0].1 > top[1].1);
    }

    #[test]
    fn test_top_n_truncates_and_skips_zero_scores() {
        let index = Bm25Index::build(&rules(), DEFAULT_K1, DEFAULT_B);
        assert_eq!(index.top_n("damage", 1).len(), 1);
        assert!(index.top_n("wizard", 5).is_empty());
        assert!(index.top_n("", 5).is_empty());
    }

    #[test]
    fn test_ties_keep_document_order() {
        let docs = vec!["goblin attack", "goblin attack", "goblin attack"];
        let index = Bm25Index::build(&docs, DEFAULT_K1, DEFAULT_B);
        let order: Vec<usize> = index.top_n("goblin", 3).into_iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let docs = vec!["damage damage roll", "damage save", "damage bonus", "resistance roll"];
        let index = Bm25Index::build(&docs, DEFAULT_K1, DEFAULT_B);
        let scores = index.scores("resistance damage");
        // "resistance" appears in one document, "damage" in three
        assert!(scores[3] > scores[1]);
    }

    #[test]
    fn test_b_zero_ignores_length() {
        let docs = vec!["orc", "orc and many other filler words here"];
        let index = Bm25Index::build(&docs, DEFAULT_K1, 0.0);
        let scores = index.scores("orc");
        assert!((scores[0] - scores[1]).abs() < 1e-6);

        let normalized = Bm25Index::build(&docs, DEFAULT_K1, 1.0);
        let scores = normalized.scores("orc");
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn test_score_matches_closed_form() {
        let docs = vec!["orc orc goblin", "goblin"];
        let index = Bm25Index::build(&docs, DEFAULT_K1, DEFAULT_B);
        let scores = index.scores("orc");

        // N = 2, df = 1, |d| = 3, avgdl = 2, tf = 2
        let idf = (1.0f32 + 1.5 / 1.5).ln();
        let norm = DEFAULT_K1 * (1.0 - DEFAULT_B + DEFAULT_B * 1.5);
        let expected = idf * 2.0 * (DEFAULT_K1 + 1.0) / (2.0 + norm);
        assert!((scores[0] - expected).abs() < 1e-3);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_index_uses_section_tokenizer() {
        let docs = vec!["The Fire-Ball of the wizard", "Opportunity attacks"];
        let index = Bm25Index::build(&docs, DEFAULT_K1, DEFAULT_B);
        // No stop-word removal and no stemming: "the" still matches
        assert_eq!(index.top_n("the", 5).len(), 1);
        assert_eq!(index.top_n("ball", 5)[0].0, 0);
        assert!(index.top_n("attack", 5).is_empty());
        assert_eq!(SectionTokenizer.tokenize("Fire-Ball"), vec!["fire", "ball"]);
    }

    #[test]
    fn test_empty_index() {
        let docs: Vec<String> = Vec::new();
        let index = Bm25Index::build(&docs, DEFAULT_K1, DEFAULT_B);
        assert!(index.is_empty());
        assert!(index.top_n("anything", 5).is_empty());
    }
}
