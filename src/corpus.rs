//! Section corpus: the fixed set of rulebook sections every retriever indexes.
//!
//! The ingestion pipeline hands over a JSON object keyed by section id. Key
//! order in that file is the corpus insertion order, which retrievers use to
//! break score ties, so it is preserved on load.

use crate::error::{BenchError, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// A single indexed rulebook section
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub content: String,
    pub level: i64,
    /// Externally supplied, pre-normalized vector (baseline retriever only)
    pub vector: Option<Vec<f32>>,
}

impl Section {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            level: 0,
            vector: None,
        }
    }

    /// Text embedded for whole-section dense search: title, blank line, content.
    pub fn embedding_text(&self) -> String {
        if self.content.trim().is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.content)
        }
    }
}

/// Section body as it appears in the corpus file (the id is the map key)
#[derive(Deserialize)]
struct SectionRecord {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    level: i64,
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

/// Ordered, id-indexed collection of sections
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    sections: Vec<Section>,
    positions: HashMap<String, usize>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from sections; a repeated id replaces the earlier entry in place.
    pub fn from_sections(sections: impl IntoIterator<Item = Section>) -> Self {
        let mut corpus = Self::new();
        for section in sections {
            corpus.insert(section);
        }
        corpus
    }

    /// Load a corpus JSON file: `{ "<id>": {title, content, level, vector?}, ... }`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BenchError::InvalidInput(format!("Failed to read corpus {}: {}", path.display(), e))
        })?;
        let corpus: Corpus = serde_json::from_str(&raw)?;
        log::info!("Loaded corpus: {} sections from {}", corpus.len(), path.display());
        Ok(corpus)
    }

    pub fn insert(&mut self, section: Section) {
        match self.positions.get(&section.id) {
            Some(&pos) => self.sections[pos] = section,
            None => {
                self.positions.insert(section.id.clone(), self.sections.len());
                self.sections.push(section);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Section> {
        self.positions.get(id).map(|&pos| &self.sections[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Sections in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn ids(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.id.clone()).collect()
    }

    pub fn id_set(&self) -> HashSet<&str> {
        self.sections.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Attach externally computed vectors to matching sections.
    /// Returns how many sections received a vector.
    pub fn attach_vectors(&mut self, vectors: HashMap<String, Vec<f32>>) -> usize {
        let mut attached = 0;
        for (id, vector) in vectors {
            if let Some(&pos) = self.positions.get(&id) {
                self.sections[pos].vector = Some(vector);
                attached += 1;
            } else {
                log::debug!("Ignoring vector for unknown section {}", id);
            }
        }
        attached
    }
}

impl<'de> Deserialize<'de> for Corpus {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CorpusVisitor;

        impl<'de> Visitor<'de> for CorpusVisitor {
            type Value = Corpus;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of section id to section")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Corpus, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut corpus = Corpus::new();
                while let Some((id, record)) = map.next_entry::<String, SectionRecord>()? {
                    corpus.insert(Section {
                        id,
                        title: record.title,
                        content: record.content,
                        level: record.level,
                        vector: record.vector,
                    });
                }
                Ok(corpus)
            }
        }

        deserializer.deserialize_map(CorpusVisitor)
    }
}
