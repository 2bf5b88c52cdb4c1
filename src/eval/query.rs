//! Labeled test questions.
//!
//! Two ground-truth layouts are accepted:
//!
//! ```json
//! {"questions": [{"id": "q1", "question": "...", "relevant_sections": ["A"]}]}
//! {"q1": {"question": "...", "relevant_sections": ["A"]}}
//! ```
//!
//! File order is kept either way.

use crate::error::{BenchError, Result};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestQuestion {
    pub id: String,
    pub question: String,
    #[serde(rename = "relevant_sections", default)]
    pub relevant_section_ids: HashSet<String>,
}

impl TestQuestion {
    pub fn new<I, S>(id: impl Into<String>, question: impl Into<String>, relevant: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            question: question.into(),
            relevant_section_ids: relevant.into_iter().map(Into::into).collect(),
        }
    }
}

/// Question body in the keyed layout (id is the map key)
#[derive(Deserialize)]
struct QuestionRecord {
    question: String,
    #[serde(default)]
    relevant_sections: HashSet<String>,
}

struct GroundTruth(Vec<TestQuestion>);

impl<'de> Deserialize<'de> for GroundTruth {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GroundTruthVisitor;

        impl<'de> Visitor<'de> for GroundTruthVisitor {
            type Value = GroundTruth;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(r#"{"questions": [...]} or a map of question id to question"#)
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<GroundTruth, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut questions = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    if key == "questions" {
                        questions.extend(map.next_value::<Vec<TestQuestion>>()?);
                    } else {
                        let record: QuestionRecord = map.next_value()?;
                        questions.push(TestQuestion {
                            id: key,
                            question: record.question,
                            relevant_section_ids: record.relevant_sections,
                        });
                    }
                }
                Ok(GroundTruth(questions))
            }
        }

        deserializer.deserialize_map(GroundTruthVisitor)
    }
}

/// Parse ground-truth JSON text
pub fn parse_questions(json: &str) -> Result<Vec<TestQuestion>> {
    let GroundTruth(questions) = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    for q in &questions {
        if !seen.insert(q.id.as_str()) {
            return Err(BenchError::InvalidInput(format!("duplicate question id {}", q.id)));
        }
    }
    Ok(questions)
}

/// Load the ground-truth file
pub fn load_questions(path: &Path) -> Result<Vec<TestQuestion>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BenchError::InvalidInput(format!("Failed to read ground truth {}: {}", path.display(), e))
    })?;
    let questions = parse_questions(&raw)?;
    log::info!("Loaded {} test questions from {}", questions.len(), path.display());
    Ok(questions)
}
