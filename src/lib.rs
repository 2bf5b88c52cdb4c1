pub mod cache;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod eval;
pub mod search;

pub use config::Config;
pub use corpus::{Corpus, Section};
pub use error::{BenchError, Result};
pub use eval::{EvaluationResult, Evaluator, TestQuestion};
pub use search::{RetrievalResult, Retriever, RetrieverKind};
