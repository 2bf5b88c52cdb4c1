//! Evaluation framework: labeled questions, ranking metrics and the evaluator.

pub mod evaluator;
pub mod metrics;
pub mod query;

pub use evaluator::{render_comparison_table, EvaluationResult, Evaluator, QuestionResult};
pub use metrics::{aggregate, hit_at_k, precision_at_k, recall_at_k, reciprocal_rank, Summary};
pub use query::{load_questions, TestQuestion};
