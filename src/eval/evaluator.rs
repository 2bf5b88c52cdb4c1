//! Runs retrievers over the labeled questions and reports ranking quality.
//!
//! A failing `retrieve` call aborts the evaluation of that retriever and the
//! error is returned to the caller; there is no partial result.

use crate::error::{BenchError, Result};
use crate::eval::metrics::{
    aggregate, hit_at_k, precision_at_k, recall_at_k, reciprocal_rank, Summary, HEADLINE_K,
};
use crate::eval::query::{load_questions, TestQuestion};
use crate::search::{RetrievalResult, Retriever};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::time::Instant;

/// Outcome of one question against one retriever
#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub question: String,
    pub retrieved_ids: Vec<String>,
    pub relevant_ids: Vec<String>,
    pub recall_at_k: BTreeMap<usize, f64>,
    pub precision_at_k: BTreeMap<usize, f64>,
    pub hit_at_k: BTreeMap<usize, f64>,
    pub reciprocal_rank: f64,
    pub latency_ms: f64,
}

/// Averages over every question for one retriever
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub retriever_name: String,
    pub recall_at_k: BTreeMap<usize, f64>,
    pub precision_at_k: BTreeMap<usize, f64>,
    pub hit_at_k: BTreeMap<usize, f64>,
    pub mrr: f64,
    pub avg_latency_ms: f64,
    pub num_questions: usize,
    pub per_question_results: Vec<QuestionResult>,
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    summary: Summary,
    detailed_results: &'a [EvaluationResult],
}

pub struct Evaluator {
    questions: Vec<TestQuestion>,
    k_values: Vec<usize>,
}

impl Evaluator {
    /// Load questions from a ground-truth file
    pub fn new(ground_truth_path: &Path, k_values: &[usize]) -> Result<Self> {
        Ok(Self::from_questions(load_questions(ground_truth_path)?, k_values))
    }

    /// k values are sorted and deduplicated; an empty list falls back to 1, 3, 5, 10.
    /// The headline ks are always evaluated in addition to `k_values`.
    pub fn from_questions(questions: Vec<TestQuestion>, k_values: &[usize]) -> Self {
        let mut k_values: Vec<usize> = k_values
            .iter()
            .copied()
            .filter(|k| *k > 0)
            .chain(HEADLINE_K)
            .collect();
        k_values.sort_unstable();
        k_values.dedup();
        Self { questions, k_values }
    }

    pub fn questions(&self) -> &[TestQuestion] {
        &self.questions
    }

    pub fn k_values(&self) -> &[usize] {
        &self.k_values
    }

    /// Smallest result depth that covers every evaluated k
    pub fn max_k(&self) -> usize {
        self.k_values.iter().copied().max().unwrap_or(0)
    }

    /// Evaluate a retriever through its text `retrieve` entry point
    pub fn evaluate_retriever(
        &self,
        retriever: &dyn Retriever,
        max_k: usize,
        verbose: bool,
    ) -> Result<EvaluationResult> {
        self.evaluate_with(&retriever.name(), max_k, verbose, |question, k| {
            retriever.retrieve(&question.question, k)
        })
    }

    /// Evaluate any retrieval function under `name`.
    ///
    /// `retrieve` is called once per question with `max_k`; only its wall-clock
    /// time counts as latency.
    pub fn evaluate_with<F>(
        &self,
        name: &str,
        max_k: usize,
        verbose: bool,
        mut retrieve: F,
    ) -> Result<EvaluationResult>
    where
        F: FnMut(&TestQuestion, usize) -> Result<Vec<RetrievalResult>>,
    {
        if max_k < self.max_k() {
            return Err(BenchError::InvalidInput(format!(
                "max_k {} is below the largest evaluated k ({})",
                max_k,
                self.max_k()
            )));
        }
        log::info!("Evaluating {} on {} questions (max_k={})", name, self.questions.len(), max_k);

        let mut per_question_results = Vec::with_capacity(self.questions.len());
        let mut recall_sums: BTreeMap<usize, f64> = self.k_values.iter().map(|k| (*k, 0.0)).collect();
        let mut precision_sums = recall_sums.clone();
        let mut hit_sums = recall_sums.clone();
        let mut rr_sum = 0.0;
        let mut latency_sum = 0.0;

        for question in &self.questions {
            let start = Instant::now();
            let results = retrieve(question, max_k)?;
            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

            let retrieved_ids: Vec<String> = results.into_iter().map(|r| r.section_id).collect();
            let relevant = &question.relevant_section_ids;

            let mut recall = BTreeMap::new();
            let mut precision = BTreeMap::new();
            let mut hit = BTreeMap::new();
            for &k in &self.k_values {
                let r = recall_at_k(&retrieved_ids, relevant, k);
                let p = precision_at_k(&retrieved_ids, relevant, k);
                let h = hit_at_k(&retrieved_ids, relevant, k);
                *recall_sums.entry(k).or_insert(0.0) += r;
                *precision_sums.entry(k).or_insert(0.0) += p;
                *hit_sums.entry(k).or_insert(0.0) += h;
                recall.insert(k, r);
                precision.insert(k, p);
                hit.insert(k, h);
            }
            let rr = reciprocal_rank(&retrieved_ids, relevant);
            rr_sum += rr;
            latency_sum += latency_ms;

            let level = if verbose { log::Level::Info } else { log::Level::Debug };
            log::log!(
                level,
                "[{}] {} rr={:.3} {:.1}ms retrieved={:?}",
                name,
                question.id,
                rr,
                latency_ms,
                retrieved_ids.iter().take(5).collect::<Vec<_>>()
            );

            let mut relevant_ids: Vec<String> = relevant.iter().cloned().collect();
            relevant_ids.sort();
            per_question_results.push(QuestionResult {
                question_id: question.id.clone(),
                question: question.question.clone(),
                retrieved_ids,
                relevant_ids,
                recall_at_k: recall,
                precision_at_k: precision,
                hit_at_k: hit,
                reciprocal_rank: rr,
                latency_ms,
            });
        }

        let n = self.questions.len();
        if n == 0 {
            log::warn!("No test questions: every metric for {} is zero", name);
        }
        let average = |sum: f64| if n == 0 { 0.0 } else { sum / n as f64 };
        let average_map = |sums: BTreeMap<usize, f64>| -> BTreeMap<usize, f64> {
            sums.into_iter().map(|(k, s)| (k, average(s))).collect()
        };

        let result = EvaluationResult {
            retriever_name: name.to_string(),
            recall_at_k: average_map(recall_sums),
            precision_at_k: average_map(precision_sums),
            hit_at_k: average_map(hit_sums),
            mrr: average(rr_sum),
            avg_latency_ms: average(latency_sum),
            num_questions: n,
            per_question_results,
        };

        log::info!(
            "{}: MRR {:.4}, {}, avg latency {:.2}ms",
            name,
            result.mrr,
            result
                .recall_at_k
                .iter()
                .map(|(k, v)| format!("R@{} {:.4}", k, v))
                .collect::<Vec<_>>()
                .join(", "),
            result.avg_latency_ms
        );
        Ok(result)
    }

    /// Evaluate each built retriever in order and log the comparison table
    pub fn evaluate_all(
        &self,
        retrievers: &[Box<dyn Retriever>],
        max_k: usize,
        verbose: bool,
    ) -> Result<Vec<EvaluationResult>> {
        let results = retrievers
            .iter()
            .map(|r| self.evaluate_retriever(r.as_ref(), max_k, verbose))
            .collect::<Result<Vec<_>>>()?;
        log::info!("\n{}", render_comparison_table(&results));
        Ok(results)
    }

    /// Write the summary map and per-question details as pretty JSON
    pub fn save_results(&self, results: &[EvaluationResult], path: &Path) -> Result<()> {
        let file = ResultsFile {
            summary: aggregate(results),
            detailed_results: results,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        log::info!("Saved results for {} retrievers to {}", results.len(), path.display());
        Ok(())
    }
}

/// Fixed-width comparison table, best MRR first (ties keep input order)
pub fn render_comparison_table(results: &[EvaluationResult]) -> String {
    let mut sorted: Vec<&EvaluationResult> = results.iter().collect();
    sorted.sort_by(|a, b| b.mrr.partial_cmp(&a.mrr).unwrap_or(Ordering::Equal));

    let name_width = sorted
        .iter()
        .map(|r| r.retriever_name.len())
        .max()
        .unwrap_or(0)
        .max("Retriever".len());

    let mut out = String::new();
    let mut header = format!("{:<width$}", "Retriever", width = name_width);
    for k in HEADLINE_K {
        header.push_str(&format!(" {:>8}", format!("R@{}", k)));
    }
    header.push_str(&format!(" {:>8} {:>12}", "MRR", "Latency(ms)"));
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", "─".repeat(header.chars().count()));

    for r in sorted {
        let mut line = format!("{:<width$}", r.retriever_name, width = name_width);
        for k in HEADLINE_K {
            match r.recall_at_k.get(&k) {
                Some(v) => line.push_str(&format!(" {:>8.4}", v)),
                None => line.push_str(&format!(" {:>8}", "-")),
            }
        }
        line.push_str(&format!(" {:>8.4} {:>12.2}", r.mrr, r.avg_latency_ms));
        let _ = writeln!(out, "{}", line);
    }
    out
}
