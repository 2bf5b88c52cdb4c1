//! Ranking metrics: Recall@K, Precision@K, Hit@K and reciprocal rank.
//!
//! All functions take the retrieved ids best first and the set of relevant ids.

use crate::eval::evaluator::EvaluationResult;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashSet;

/// k values reported in the summary table and results file
pub const HEADLINE_K: [usize; 4] = [1, 3, 5, 10];

/// Distinct relevant ids among the first `k` retrieved
fn relevant_in_top_k<S: AsRef<str>>(retrieved: &[S], relevant: &HashSet<String>, k: usize) -> usize {
    retrieved
        .iter()
        .take(k)
        .map(AsRef::as_ref)
        .filter(|id| relevant.contains(*id))
        .collect::<HashSet<&str>>()
        .len()
}

/// Recall at K: share of the relevant ids found in the top K.
/// Zero when there are no relevant ids.
pub fn recall_at_k<S: AsRef<str>>(retrieved: &[S], relevant: &HashSet<String>, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    relevant_in_top_k(retrieved, relevant, k) as f64 / relevant.len() as f64
}

/// Precision at K: share of the top `min(k, retrieved.len())` that is relevant.
/// Zero when nothing was retrieved or `k` is 0.
pub fn precision_at_k<S: AsRef<str>>(retrieved: &[S], relevant: &HashSet<String>, k: usize) -> f64 {
    let cutoff = k.min(retrieved.len());
    if cutoff == 0 {
        return 0.0;
    }
    relevant_in_top_k(retrieved, relevant, k) as f64 / cutoff as f64
}

/// Hit at K: 1.0 if any relevant id is in the top K
pub fn hit_at_k<S: AsRef<str>>(retrieved: &[S], relevant: &HashSet<String>, k: usize) -> f64 {
    if relevant_in_top_k(retrieved, relevant, k) > 0 {
        1.0
    } else {
        0.0
    }
}

/// 1 / (1-based rank of the first relevant id), or 0.0 if none appears.
/// Averaged over questions this is the MRR.
pub fn reciprocal_rank<S: AsRef<str>>(retrieved: &[S], relevant: &HashSet<String>) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_ref()))
        .map(|rank| 1.0 / (rank + 1) as f64)
        .unwrap_or(0.0)
}

/// Headline numbers for one retriever
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverSummary {
    /// `(k, recall)` for every headline k, in ascending order
    pub recall: Vec<(usize, f64)>,
    pub mrr: f64,
    pub avg_latency_ms: f64,
}

impl Serialize for RetrieverSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.recall.len() + 2))?;
        for (k, recall) in &self.recall {
            map.serialize_entry(&format!("recall@{}", k), recall)?;
        }
        map.serialize_entry("mrr", &self.mrr)?;
        map.serialize_entry("avg_latency_ms", &self.avg_latency_ms)?;
        map.end()
    }
}

/// Retriever name to summary, in evaluation order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary(pub Vec<(String, RetrieverSummary)>);

impl Summary {
    pub fn get(&self, name: &str) -> Option<&RetrieverSummary> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Summary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, summary) in &self.0 {
            map.serialize_entry(name, summary)?;
        }
        map.end()
    }
}

/// Flatten evaluation results to the headline Recall@{1,3,5,10}, MRR and latency.
/// Every headline key is present; a k the result lacks reports `0.0`.
pub fn aggregate(results: &[EvaluationResult]) -> Summary {
    Summary(
        results
            .iter()
            .map(|r| {
                let recall = HEADLINE_K
                    .iter()
                    .map(|k| (*k, r.recall_at_k.get(k).copied().unwrap_or(0.0)))
                    .collect();
                (
                    r.retriever_name.clone(),
                    RetrieverSummary {
                        recall,
                        mrr: r.mrr,
                        avg_latency_ms: r.avg_latency_ms,
                    },
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_hit_at_rank_one() {
        let relevant = set(&["A"]);
        let retrieved = ["A", "B", "C"];
        assert_eq!(recall_at_k(&retrieved, &relevant, 1), 1.0);
        assert_eq!(reciprocal_rank(&retrieved, &relevant), 1.0);
        assert_eq!(hit_at_k(&retrieved, &relevant, 1), 1.0);
    }

    #[test]
    fn test_first_hit_at_rank_three() {
        let relevant = set(&["A"]);
        let retrieved = ["B", "C", "A"];
        assert!((reciprocal_rank(&retrieved, &relevant) - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(recall_at_k(&retrieved, &relevant, 1), 0.0);
        assert_eq!(recall_at_k(&retrieved, &relevant, 3), 1.0);
        assert_eq!(hit_at_k(&retrieved, &relevant, 2), 0.0);
        assert_eq!(hit_at_k(&retrieved, &relevant, 3), 1.0);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        let empty: [&str; 0] = [];
        assert_eq!(recall_at_k(&empty, &set(&["A"]), 5), 0.0);
        assert_eq!(recall_at_k(&["A"], &set(&[]), 5), 0.0);
        assert_eq!(precision_at_k(&empty, &set(&["A"]), 5), 0.0);
        assert_eq!(reciprocal_rank(&empty, &set(&["A"])), 0.0);
        assert_eq!(hit_at_k(&["A"], &set(&[]), 5), 0.0);
    }

    #[test]
    fn test_recall_monotonic_in_k() {
        let relevant = set(&["b", "d", "z"]);
        let retrieved = ["a", "b", "c", "d", "e"];
        let mut previous = 0.0;
        for k in [1, 2, 3, 5, 10] {
            let recall = recall_at_k(&retrieved, &relevant, k);
            assert!(recall >= previous);
            previous = recall;
        }
        assert!((previous - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_precision_uses_retrieved_length() {
        let relevant = set(&["a", "x"]);
        // Two results, both considered even though k = 5
        assert_eq!(precision_at_k(&["a", "b"], &relevant, 5), 0.5);
        assert!((precision_at_k(&["a", "b", "x"], &relevant, 3) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(precision_at_k(&["a"], &relevant, 0), 0.0);
    }

    #[test]
    fn test_duplicates_do_not_inflate_recall() {
        let relevant = set(&["a", "b"]);
        assert_eq!(recall_at_k(&["a", "a"], &relevant, 2), 0.5);
    }

    #[test]
    fn test_reciprocal_rank_bounds() {
        let relevant = set(&["q"]);
        for n in 1..=6 {
            let mut retrieved: Vec<String> = (0..n - 1).map(|i| format!("x{}", i)).collect();
            retrieved.push("q".to_string());
            let rr = reciprocal_rank(&retrieved, &relevant);
            assert!((rr - 1.0 / n as f64).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&rr));
        }
        assert_eq!(reciprocal_rank(&["x", "y"], &relevant), 0.0);
    }

    #[test]
    fn test_summary_serializes_in_order() {
        let summary = Summary(vec![
            (
                "zeta".to_string(),
                RetrieverSummary {
                    recall: vec![(1, 0.5), (10, 1.0)],
                    mrr: 0.75,
                    avg_latency_ms: 2.0,
                },
            ),
            (
                "alpha".to_string(),
                RetrieverSummary {
                    recall: vec![(1, 0.0)],
                    mrr: 0.0,
                    avg_latency_ms: 1.0,
                },
            ),
        ]);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["zeta"]["recall@10"], 1.0);
        assert_eq!(value["zeta"]["mrr"], 0.75);
        assert_eq!(summary.get("alpha").unwrap().avg_latency_ms, 1.0);
    }

    #[test]
    fn test_aggregate_picks_headline_k() {
        let mut recall_at_k = BTreeMap::new();
        recall_at_k.insert(1, 0.25);
        recall_at_k.insert(2, 0.4);
        recall_at_k.insert(5, 0.9);
        let result = EvaluationResult {
            retriever_name: "section_m".to_string(),
            recall_at_k,
            precision_at_k: BTreeMap::new(),
            hit_at_k: BTreeMap::new(),
            mrr: 0.5,
            avg_latency_ms: 3.5,
            num_questions: 4,
            per_question_results: Vec::new(),
        };
        let summary = aggregate(&[result]);
        let s = summary.get("section_m").unwrap();
        assert_eq!(s.recall, vec![(1, 0.25), (3, 0.0), (5, 0.9), (10, 0.0)]);
        let value = serde_json::to_value(&summary).unwrap();
        let keys: Vec<&String> = value["section_m"].as_object().unwrap().keys().collect();
        assert_eq!(
            keys,
            vec!["recall@1", "recall@3", "recall@5", "recall@10", "mrr", "avg_latency_ms"]
        );
        assert_eq!(s.mrr, 0.5);
    }
}
