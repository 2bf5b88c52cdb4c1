use std::collections::HashMap;
use std::hash::Hash;

/// Default RRF constant (Cormack et al., 2009)
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Weighted Reciprocal Rank Fusion of a sparse and a dense ranking.
///
/// Each item at 0-based position `rank` in a list receives
/// `weight / (rrf_k + rank + 1)`; the sparse list is weighted
/// `1 - dense_weight` and the dense list `dense_weight`. Contributions are
/// summed per item, so an item found by only one list still scores.
/// Only positions matter: the raw scores in the input lists are ignored.
///
/// Returns every fused item, best first; equal scores are ordered by item.
pub fn reciprocal_rank_fusion<T>(
    sparse: &[(T, f32)],
    dense: &[(T, f32)],
    dense_weight: f32,
    rrf_k: f32,
) -> Vec<(T, f32)>
where
    T: Clone + Eq + Hash + Ord,
{
    let sparse_weight = 1.0 - dense_weight;
    let mut scores: HashMap<T, f32> = HashMap::new();

    for (weight, list) in [(sparse_weight, sparse), (dense_weight, dense)] {
        for (rank, (item, _)) in list.iter().enumerate() {
            let contribution = weight / (rrf_k + rank as f32 + 1.0);
            *scores.entry(item.clone()).or_insert(0.0) += contribution;
        }
    }

    let mut fused: Vec<(T, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(fused: &[(usize, f32)]) -> Vec<usize> {
        fused.iter().map(|(id, _)| *id).collect()
    }

    #[test]
    fn test_overlap_ranks_first() {
        let sparse = vec![(1, 12.0), (2, 8.0), (3, 1.0)];
        let dense = vec![(2, 0.95), (1, 0.85), (4, 0.75)];
        let fused = reciprocal_rank_fusion(&sparse, &dense, 0.5, DEFAULT_RRF_K);
        assert_eq!(fused.len(), 4);
        let top: Vec<usize> = ids(&fused[..2]);
        assert!(top.contains(&1) && top.contains(&2));
        for pair in fused.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn test_score_accumulation() {
        let fused = reciprocal_rank_fusion(&[(7, 3.0)], &[(7, 0.1)], 0.5, 60.0);
        assert_eq!(fused.len(), 1);
        let expected = 0.5 / 61.0 + 0.5 / 61.0;
        assert!((fused[0].1 - expected).abs() < 1e-7);
    }

    #[test]
    fn test_raw_scores_are_ignored() {
        let a = reciprocal_rank_fusion(&[(1, 1000.0), (2, 999.0)], &[(2, 0.9)], 0.5, 60.0);
        let b = reciprocal_rank_fusion(&[(1, 0.001), (2, 0.0001)], &[(2, 0.1)], 0.5, 60.0);
        assert_eq!(ids(&a), ids(&b));
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x.1 - y.1).abs() < 1e-7);
        }
    }

    #[test]
    fn test_dense_weight_one_reproduces_dense_ranking() {
        let sparse = vec![(5, 9.0), (3, 7.0), (8, 2.0)];
        let dense = vec![(3, 0.9), (1, 0.8), (5, 0.7), (2, 0.6)];
        let fused = reciprocal_rank_fusion(&sparse, &dense, 1.0, DEFAULT_RRF_K);
        let dense_ids: Vec<usize> = ids(&dense);
        let restricted: Vec<usize> = ids(&fused)
            .into_iter()
            .filter(|id| dense_ids.contains(id))
            .collect();
        assert_eq!(restricted, dense_ids);
        // Sparse-only item scores nothing and sorts last
        assert_eq!(fused.last().unwrap(), &(8, 0.0));
    }

    #[test]
    fn test_dense_weight_zero_reproduces_sparse_ranking() {
        let sparse = vec![(5, 9.0), (3, 7.0), (8, 2.0)];
        let dense = vec![(3, 0.9), (1, 0.8), (5, 0.7)];
        let fused = reciprocal_rank_fusion(&sparse, &dense, 0.0, DEFAULT_RRF_K);
        assert_eq!(ids(&fused[..3]), vec![5, 3, 8]);
    }

    #[test]
    fn test_weights_shift_winner() {
        let sparse = vec![(1, 1.0)];
        let dense = vec![(2, 1.0)];
        assert_eq!(reciprocal_rank_fusion(&sparse, &dense, 0.1, 60.0)[0].0, 1);
        assert_eq!(reciprocal_rank_fusion(&sparse, &dense, 0.9, 60.0)[0].0, 2);
    }

    #[test]
    fn test_equal_scores_order_by_item() {
        let fused = reciprocal_rank_fusion(&[(9, 1.0)], &[(4, 1.0)], 0.5, 60.0);
        assert_eq!(ids(&fused), vec![4, 9]);
    }

    #[test]
    fn test_both_empty() {
        let empty: Vec<(usize, f32)> = Vec::new();
        assert!(reciprocal_rank_fusion(&empty, &empty, 0.5, 60.0).is_empty());
    }
}
