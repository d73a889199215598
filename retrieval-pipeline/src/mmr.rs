//! Maximal Marginal Relevance selection.
//!
//! Picks a diverse subset from a scored candidate pool: each round takes
//! the item maximizing `λ·relevance − (1−λ)·max_sim(selected)`. The output
//! is deterministic for identical input.

use std::cmp::Ordering;

use common::utils::embedding::cosine_similarity;

pub const DEFAULT_LAMBDA: f32 = 0.70;

/// One selectable item: its relevance score and (optional) embedding.
#[derive(Debug, Clone)]
pub struct MmrCandidate {
    pub relevance: f32,
    pub embedding: Option<Vec<f32>>,
}

/// Select up to `k` candidate indices. Candidates without an embedding or
/// with non-positive relevance are excluded; if nothing qualifies, fall
/// back to plain top-k by relevance. Ties break toward the smaller
/// original index, and the returned indices are sorted ascending.
pub fn select(candidates: &[MmrCandidate], k: usize, lambda: f32) -> Vec<usize> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let valid: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.embedding.is_some() && c.relevance > 0.0)
        .map(|(i, _)| i)
        .collect();

    if valid.is_empty() {
        return top_k_by_relevance(candidates, k);
    }

    let mut remaining = valid;
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(remaining.len()));

    // Seed with the highest-relevance valid item.
    let seed_pos = argmax(&remaining, |&i| relevance_at(candidates, i));
    selected.push(remaining.remove(seed_pos));

    while selected.len() < k && !remaining.is_empty() {
        let next_pos = argmax(&remaining, |&i| {
            let max_sim = selected
                .iter()
                .map(|&s| similarity(candidates, i, s))
                .fold(f32::MIN, f32::max);
            lambda * relevance_at(candidates, i) - (1.0 - lambda) * max_sim
        });
        selected.push(remaining.remove(next_pos));
    }

    selected.sort_unstable();
    selected
}

fn relevance_at(candidates: &[MmrCandidate], index: usize) -> f32 {
    candidates.get(index).map(|c| c.relevance).unwrap_or(0.0)
}

fn similarity(candidates: &[MmrCandidate], a: usize, b: usize) -> f32 {
    match (
        candidates.get(a).and_then(|c| c.embedding.as_deref()),
        candidates.get(b).and_then(|c| c.embedding.as_deref()),
    ) {
        (Some(va), Some(vb)) => cosine_similarity(va, vb),
        _ => 0.0,
    }
}

/// Position of the best-scoring element; earlier position wins ties.
fn argmax<F: Fn(&usize) -> f32>(items: &[usize], score: F) -> usize {
    let mut best_pos = 0usize;
    let mut best_score = f32::MIN;
    for (pos, item) in items.iter().enumerate() {
        let s = score(item);
        if s > best_score {
            best_score = s;
            best_pos = pos;
        }
    }
    best_pos
}

fn top_k_by_relevance(candidates: &[MmrCandidate], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..candidates.len()).collect();
    indices.sort_by(|&a, &b| {
        relevance_at(candidates, b)
            .partial_cmp(&relevance_at(candidates, a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.cmp(&b))
    });
    indices.truncate(k);
    indices.sort_unstable();
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(relevance: f32, embedding: Option<Vec<f32>>) -> MmrCandidate {
        MmrCandidate {
            relevance,
            embedding,
        }
    }

    #[test]
    fn test_seeds_with_highest_relevance() {
        let pool = vec![
            candidate(0.2, Some(vec![1.0, 0.0])),
            candidate(0.9, Some(vec![0.0, 1.0])),
            candidate(0.5, Some(vec![0.5, 0.5])),
        ];
        let selected = select(&pool, 1, DEFAULT_LAMBDA);
        assert_eq!(selected, vec![1]);
    }

    #[test]
    fn test_diversity_beats_redundancy() {
        // Two near-duplicates with top relevance plus one distinct item:
        // the pair's second copy must lose to the distinct item.
        let pool = vec![
            candidate(0.9, Some(vec![1.0, 0.0])),
            candidate(0.89, Some(vec![1.0, 0.001])),
            candidate(0.5, Some(vec![0.0, 1.0])),
        ];
        let selected = select(&pool, 2, DEFAULT_LAMBDA);
        assert_eq!(selected, vec![0, 2]);
    }

    #[test]
    fn test_null_embeddings_and_nonpositive_relevance_excluded() {
        let pool = vec![
            candidate(0.9, None),
            candidate(0.0, Some(vec![1.0, 0.0])),
            candidate(0.4, Some(vec![0.0, 1.0])),
        ];
        let selected = select(&pool, 3, DEFAULT_LAMBDA);
        assert_eq!(selected, vec![2]);
    }

    #[test]
    fn test_fallback_to_top_k_when_none_qualify() {
        let pool = vec![
            candidate(0.9, None),
            candidate(0.7, None),
            candidate(0.8, None),
        ];
        let selected = select(&pool, 2, DEFAULT_LAMBDA);
        assert_eq!(selected, vec![0, 2], "top-2 by relevance, ascending order");
    }

    #[test]
    fn test_output_sorted_and_deterministic() {
        let pool = vec![
            candidate(0.5, Some(vec![1.0, 0.0, 0.0])),
            candidate(0.8, Some(vec![0.0, 1.0, 0.0])),
            candidate(0.6, Some(vec![0.0, 0.0, 1.0])),
            candidate(0.55, Some(vec![0.7, 0.7, 0.0])),
        ];
        let first = select(&pool, 3, DEFAULT_LAMBDA);
        let second = select(&pool, 3, DEFAULT_LAMBDA);
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(first, sorted);
    }

    #[test]
    fn test_ties_prefer_smaller_index() {
        let pool = vec![
            candidate(0.5, Some(vec![1.0, 0.0])),
            candidate(0.5, Some(vec![1.0, 0.0])),
        ];
        let selected = select(&pool, 1, DEFAULT_LAMBDA);
        assert_eq!(selected, vec![0]);
    }

    #[test]
    fn test_k_zero_and_empty_pool() {
        assert!(select(&[], 5, DEFAULT_LAMBDA).is_empty());
        let pool = vec![candidate(0.5, Some(vec![1.0]))];
        assert!(select(&pool, 0, DEFAULT_LAMBDA).is_empty());
    }
}
