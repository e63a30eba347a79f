//! Maximal marginal relevance selection
//!
//! Greedy selection balancing relevance against diversity. The highest
//! scoring candidate always leads; each further slot goes to the
//! candidate maximizing `lambda * relevance - (1 - lambda) * max
//! similarity to the already selected`, where similarity is Jaccard
//! overlap of content word sets. Scores are left untouched so callers
//! can still see the original relevance of each pick.

use ahash::AHashSet;

use super::keywords::{jaccard, word_set};
use crate::document::SearchResult;

/// Select up to `limit` results from candidates sorted by descending
/// score. Ties prefer the earlier (better ranked) candidate.
pub fn select(candidates: Vec<SearchResult>, limit: usize, lambda: f32) -> Vec<SearchResult> {
    if candidates.is_empty() || limit == 0 {
        return Vec::new();
    }

    let word_sets: Vec<AHashSet<String>> = candidates
        .iter()
        .map(|r| word_set(&r.document.content))
        .collect();

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(limit.min(candidates.len()));

    while selected.len() < limit && !remaining.is_empty() {
        let pos = if selected.is_empty() {
            best_position(&remaining, |i| candidates[i].score)
        } else {
            best_position(&remaining, |i| {
                let max_similarity = selected
                    .iter()
                    .map(|&s| jaccard(&word_sets[i], &word_sets[s]))
                    .fold(0.0f32, f32::max);
                lambda * candidates[i].score - (1.0 - lambda) * max_similarity
            })
        };
        selected.push(remaining.remove(pos));
    }

    selected.into_iter().map(|i| candidates[i].clone()).collect()
}

/// Position of the strictly-best index, keeping the first on ties
fn best_position<F: Fn(usize) -> f32>(indices: &[usize], score: F) -> usize {
    let mut best_pos = 0;
    let mut best_score = score(indices[0]);
    for (pos, &idx) in indices.iter().enumerate().skip(1) {
        let s = score(idx);
        if s > best_score {
            best_score = s;
            best_pos = pos;
        }
    }
    best_pos
}
