//! Post-retrieval refinement: lexical rerank and diversity filtering
//!
//! Both passes compose with any strategy. Rerank nudges scores by word
//! overlap with the query and re-sorts; diversify greedily drops
//! near-duplicate passages. Boosted scores stay clamped to [0,1] so
//! downstream confidence math keeps its range.

use ahash::AHashSet;
use std::cmp::Ordering;

use super::keywords::{jaccard, word_overlap, word_set};
use crate::document::SearchResult;

/// Boost each result by up to `max_boost` proportional to the fraction
/// of query words found in its content, then re-sort descending
pub fn rerank(mut results: Vec<SearchResult>, query: &str, max_boost: f32) -> Vec<SearchResult> {
    for result in &mut results {
        let overlap = word_overlap(query, &result.document.content);
        result.score = (result.score * (1.0 + max_boost * overlap)).min(1.0);
    }
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    results
}

/// Keep a result only while its Jaccard similarity to every already
/// kept result stays below `threshold`; the top result always survives
pub fn diversify(results: Vec<SearchResult>, threshold: f32) -> Vec<SearchResult> {
    let mut kept: Vec<SearchResult> = Vec::new();
    let mut kept_sets: Vec<AHashSet<String>> = Vec::new();

    for result in results {
        let set = word_set(&result.document.content);
        let near_duplicate = kept_sets.iter().any(|k| jaccard(&set, k) >= threshold);
        if !near_duplicate {
            kept.push(result);
            kept_sets.push(set);
        }
    }
    kept
}
