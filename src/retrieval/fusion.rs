//! Score fusion for multi-query retrieval
//!
//! Result lists from different query variations are merged by document
//! id, keeping the single highest score observed per id. No threshold
//! is re-applied after merging; the per-variation searches already
//! filtered at their relaxed threshold.

use ahash::AHashMap;
use std::cmp::Ordering;

use crate::document::SearchResult;

/// Merge lists by id keeping the max score, sort descending, truncate
pub fn merge_keep_max(lists: Vec<Vec<SearchResult>>, limit: usize) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = Vec::new();
    let mut index: AHashMap<String, usize> = AHashMap::new();

    for list in lists {
        for result in list {
            match index.get(&result.document.id) {
                Some(&i) => {
                    if result.score > merged[i].score {
                        merged[i] = result;
                    }
                }
                None => {
                    index.insert(result.document.id.clone(), merged.len());
                    merged.push(result);
                }
            }
        }
    }

    // Stable sort keeps first-seen order for equal scores
    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn result(id: &str, score: f32) -> SearchResult {
        SearchResult {
            document: Document::with_id(id, format!("content of {}", id)),
            score,
            distance: 1.0 - score,
            rank: 0,
        }
    }

    #[test]
    fn test_keeps_highest_score_per_id() {
        let merged = merge_keep_max(
            vec![
                vec![result("a", 0.6), result("b", 0.9)],
                vec![result("a", 0.8), result("c", 0.5)],
            ],
            10,
        );

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].document.id, "b");
        assert_eq!(merged[1].document.id, "a");
        assert!((merged[1].score - 0.8).abs() < 1e-6);
        assert_eq!(merged[2].document.id, "c");
    }

    #[test]
    fn test_lower_duplicate_does_not_replace() {
        let merged = merge_keep_max(vec![vec![result("a", 0.8)], vec![result("a", 0.3)]], 10);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_truncates_to_limit() {
        let merged = merge_keep_max(
            vec![vec![result("a", 0.9), result("b", 0.8), result("c", 0.7)]],
            2,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].document.id, "b");
    }

    #[test]
    fn test_equal_scores_keep_first_seen_order() {
        let merged = merge_keep_max(vec![vec![result("x", 0.5)], vec![result("y", 0.5)]], 10);
        assert_eq!(merged[0].document.id, "x");
        assert_eq!(merged[1].document.id, "y");
    }

    #[test]
    fn test_empty_input() {
        assert!(merge_keep_max(Vec::new(), 5).is_empty());
        assert!(merge_keep_max(vec![Vec::new(), Vec::new()], 5).is_empty());
    }
}
