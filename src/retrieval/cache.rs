//! Bounded LRU cache for retrieval results
//!
//! Keyed by (collection, strategy + parameters, query, limit,
//! threshold). A hit returns the stored list verbatim, post-processing
//! included, so repeated queries skip embedding and backend work
//! entirely. Writers must invalidate their collection's entries.

use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;

use crate::document::SearchResult;

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// Cache key for one retrieval call
///
/// The threshold is stored as raw bits so the key stays `Eq + Hash`;
/// two thresholds are the same entry only when bit-identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    collection: String,
    strategy: String,
    query: String,
    limit: usize,
    threshold_bits: u32,
}

impl CacheKey {
    pub fn new(
        collection: &str,
        strategy: String,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            strategy,
            query: query.to_string(),
            limit,
            threshold_bits: threshold.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

/// LRU-bounded result cache
pub struct ResultCache {
    entries: LruCache<CacheKey, Vec<SearchResult>>,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<SearchResult>> {
        match self.entries.get(key) {
            Some(results) => {
                self.hits += 1;
                Some(results.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: CacheKey, results: Vec<SearchResult>) {
        self.entries.put(key, results);
    }

    /// Drop every entry belonging to one collection; returns how many
    pub fn invalidate_collection(&mut self, collection: &str) -> usize {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| key.collection == collection)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        stale.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.entries.cap().get(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn key(collection: &str, query: &str) -> CacheKey {
        CacheKey::new(collection, "semantic".to_string(), query, 5, 0.0)
    }

    fn results(id: &str) -> Vec<SearchResult> {
        vec![SearchResult {
            document: Document::with_id(id, "content"),
            score: 0.9,
            distance: 0.1,
            rank: 1,
        }]
    }

    #[test]
    fn test_hit_returns_stored_list_verbatim() {
        let mut cache = ResultCache::new(8);
        cache.put(key("kb", "q"), results("a"));

        let hit = cache.get(&key("kb", "q")).unwrap();
        assert_eq!(hit[0].document.id, "a");
        assert_eq!(hit[0].rank, 1);
        assert_eq!(hit[0].score, 0.9);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_distinct_parameters_are_distinct_entries() {
        let mut cache = ResultCache::new(8);
        cache.put(key("kb", "q"), results("a"));

        assert!(cache.get(&key("kb", "other")).is_none());
        assert!(cache.get(&key("other", "q")).is_none());
        assert!(cache
            .get(&CacheKey::new("kb", "semantic".to_string(), "q", 6, 0.0))
            .is_none());
        assert!(cache
            .get(&CacheKey::new("kb", "semantic".to_string(), "q", 5, 0.5))
            .is_none());
        assert!(cache
            .get(&CacheKey::new("kb", "hybrid:0.2".to_string(), "q", 5, 0.0))
            .is_none());
        assert_eq!(cache.stats().misses, 5);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let mut cache = ResultCache::new(2);
        cache.put(key("kb", "one"), results("1"));
        cache.put(key("kb", "two"), results("2"));
        cache.put(key("kb", "three"), results("3"));

        assert!(cache.get(&key("kb", "one")).is_none());
        assert!(cache.get(&key("kb", "two")).is_some());
        assert!(cache.get(&key("kb", "three")).is_some());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn test_invalidate_only_target_collection() {
        let mut cache = ResultCache::new(8);
        cache.put(key("kb", "q1"), results("a"));
        cache.put(key("kb", "q2"), results("b"));
        cache.put(key("notes", "q1"), results("c"));

        assert_eq!(cache.invalidate_collection("kb"), 2);
        assert!(cache.get(&key("kb", "q1")).is_none());
        assert!(cache.get(&key("notes", "q1")).is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = ResultCache::new(0);
        cache.put(key("kb", "q"), results("a"));
        assert!(cache.get(&key("kb", "q")).is_some());
    }
}
