//! Retrieval strategies with caching
//!
//! One query in, one ranked result list out. Five strategies share the
//! store's semantic search underneath: plain semantic, keyword-boosted
//! hybrid, MMR diversity selection, table-driven contextual expansion,
//! and multi-query fusion over synonym variations. Rerank and diversify
//! passes compose with any of them, and finished lists land in a
//! bounded LRU cache.

mod cache;
mod expansion;
mod fusion;
pub(crate) mod keywords;
mod mmr;
mod reranker;

pub use cache::{CacheKey, CacheStats, ResultCache, DEFAULT_CACHE_CAPACITY};
pub use expansion::ExpansionTables;

use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::document::{assign_ranks, SearchResult};
use crate::store::{SearchRequest, VectorStoreManager};

pub const DEFAULT_KEYWORD_BOOST: f32 = 0.20;
pub const DEFAULT_MMR_LAMBDA: f32 = 0.7;
pub const DEFAULT_MMR_FETCH_MULTIPLIER: usize = 3;
/// MMR over-fetches at a relaxed threshold so diversity selection is
/// not starved of candidates
pub const DEFAULT_MMR_THRESHOLD_SCALE: f32 = 0.8;
pub const DEFAULT_MAX_VARIATIONS: usize = 4;
/// Per-variation searches also run relaxed; the final merge does not
/// re-apply the caller's threshold
pub const DEFAULT_VARIATION_THRESHOLD_SCALE: f32 = 0.8;
pub const DEFAULT_RERANK_MAX_BOOST: f32 = 0.10;
pub const DEFAULT_DIVERSIFY_THRESHOLD: f32 = 0.8;

/// Retrieval strategy and its parameters
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Plain vector similarity
    Semantic,
    /// Semantic plus a boost for query keywords present in content
    Hybrid { keyword_boost: f32 },
    /// Maximal marginal relevance selection over an over-fetched pool
    Mmr {
        lambda: f32,
        fetch_multiplier: usize,
        threshold_scale: f32,
    },
    /// Expand the query from the expansion table, then semantic
    Contextual,
    /// Search synonym variations and fuse by max score per document
    MultiQuery {
        max_variations: usize,
        variation_threshold_scale: f32,
    },
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Semantic
    }
}

impl Strategy {
    pub fn hybrid() -> Self {
        Strategy::Hybrid {
            keyword_boost: DEFAULT_KEYWORD_BOOST,
        }
    }

    pub fn mmr() -> Self {
        Strategy::Mmr {
            lambda: DEFAULT_MMR_LAMBDA,
            fetch_multiplier: DEFAULT_MMR_FETCH_MULTIPLIER,
            threshold_scale: DEFAULT_MMR_THRESHOLD_SCALE,
        }
    }

    pub fn multi_query() -> Self {
        Strategy::MultiQuery {
            max_variations: DEFAULT_MAX_VARIATIONS,
            variation_threshold_scale: DEFAULT_VARIATION_THRESHOLD_SCALE,
        }
    }

    /// Parse a strategy name, with default parameters
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "semantic" => Some(Strategy::Semantic),
            "hybrid" => Some(Strategy::hybrid()),
            "mmr" => Some(Strategy::mmr()),
            "contextual" => Some(Strategy::Contextual),
            "multi-query" | "multi_query" | "multiquery" => Some(Strategy::multi_query()),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Semantic => "semantic",
            Strategy::Hybrid { .. } => "hybrid",
            Strategy::Mmr { .. } => "mmr",
            Strategy::Contextual => "contextual",
            Strategy::MultiQuery { .. } => "multi-query",
        }
    }

    /// Cache key component: label plus parameters, so differently
    /// tuned runs never collide
    fn cache_label(&self) -> String {
        match self {
            Strategy::Semantic => "semantic".to_string(),
            Strategy::Contextual => "contextual".to_string(),
            Strategy::Hybrid { keyword_boost } => format!("hybrid:{}", keyword_boost),
            Strategy::Mmr {
                lambda,
                fetch_multiplier,
                threshold_scale,
            } => format!("mmr:{}:{}:{}", lambda, fetch_multiplier, threshold_scale),
            Strategy::MultiQuery {
                max_variations,
                variation_threshold_scale,
            } => format!(
                "multi-query:{}:{}",
                max_variations, variation_threshold_scale
            ),
        }
    }
}

/// One retrieval call
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub collection: String,
    pub query: String,
    pub strategy: Strategy,
    pub limit: usize,
    pub score_threshold: f32,
    pub rerank: bool,
    pub diversify: bool,
}

impl RetrievalRequest {
    pub fn new(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            query: query.into(),
            strategy: Strategy::default(),
            limit: 5,
            score_threshold: 0.0,
            rerank: false,
            diversify: false,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub fn with_post_processing(mut self, rerank: bool, diversify: bool) -> Self {
        self.rerank = rerank;
        self.diversify = diversify;
        self
    }
}

/// Executes retrieval strategies against one store manager
///
/// The cache key deliberately excludes the rerank/diversify flags: a
/// hit returns whatever list was computed first, verbatim, with no
/// further post-processing.
pub struct RetrievalEngine {
    store: Arc<VectorStoreManager>,
    cache: Mutex<ResultCache>,
    tables: ExpansionTables,
    rerank_max_boost: f32,
    diversify_threshold: f32,
}

impl RetrievalEngine {
    pub fn new(store: Arc<VectorStoreManager>) -> Self {
        Self {
            store,
            cache: Mutex::new(ResultCache::new(DEFAULT_CACHE_CAPACITY)),
            tables: ExpansionTables::default(),
            rerank_max_boost: DEFAULT_RERANK_MAX_BOOST,
            diversify_threshold: DEFAULT_DIVERSIFY_THRESHOLD,
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Mutex::new(ResultCache::new(capacity));
        self
    }

    pub fn with_tables(mut self, tables: ExpansionTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_refinement(mut self, rerank_max_boost: f32, diversify_threshold: f32) -> Self {
        self.rerank_max_boost = rerank_max_boost;
        self.diversify_threshold = diversify_threshold;
        self
    }

    /// Execute the requested strategy plus post-processing
    ///
    /// Failures below (missing collection, backend trouble) surface as
    /// an empty list, consistent with the store manager.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Vec<SearchResult> {
        let key = CacheKey::new(
            &request.collection,
            request.strategy.cache_label(),
            &request.query,
            request.limit,
            request.score_threshold,
        );

        if let Some(cached) = self.cache.lock().await.get(&key) {
            tracing::debug!(
                collection = %request.collection,
                strategy = request.strategy.label(),
                "Retrieval cache hit"
            );
            return cached;
        }

        let mut results = match &request.strategy {
            Strategy::Semantic => {
                self.search(
                    &request.collection,
                    &request.query,
                    request.limit,
                    request.score_threshold,
                )
                .await
            }
            Strategy::Hybrid { keyword_boost } => self.hybrid(request, *keyword_boost).await,
            Strategy::Mmr {
                lambda,
                fetch_multiplier,
                threshold_scale,
            } => {
                self.mmr(request, *lambda, *fetch_multiplier, *threshold_scale)
                    .await
            }
            Strategy::Contextual => self.contextual(request).await,
            Strategy::MultiQuery {
                max_variations,
                variation_threshold_scale,
            } => {
                self.multi_query(request, *max_variations, *variation_threshold_scale)
                    .await
            }
        };

        if request.rerank {
            results = reranker::rerank(results, &request.query, self.rerank_max_boost);
        }
        if request.diversify {
            results = reranker::diversify(results, self.diversify_threshold);
        }
        assign_ranks(&mut results);

        self.cache.lock().await.put(key, results.clone());
        results
    }

    /// Drop cached results for a collection after writes to it
    pub async fn invalidate_collection(&self, collection: &str) {
        let dropped = self
            .cache
            .lock()
            .await
            .invalidate_collection(collection);
        if dropped > 0 {
            tracing::debug!(collection = %collection, dropped, "Invalidated cached retrievals");
        }
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Vec<SearchResult> {
        self.store
            .semantic_search(
                &SearchRequest::new(collection, query)
                    .with_limit(limit)
                    .with_threshold(threshold),
            )
            .await
    }

    async fn hybrid(&self, request: &RetrievalRequest, keyword_boost: f32) -> Vec<SearchResult> {
        let mut results = self
            .search(
                &request.collection,
                &request.query,
                request.limit,
                request.score_threshold,
            )
            .await;

        let query_keywords = keywords::extract_keywords(&request.query);
        if query_keywords.is_empty() {
            return results;
        }

        for result in &mut results {
            let fraction =
                keywords::contained_fraction(&query_keywords, &result.document.content);
            result.score = (result.score * (1.0 + keyword_boost * fraction)).min(1.0);
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results
    }

    async fn mmr(
        &self,
        request: &RetrievalRequest,
        lambda: f32,
        fetch_multiplier: usize,
        threshold_scale: f32,
    ) -> Vec<SearchResult> {
        let pool_size = request
            .limit
            .saturating_mul(fetch_multiplier.max(1))
            .max(request.limit);
        let relaxed_threshold = request.score_threshold * threshold_scale;

        let candidates = self
            .search(
                &request.collection,
                &request.query,
                pool_size,
                relaxed_threshold,
            )
            .await;

        mmr::select(candidates, request.limit, lambda)
    }

    async fn contextual(&self, request: &RetrievalRequest) -> Vec<SearchResult> {
        let expanded = self.tables.expand_query(&request.query);
        if expanded != request.query {
            tracing::debug!(original = %request.query, expanded = %expanded, "Expanded query");
        }
        self.search(
            &request.collection,
            &expanded,
            request.limit,
            request.score_threshold,
        )
        .await
    }

    async fn multi_query(
        &self,
        request: &RetrievalRequest,
        max_variations: usize,
        variation_threshold_scale: f32,
    ) -> Vec<SearchResult> {
        let variations = self
            .tables
            .query_variations(&request.query, max_variations);
        let relaxed_threshold = request.score_threshold * variation_threshold_scale;

        let mut lists = Vec::with_capacity(variations.len());
        for variation in &variations {
            lists.push(
                self.search(
                    &request.collection,
                    variation,
                    request.limit,
                    relaxed_threshold,
                )
                .await,
            );
        }

        fusion::merge_keep_max(lists, request.limit)
    }
}
