//! Retrieval strategies end to end
//!
//! Every strategy runs against the same small knowledge base through
//! the public engine API, including post-processing and the result
//! cache.

use std::sync::Arc;

use mnemo::backend::MemoryBackend;
use mnemo::document::Document;
use mnemo::embedding::{EmbeddingProvider, HashingProvider};
use mnemo::retrieval::{RetrievalEngine, RetrievalRequest, Strategy};
use mnemo::store::VectorStoreManager;

async fn knowledge_base(docs: Vec<Document>) -> (Arc<VectorStoreManager>, Arc<RetrievalEngine>) {
    let store = Arc::new(VectorStoreManager::new(Arc::new(MemoryBackend::new())));
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256).unwrap());
    store.create_collection("kb", provider).await.unwrap();
    store.add_documents("kb", docs, None).await.unwrap();
    let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
    (store, retrieval)
}

fn default_corpus() -> Vec<Document> {
    vec![
        Document::with_id("python_basics", "Python is a high-level programming language."),
        Document::with_id(
            "ai_intro",
            "Artificial intelligence involves computer systems performing human-like tasks.",
        ),
        Document::with_id(
            "rust_intro",
            "Rust is a systems programming language focused on safety.",
        ),
        Document::with_id(
            "sourdough",
            "Sourdough bread needs a mature starter and patience.",
        ),
    ]
}

#[tokio::test]
async fn test_semantic_ranks_python_first() {
    let (_, retrieval) = knowledge_base(default_corpus()).await;

    let results = retrieval
        .retrieve(&RetrievalRequest::new("kb", "What is Python?").with_limit(1))
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.id, "python_basics");
    assert_eq!(results[0].rank, 1);
}

#[tokio::test]
async fn test_every_strategy_answers_the_same_question() {
    let (_, retrieval) = knowledge_base(default_corpus()).await;

    let strategies = [
        Strategy::Semantic,
        Strategy::hybrid(),
        Strategy::mmr(),
        Strategy::Contextual,
        Strategy::multi_query(),
    ];

    for strategy in strategies {
        let label = strategy.label();
        let results = retrieval
            .retrieve(
                &RetrievalRequest::new("kb", "What is Python?")
                    .with_strategy(strategy)
                    .with_limit(3),
            )
            .await;

        assert!(!results.is_empty(), "{} returned nothing", label);
        assert_eq!(
            results[0].document.id, "python_basics",
            "{} ranked the wrong document first",
            label
        );
        // Ranks are contiguous from 1 regardless of strategy
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.rank, i + 1, "{} broke rank assignment", label);
        }
    }
}

#[tokio::test]
async fn test_threshold_filters_weak_matches() {
    let (_, retrieval) = knowledge_base(default_corpus()).await;

    let results = retrieval
        .retrieve(
            &RetrievalRequest::new("kb", "What is Python?")
                .with_limit(10)
                .with_threshold(0.2),
        )
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].document.id, "python_basics");
    assert!(results[0].score >= 0.2);
}

#[tokio::test]
async fn test_contextual_expansion_improves_table_hit() {
    // "ai" triggers the built-in expansion table; the expanded query
    // shares far more features with the AI document than the bare one
    let (_, retrieval) = knowledge_base(default_corpus()).await;

    let semantic = retrieval
        .retrieve(&RetrievalRequest::new("kb", "ai systems").with_limit(4))
        .await;
    let contextual = retrieval
        .retrieve(
            &RetrievalRequest::new("kb", "ai systems")
                .with_strategy(Strategy::Contextual)
                .with_limit(4),
        )
        .await;

    let score_of = |results: &[mnemo::document::SearchResult]| {
        results
            .iter()
            .find(|r| r.document.id == "ai_intro")
            .map(|r| r.score)
    };

    let semantic_score = score_of(&semantic).expect("semantic missed ai_intro");
    let contextual_score = score_of(&contextual).expect("contextual missed ai_intro");
    assert!(
        contextual_score > semantic_score + 0.05,
        "expected expansion to help: {} vs {}",
        contextual_score,
        semantic_score
    );
}

#[tokio::test]
async fn test_multi_query_variation_recovers_synonym_hit() {
    // "build" varies to "create"; the variation matches the document
    // wording much more closely than the original query
    let mut docs = default_corpus();
    docs.push(Document::with_id(
        "sql_index",
        "You create an index with the create index statement.",
    ));
    let (_, retrieval) = knowledge_base(docs).await;

    let semantic = retrieval
        .retrieve(&RetrievalRequest::new("kb", "how to build an index").with_limit(5))
        .await;
    let fused = retrieval
        .retrieve(
            &RetrievalRequest::new("kb", "how to build an index")
                .with_strategy(Strategy::multi_query())
                .with_limit(5),
        )
        .await;

    let score_of = |results: &[mnemo::document::SearchResult]| {
        results
            .iter()
            .find(|r| r.document.id == "sql_index")
            .map(|r| r.score)
            .unwrap_or(0.0)
    };

    assert!(
        score_of(&fused) > score_of(&semantic) + 0.05,
        "variation should lift the synonym document: {} vs {}",
        score_of(&fused),
        score_of(&semantic)
    );

    // Merging never duplicates ids
    let mut ids: Vec<&str> = fused.iter().map(|r| r.document.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), fused.len());
}

#[tokio::test]
async fn test_diversify_drops_verbatim_duplicates() {
    let docs = vec![
        Document::with_id("note_a", "Kubernetes restarts crashed pods automatically."),
        Document::with_id("note_copy", "Kubernetes restarts crashed pods automatically."),
        Document::with_id("note_b", "Postgres vacuuming reclaims dead tuple space."),
    ];
    let (_, retrieval) = knowledge_base(docs).await;

    let results = retrieval
        .retrieve(
            &RetrievalRequest::new("kb", "How does Kubernetes restart pods?")
                .with_limit(10)
                .with_post_processing(true, true),
        )
        .await;

    let duplicates = results
        .iter()
        .filter(|r| r.document.id.starts_with("note_a") || r.document.id.starts_with("note_copy"))
        .count();
    assert_eq!(duplicates, 1, "only one copy of identical content survives");
}

#[tokio::test]
async fn test_cache_hits_and_invalidation() {
    let (store, retrieval) = knowledge_base(default_corpus()).await;

    let request = RetrievalRequest::new("kb", "What is Python?").with_limit(2);
    let first = retrieval.retrieve(&request).await;
    let second = retrieval.retrieve(&request).await;

    let stats = retrieval.cache_stats().await;
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(first.len(), second.len());
    assert_eq!(first[0].document.id, second[0].document.id);

    // A different limit is a different cache entry
    retrieval
        .retrieve(&RetrievalRequest::new("kb", "What is Python?").with_limit(3))
        .await;
    assert_eq!(retrieval.cache_stats().await.misses, 2);

    // New documents invalidate the collection's entries
    store
        .add_documents(
            "kb",
            vec![Document::with_id(
                "python_two",
                "Python supports multiple programming paradigms.",
            )],
            None,
        )
        .await
        .unwrap();
    retrieval.invalidate_collection("kb").await;

    retrieval.retrieve(&request).await;
    let stats = retrieval.cache_stats().await;
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn test_unknown_collection_is_empty_not_error() {
    let (_, retrieval) = knowledge_base(default_corpus()).await;

    let results = retrieval
        .retrieve(&RetrievalRequest::new("ghost", "anything at all"))
        .await;
    assert!(results.is_empty());
}
