//! Question answering pipeline end to end
//!
//! Indexing with enrichment and chunking, retrieval with
//! post-processing, extractive answering, confidence, history, and
//! persistence over SQLite.

use std::sync::Arc;

use tempfile::TempDir;

use mnemo::backend::{MemoryBackend, SqliteBackend};
use mnemo::document::Document;
use mnemo::embedding::{EmbeddingProvider, HashingProvider};
use mnemo::rag::{RagEngine, RagRequest, NO_RESULTS_MESSAGE};
use mnemo::retrieval::{RetrievalEngine, Strategy};
use mnemo::store::VectorStoreManager;

struct Harness {
    store: Arc<VectorStoreManager>,
    retrieval: Arc<RetrievalEngine>,
    engine: RagEngine,
}

async fn memory_harness() -> Harness {
    let store = Arc::new(VectorStoreManager::new(Arc::new(MemoryBackend::new())));
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256).unwrap());
    store.create_collection("kb", provider).await.unwrap();
    let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
    let engine = RagEngine::new(Arc::clone(&store), Arc::clone(&retrieval));
    Harness {
        store,
        retrieval,
        engine,
    }
}

fn kb_documents() -> Vec<Document> {
    vec![
        Document::with_id("python_basics", "Python is a high-level programming language."),
        Document::with_id(
            "ai_intro",
            "Artificial intelligence involves computer systems performing human-like tasks.",
        ),
        Document::with_id(
            "sourdough",
            "Sourdough bread needs a mature starter and patience.",
        ),
    ]
}

#[tokio::test]
async fn test_index_then_ask() {
    let harness = memory_harness().await;
    let report = harness
        .engine
        .index_documents("kb", kb_documents(), true)
        .await
        .unwrap();
    assert_eq!(report.documents_in, 3);
    assert_eq!(report.chunks_created, 3);
    assert_eq!(report.ingest.failed, 0);

    let response = harness
        .engine
        .query(&RagRequest::new("kb", "What is Python?"))
        .await;

    assert!(response.answer.contains("Python is a high-level programming language"));
    assert!(response.confidence > 0.0);
    assert_eq!(response.sources[0].document.id, "python_basics");
    assert_eq!(response.sources[0].rank, 1);
    assert!(!response.metadata.generation_available);
    assert!(response.metadata.context_chars > 0);
    assert_eq!(response.metadata.strategy, "semantic");
}

#[tokio::test]
async fn test_empty_collection_answers_with_fixed_message() {
    let harness = memory_harness().await;

    let response = harness
        .engine
        .query(&RagRequest::new("kb", "What is Python?"))
        .await;

    assert_eq!(response.answer, NO_RESULTS_MESSAGE);
    assert_eq!(response.confidence, 0.0);
    assert!(response.sources.is_empty());
    assert!(harness.engine.history().await.is_empty());
}

#[tokio::test]
async fn test_long_document_is_chunked_and_answerable() {
    let harness = memory_harness().await;

    // One distinctive fact buried in filler prose well past one chunk
    let filler = "The afternoon light settled over the quiet valley while nothing much happened. ";
    let mut content = filler.repeat(16);
    content.push_str("The blue whale is the largest living creature on Earth. ");
    content.push_str(&filler.repeat(16));

    let report = harness
        .engine
        .index_documents(
            "kb",
            vec![Document::with_id("facts", content)],
            true,
        )
        .await
        .unwrap();
    assert!(report.chunks_created > 1);

    let stats = harness.store.get_collection_stats("kb").await.unwrap();
    assert_eq!(stats.document_count, report.chunks_created);

    let response = harness
        .engine
        .query(&RagRequest::new("kb", "What is the largest living creature?"))
        .await;
    assert!(
        response.answer.contains("blue whale"),
        "expected the buried fact, got: {}",
        response.answer
    );

    // Chunks carry their parent id
    assert!(response.sources[0]
        .document
        .metadata
        .get("parent_document_id")
        .is_some());
}

#[tokio::test]
async fn test_repeated_question_served_from_cache() {
    let harness = memory_harness().await;
    harness
        .engine
        .index_documents("kb", kb_documents(), true)
        .await
        .unwrap();

    let request = RagRequest::new("kb", "What is Python?");
    let first = harness.engine.query(&request).await;
    let second = harness.engine.query(&request).await;

    let stats = harness.retrieval.cache_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(first.answer, second.answer);
    assert_eq!(first.sources.len(), second.sources.len());
}

#[tokio::test]
async fn test_indexing_invalidates_cached_retrievals() {
    let harness = memory_harness().await;
    harness
        .engine
        .index_documents("kb", kb_documents(), true)
        .await
        .unwrap();

    let request = RagRequest::new("kb", "What is Python?");
    harness.engine.query(&request).await;

    harness
        .engine
        .index_documents(
            "kb",
            vec![Document::with_id(
                "python_two",
                "Python supports multiple programming paradigms.",
            )],
            true,
        )
        .await
        .unwrap();

    harness.engine.query(&request).await;
    let stats = harness.retrieval.cache_stats().await;
    assert_eq!(stats.hits, 0, "indexing must drop the cached entry");
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_history_accumulates_in_order() {
    let harness = memory_harness().await;
    harness
        .engine
        .index_documents("kb", kb_documents(), true)
        .await
        .unwrap();

    harness
        .engine
        .query(&RagRequest::new("kb", "What is Python?"))
        .await;
    harness
        .engine
        .query(&RagRequest::new("kb", "What is artificial intelligence?"))
        .await;

    let history = harness.engine.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].question, "What is Python?");
    assert_eq!(history[1].question, "What is artificial intelligence?");
    assert!(history.iter().all(|entry| entry.source_count > 0));

    harness.engine.clear_history().await;
    assert!(harness.engine.history().await.is_empty());
}

#[tokio::test]
async fn test_strategy_override_is_reported() {
    let harness = memory_harness().await;
    harness
        .engine
        .index_documents("kb", kb_documents(), true)
        .await
        .unwrap();

    let response = harness
        .engine
        .query(&RagRequest::new("kb", "What is Python?").with_strategy(Strategy::hybrid()))
        .await;
    assert_eq!(response.metadata.strategy, "hybrid");
    assert_eq!(response.sources[0].document.id, "python_basics");
}

#[tokio::test]
async fn test_answers_survive_sqlite_reopen() {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("mnemo.db");
    let provider = || -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingProvider::new(256).unwrap())
    };

    {
        let store = Arc::new(VectorStoreManager::new(Arc::new(
            SqliteBackend::new(&db_path).unwrap(),
        )));
        store.create_collection("kb", provider()).await.unwrap();
        let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
        let engine = RagEngine::new(store, retrieval);
        engine
            .index_documents("kb", kb_documents(), true)
            .await
            .unwrap();
    }

    let store = Arc::new(VectorStoreManager::new(Arc::new(
        SqliteBackend::new(&db_path).unwrap(),
    )));
    assert!(store.open_collection("kb", provider()).await.unwrap());
    let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
    let engine = RagEngine::new(store, retrieval);

    let response = engine.query(&RagRequest::new("kb", "What is Python?")).await;
    assert!(response.answer.contains("Python is a high-level programming language"));
    assert!(response.confidence > 0.0);
}
