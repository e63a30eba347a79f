//! Retrieval-augmented question answering
//!
//! `RagEngine` composes the vector store, the retrieval engine, and an
//! optional generation backend into one question-answering pipeline:
//! documents are enriched and chunked on the way in; questions are
//! answered from retrieved context, by the generation backend when one
//! is configured and reachable, extractively otherwise.

mod chunker;
mod context;
mod history;

pub use chunker::{chunk_document, enrich_metadata, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use context::{
    assemble_context, extractive_answer, score_confidence, split_sentences,
    DEFAULT_MAX_CONTEXT_CHARS, NO_MATCHING_SENTENCES_MESSAGE, NO_RESULTS_MESSAGE,
};
pub use history::{
    ConversationHistory, HistoryEntry, DEFAULT_HISTORY_MAX_ENTRIES, DEFAULT_HISTORY_TRIM_TO,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::document::{Document, SearchResult};
use crate::generation::{GenerationBackend, GenerationRequest};
use crate::retrieval::{RetrievalEngine, RetrievalRequest, Strategy};
use crate::store::{IngestReport, StoreResult, VectorStoreManager};

/// System prompt sent with every generation request
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the question using only \
     the provided context. If the context does not contain enough information, say so instead \
     of guessing.";

/// How many past turns are replayed into the prompt
const HISTORY_TURNS_IN_PROMPT: usize = 3;

/// Generation knobs forwarded to the backend
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 512,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct RagOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_context_chars: usize,
    pub use_history: bool,
    pub history_max_entries: usize,
    pub history_trim_to: usize,
    pub generation: GenerationOptions,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            use_history: true,
            history_max_entries: DEFAULT_HISTORY_MAX_ENTRIES,
            history_trim_to: DEFAULT_HISTORY_TRIM_TO,
            generation: GenerationOptions::default(),
        }
    }
}

/// One question against one collection
#[derive(Debug, Clone)]
pub struct RagRequest {
    pub collection: String,
    pub question: String,
    pub strategy: Strategy,
    pub limit: usize,
    pub score_threshold: f32,
}

impl RagRequest {
    pub fn new(collection: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            question: question.into(),
            strategy: Strategy::default(),
            limit: 5,
            score_threshold: 0.0,
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
}

/// How the answer in a [`RagResponse`] was produced
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub strategy: String,
    pub context_chars: usize,
    pub generation_available: bool,
    pub generation_used: bool,
    pub model: Option<String>,
}

/// Answer plus the evidence it was built from
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub question: String,
    pub answer: String,
    pub sources: Vec<SearchResult>,
    pub confidence: f32,
    pub elapsed_ms: u64,
    pub metadata: ResponseMetadata,
}

/// Summary of one indexing run
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    /// Documents handed to `index_documents`
    pub documents_in: usize,
    /// Documents written to the store after chunking
    pub chunks_created: usize,
    pub ingest: IngestReport,
}

pub struct RagEngine {
    store: Arc<VectorStoreManager>,
    retrieval: Arc<RetrievalEngine>,
    generation: Option<Arc<dyn GenerationBackend>>,
    options: RagOptions,
    history: Mutex<ConversationHistory>,
}

impl RagEngine {
    pub fn new(store: Arc<VectorStoreManager>, retrieval: Arc<RetrievalEngine>) -> Self {
        let options = RagOptions::default();
        let history = Mutex::new(ConversationHistory::new(
            options.history_max_entries,
            options.history_trim_to,
        ));
        Self {
            store,
            retrieval,
            generation: None,
            options,
            history,
        }
    }

    pub fn with_generation(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.generation = Some(backend);
        self
    }

    pub fn with_options(mut self, options: RagOptions) -> Self {
        self.history = Mutex::new(ConversationHistory::new(
            options.history_max_entries,
            options.history_trim_to,
        ));
        self.options = options;
        self
    }

    pub fn options(&self) -> &RagOptions {
        &self.options
    }

    /// Enrich, chunk, and ingest documents into `collection`
    ///
    /// Oversized documents are split when `chunk_large_docs` is set;
    /// everything else passes through whole. Cached retrievals for the
    /// collection are invalidated once the write lands.
    pub async fn index_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
        chunk_large_docs: bool,
    ) -> StoreResult<IndexReport> {
        let documents_in = documents.len();
        let mut prepared = Vec::with_capacity(documents.len());

        for mut document in documents {
            enrich_metadata(&mut document);
            if chunk_large_docs && document.char_count() > self.options.chunk_size {
                prepared.extend(chunk_document(
                    &document,
                    self.options.chunk_size,
                    self.options.chunk_overlap,
                ));
            } else {
                prepared.push(document);
            }
        }

        let chunks_created = prepared.len();
        let ingest = self.store.add_documents(collection, prepared, None).await?;
        self.retrieval.invalidate_collection(collection).await;

        tracing::info!(
            collection = %collection,
            documents_in,
            chunks_created,
            processed = ingest.processed,
            failed = ingest.failed,
            "Indexed documents"
        );

        Ok(IndexReport {
            documents_in,
            chunks_created,
            ingest,
        })
    }

    /// Answer a question from the collection
    ///
    /// Retrieval always runs with reranking and diversification. Zero
    /// retrieved sources short-circuits to a fixed message with zero
    /// confidence and leaves the conversation history untouched. A
    /// generation failure or timeout falls back to the extractive
    /// answer and discounts confidence; it is never surfaced as an
    /// error.
    pub async fn query(&self, request: &RagRequest) -> RagResponse {
        let start = Instant::now();

        let retrieval = RetrievalRequest::new(&request.collection, &request.question)
            .with_strategy(request.strategy.clone())
            .with_limit(request.limit)
            .with_threshold(request.score_threshold)
            .with_post_processing(true, true);
        let sources = self.retrieval.retrieve(&retrieval).await;

        if sources.is_empty() {
            tracing::debug!(
                collection = %request.collection,
                "No sources retrieved, returning fixed answer"
            );
            return RagResponse {
                question: request.question.clone(),
                answer: NO_RESULTS_MESSAGE.to_string(),
                sources,
                confidence: 0.0,
                elapsed_ms: start.elapsed().as_millis() as u64,
                metadata: ResponseMetadata {
                    strategy: request.strategy.label().to_string(),
                    context_chars: 0,
                    generation_available: self.generation.is_some(),
                    generation_used: false,
                    model: None,
                },
            };
        }

        let context = assemble_context(&sources, self.options.max_context_chars);
        let transcript = if self.options.use_history {
            self.history.lock().await.transcript(HISTORY_TURNS_IN_PROMPT)
        } else {
            String::new()
        };

        let mut generation_used = false;
        let mut generation_failed = false;
        let mut model = None;
        let answer = match &self.generation {
            Some(backend) => {
                let prompt = build_prompt(&request.question, &context, &transcript);
                let generation_request = GenerationRequest::new(prompt)
                    .with_system_prompt(SYSTEM_PROMPT)
                    .with_temperature(self.options.generation.temperature)
                    .with_max_tokens(self.options.generation.max_tokens);

                let outcome = tokio::time::timeout(
                    self.options.generation.timeout,
                    backend.generate(&generation_request),
                )
                .await;

                match outcome {
                    Ok(Ok(generation)) => {
                        generation_used = true;
                        model = Some(generation.model);
                        generation.text
                    }
                    Ok(Err(err)) => {
                        tracing::warn!(
                            error = %err,
                            "Generation failed, falling back to extractive answer"
                        );
                        generation_failed = true;
                        extractive_answer(&request.question, &context)
                    }
                    Err(_) => {
                        tracing::warn!(
                            timeout_ms = self.options.generation.timeout.as_millis() as u64,
                            "Generation timed out, falling back to extractive answer"
                        );
                        generation_failed = true;
                        extractive_answer(&request.question, &context)
                    }
                }
            }
            None => extractive_answer(&request.question, &context),
        };

        let confidence = score_confidence(&sources, &answer, generation_failed);

        if self.options.use_history {
            let mut entry = HistoryEntry::new(&request.question, &answer);
            entry.source_count = sources.len();
            entry.confidence = confidence;
            self.history.lock().await.push(entry);
        }

        RagResponse {
            question: request.question.clone(),
            answer,
            confidence,
            elapsed_ms: start.elapsed().as_millis() as u64,
            metadata: ResponseMetadata {
                strategy: request.strategy.label().to_string(),
                context_chars: context.chars().count(),
                generation_available: self.generation.is_some(),
                generation_used,
                model,
            },
            sources,
        }
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().await.entries().to_vec()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }
}

fn build_prompt(question: &str, context: &str, transcript: &str) -> String {
    let mut prompt = String::new();
    if !transcript.is_empty() {
        prompt.push_str("Previous conversation:\n");
        prompt.push_str(transcript);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Context:\n");
    prompt.push_str(context);
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question);
    prompt.push_str("\n\nAnswer:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::embedding::{EmbeddingProvider, HashingProvider};
    use crate::generation::{Generation, GenerationError};
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<Generation, GenerationError> {
            Ok(Generation {
                text: "Based on the provided context, Python is a high-level programming \
                       language used for many kinds of software."
                    .to_string(),
                model: "echo".to_string(),
                elapsed: Duration::from_millis(1),
            })
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl GenerationBackend for FailingBackend {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<Generation, GenerationError> {
            Err(GenerationError::Unavailable("connection refused".to_string()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl GenerationBackend for SlowBackend {
        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<Generation, GenerationError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Generation {
                text: "too late".to_string(),
                model: "slow".to_string(),
                elapsed: Duration::from_secs(5),
            })
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    fn kb_documents() -> Vec<Document> {
        vec![
            Document::with_id(
                "python_basics",
                "Python is a high-level programming language. It is widely used for \
                 scripting and data analysis.",
            ),
            Document::with_id(
                "ai_intro",
                "Artificial intelligence involves computer systems performing human-like \
                 tasks such as reasoning and perception.",
            ),
            Document::with_id(
                "cooking",
                "Slow roasting vegetables brings out their natural sweetness.",
            ),
        ]
    }

    async fn seeded_engine() -> RagEngine {
        let store = Arc::new(VectorStoreManager::new(Arc::new(MemoryBackend::new())));
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256).unwrap());
        store.create_collection("kb", provider).await.unwrap();
        let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
        let engine = RagEngine::new(store, retrieval);
        engine
            .index_documents("kb", kb_documents(), true)
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_query_without_sources_returns_fixed_answer() {
        let store = Arc::new(VectorStoreManager::new(Arc::new(MemoryBackend::new())));
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256).unwrap());
        store.create_collection("kb", provider).await.unwrap();
        let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
        let engine = RagEngine::new(store, retrieval);

        let response = engine.query(&RagRequest::new("kb", "What is Python?")).await;
        assert_eq!(response.answer, NO_RESULTS_MESSAGE);
        assert_eq!(response.confidence, 0.0);
        assert!(response.sources.is_empty());
        assert!(!response.metadata.generation_used);
        // An unanswerable question leaves no trace in the history
        assert!(engine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_query_unknown_collection_returns_fixed_answer() {
        let store = Arc::new(VectorStoreManager::new(Arc::new(MemoryBackend::new())));
        let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
        let engine = RagEngine::new(store, retrieval);

        let response = engine.query(&RagRequest::new("ghost", "anything")).await;
        assert_eq!(response.answer, NO_RESULTS_MESSAGE);
        assert_eq!(response.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_extractive_answer_without_generation_backend() {
        let engine = seeded_engine().await;

        let response = engine
            .query(&RagRequest::new("kb", "What is Python programming?"))
            .await;

        assert!(response.answer.contains("Python"));
        assert!(!response.sources.is_empty());
        assert_eq!(response.sources[0].rank, 1);
        assert!(response.confidence > 0.0);
        assert!(!response.metadata.generation_available);
        assert!(!response.metadata.generation_used);
        assert!(response.metadata.model.is_none());
        assert!(response.metadata.context_chars > 0);
    }

    #[tokio::test]
    async fn test_index_documents_chunks_oversized_content() {
        let store = Arc::new(VectorStoreManager::new(Arc::new(MemoryBackend::new())));
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256).unwrap());
        store.create_collection("kb", provider).await.unwrap();
        let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
        let engine = RagEngine::new(store, retrieval);

        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let long = Document::with_id("long", sentence.repeat(120));
        assert!(long.char_count() > 5000);

        let report = engine
            .index_documents("kb", vec![long], true)
            .await
            .unwrap();
        assert_eq!(report.documents_in, 1);
        assert!(report.chunks_created > 1);
        assert_eq!(report.ingest.processed, report.chunks_created);
        assert_eq!(report.ingest.failed, 0);
    }

    #[tokio::test]
    async fn test_index_documents_small_content_passes_through() {
        let store = Arc::new(VectorStoreManager::new(Arc::new(MemoryBackend::new())));
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashingProvider::new(256).unwrap());
        store.create_collection("kb", provider).await.unwrap();
        let retrieval = Arc::new(RetrievalEngine::new(Arc::clone(&store)));
        let engine = RagEngine::new(store, retrieval);

        let report = engine
            .index_documents("kb", vec![Document::with_id("short", "One sentence.")], true)
            .await
            .unwrap();
        assert_eq!(report.documents_in, 1);
        assert_eq!(report.chunks_created, 1);

        let stored = engine.store.get_document("kb", "short").await.unwrap();
        // Enrichment runs even when no chunking happens
        assert!(stored.metadata.contains_key("word_count"));
    }

    #[tokio::test]
    async fn test_generation_backend_produces_answer() {
        let engine = seeded_engine().await;
        let engine = RagEngine {
            generation: Some(Arc::new(EchoBackend)),
            ..engine
        };

        let response = engine
            .query(&RagRequest::new("kb", "What is Python programming?"))
            .await;

        assert!(response.metadata.generation_available);
        assert!(response.metadata.generation_used);
        assert_eq!(response.metadata.model.as_deref(), Some("echo"));
        assert!(response.answer.starts_with("Based on the provided context"));
    }

    #[tokio::test]
    async fn test_failed_generation_falls_back_and_discounts_confidence() {
        let plain = seeded_engine().await;
        let baseline = plain
            .query(&RagRequest::new("kb", "What is Python programming?"))
            .await;

        let failing = seeded_engine().await;
        let failing = RagEngine {
            generation: Some(Arc::new(FailingBackend)),
            ..failing
        };
        let degraded = failing
            .query(&RagRequest::new("kb", "What is Python programming?"))
            .await;

        // Same extractive answer, discounted confidence
        assert_eq!(degraded.answer, baseline.answer);
        assert!(!degraded.metadata.generation_used);
        assert!(degraded.metadata.generation_available);
        assert!(baseline.confidence > 0.0);
        let ratio = degraded.confidence / baseline.confidence;
        assert!((ratio - 0.3).abs() < 1e-4, "ratio was {ratio}");
    }

    #[tokio::test]
    async fn test_generation_timeout_falls_back() {
        let engine = seeded_engine().await;
        let mut options = RagOptions::default();
        options.generation.timeout = Duration::from_millis(20);
        let engine = RagEngine {
            generation: Some(Arc::new(SlowBackend)),
            ..engine
        }
        .with_options(options);

        let response = engine
            .query(&RagRequest::new("kb", "What is Python programming?"))
            .await;

        assert!(!response.metadata.generation_used);
        assert_ne!(response.answer, "too late");
        assert!(response.answer.contains("Python"));
    }

    #[tokio::test]
    async fn test_history_records_answered_questions() {
        let engine = seeded_engine().await;

        engine
            .query(&RagRequest::new("kb", "What is Python programming?"))
            .await;
        engine
            .query(&RagRequest::new("kb", "What is artificial intelligence?"))
            .await;

        let history = engine.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].question, "What is Python programming?");
        assert!(history[0].source_count > 0);

        engine.clear_history().await;
        assert!(engine.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_history_disabled_records_nothing() {
        let engine = seeded_engine().await.with_options(RagOptions {
            use_history: false,
            ..RagOptions::default()
        });

        engine
            .query(&RagRequest::new("kb", "What is Python programming?"))
            .await;
        assert!(engine.history().await.is_empty());
    }

    #[test]
    fn test_build_prompt_layout() {
        let prompt = build_prompt("What is Rust?", "[Source 1] Rust is a language.", "");
        assert!(prompt.starts_with("Context:\n[Source 1]"));
        assert!(prompt.contains("\n\nQuestion: What is Rust?"));
        assert!(prompt.ends_with("\n\nAnswer:"));
        assert!(!prompt.contains("Previous conversation"));

        let with_history = build_prompt(
            "And Go?",
            "[Source 1] Go is a language.",
            "Q: What is Rust?\nA: A systems language.",
        );
        assert!(with_history.starts_with("Previous conversation:\nQ: What is Rust?"));
        let context_at = with_history.find("Context:").unwrap();
        let history_at = with_history.find("Previous conversation:").unwrap();
        assert!(history_at < context_at);
    }
}
