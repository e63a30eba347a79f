//! Vector store manager
//!
//! Owns named collections and coordinates an embedding provider with a
//! vector backend for ingestion and search. Operational failures
//! (backend down, embedding error, timeout, missing target) are logged
//! and folded into return values - empty lists, `false`, zero counts -
//! so batch pipelines keep running. Only caller programming errors are
//! hard: no provider bound, or a provider whose model/dimensions do not
//! match what the collection was created with.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::backend::{BackendError, CollectionInfo, MetadataFilter, VectorBackend, VectorRecord};
use crate::document::{assign_ranks, Document, Metadata, MetadataValue, SearchResult};
use crate::embedding::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Failure messages kept verbatim in an [`IngestReport`]; further
/// failures are still counted
pub const MAX_REPORTED_ERRORS: usize = 8;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No embedding provider bound for collection '{0}'")]
    NoProvider(String),

    #[error("Collection '{collection}' was embedded with model '{stored}', not '{requested}'")]
    ModelMismatch {
        collection: String,
        stored: String,
        requested: String,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tunables shared by all collections of one manager
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Documents embedded and inserted per batch
    pub batch_size: usize,
    pub embed_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            embed_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// One similarity search
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub collection: String,
    pub query: String,
    pub limit: usize,
    /// Results scoring below this are dropped
    pub score_threshold: f32,
    /// Exact-match metadata predicates
    pub filter: Option<MetadataFilter>,
}

impl SearchRequest {
    pub fn new(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            query: query.into(),
            limit: 5,
            score_threshold: 0.0,
            filter: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, score_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Summary of one bulk ingestion
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
    pub duration_ms: u64,
    pub docs_per_sec: f64,
    /// First few failure messages; every failure is counted in `failed`
    pub errors: Vec<String>,
}

impl IngestReport {
    fn record_failure(&mut self, count: usize, message: String) {
        self.failed += count;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message);
        }
    }

    fn finish(&mut self, start: Instant) {
        let elapsed = start.elapsed();
        self.duration_ms = elapsed.as_millis() as u64;
        let secs = elapsed.as_secs_f64();
        self.docs_per_sec = if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            self.processed as f64
        };
    }
}

/// Manages named collections over one vector backend
///
/// Each collection is bound to exactly one embedding provider; the
/// binding is established by `create_collection` or `open_collection`
/// and reused for every embed on that collection afterwards.
pub struct VectorStoreManager {
    backend: Arc<dyn VectorBackend>,
    providers: RwLock<HashMap<String, Arc<dyn EmbeddingProvider>>>,
    options: StoreOptions,
}

impl VectorStoreManager {
    pub fn new(backend: Arc<dyn VectorBackend>) -> Self {
        Self::with_options(backend, StoreOptions::default())
    }

    pub fn with_options(backend: Arc<dyn VectorBackend>, options: StoreOptions) -> Self {
        Self {
            backend,
            providers: RwLock::new(HashMap::new()),
            options,
        }
    }

    /// Create a collection bound to `provider`
    ///
    /// Returns `false` without raising when the collection already
    /// exists (the provider is re-bound after a model check) or when
    /// the backend fails. A model mismatch on an existing collection is
    /// a hard error.
    pub async fn create_collection(
        &self,
        name: &str,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> StoreResult<bool> {
        match self.backend.collection_info(name).await {
            Ok(info) => {
                self.check_binding(&info, provider.as_ref())?;
                self.bind(name, provider).await;
                tracing::warn!(collection = %name, "Collection already exists");
                Ok(false)
            }
            Err(BackendError::CollectionNotFound(_)) => {
                let dimensions = provider.dimensions();
                let model = provider.model_name().to_string();
                match self
                    .backend
                    .create_collection(name, dimensions, &model)
                    .await
                {
                    Ok(()) => {
                        self.bind(name, provider).await;
                        tracing::info!(
                            collection = %name,
                            dimensions,
                            model = %model,
                            "Created collection"
                        );
                        Ok(true)
                    }
                    Err(BackendError::CollectionExists(_)) => {
                        self.bind(name, provider).await;
                        Ok(false)
                    }
                    Err(e) => {
                        tracing::warn!(collection = %name, error = %e, "Collection creation failed");
                        Ok(false)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(collection = %name, error = %e, "Backend unavailable");
                Ok(false)
            }
        }
    }

    /// Bind a provider to an existing collection (e.g. after restart)
    ///
    /// Returns `false` when the collection does not exist. Binding a
    /// provider whose model or dimensionality differ from what the
    /// collection was created with is a hard error.
    pub async fn open_collection(
        &self,
        name: &str,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> StoreResult<bool> {
        let info = match self.backend.collection_info(name).await {
            Ok(info) => info,
            Err(BackendError::CollectionNotFound(_)) => return Ok(false),
            Err(e) => {
                tracing::warn!(collection = %name, error = %e, "Backend unavailable");
                return Ok(false);
            }
        };

        self.check_binding(&info, provider.as_ref())?;
        self.bind(name, provider).await;
        Ok(true)
    }

    /// Embed and insert documents in batches
    ///
    /// A failing batch is counted and skipped, never aborting the
    /// remaining batches. `batch_size` overrides the manager default
    /// for this call only.
    pub async fn add_documents(
        &self,
        collection: &str,
        documents: Vec<Document>,
        batch_size: Option<usize>,
    ) -> StoreResult<IngestReport> {
        let provider = self
            .provider_for(collection)
            .await
            .ok_or_else(|| StoreError::NoProvider(collection.to_string()))?;

        let batch_size = batch_size.unwrap_or(self.options.batch_size).max(1);
        let start = Instant::now();
        let mut report = IngestReport {
            total: documents.len(),
            ..Default::default()
        };

        for batch in documents.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();

            let embeddings = match self.embed_batch(&provider, &texts).await {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    tracing::warn!(
                        collection = %collection,
                        batch_len = batch.len(),
                        error = %e,
                        "Batch embedding failed, skipping batch"
                    );
                    report.record_failure(batch.len(), e.to_string());
                    continue;
                }
            };

            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|(doc, embedding)| record_from_document(doc, embedding.vector))
                .collect();

            match self.backend.insert(collection, records).await {
                Ok(()) => report.processed += batch.len(),
                // Dimensionality mismatch means the caller bound the
                // wrong provider; fail loudly instead of skipping
                Err(e @ BackendError::DimensionMismatch { .. }) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        collection = %collection,
                        batch_len = batch.len(),
                        error = %e,
                        "Batch insert failed, skipping batch"
                    );
                    report.record_failure(batch.len(), e.to_string());
                }
            }
        }

        report.finish(start);
        tracing::info!(
            collection = %collection,
            processed = report.processed,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Ingestion complete"
        );
        Ok(report)
    }

    /// Embed the query and return results above the score threshold,
    /// ordered by descending score with 1-based ranks assigned
    ///
    /// Any failure (no provider, embedding error, backend error,
    /// timeout) is logged and yields an empty list.
    pub async fn semantic_search(&self, request: &SearchRequest) -> Vec<SearchResult> {
        let provider = match self.provider_for(&request.collection).await {
            Some(provider) => provider,
            None => {
                tracing::warn!(
                    collection = %request.collection,
                    "No embedding provider bound; create or open the collection first"
                );
                return Vec::new();
            }
        };

        let embedding = match self.embed_one(&provider, &request.query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(collection = %request.collection, error = %e, "Query embedding failed");
                return Vec::new();
            }
        };

        let query = self.backend.query(
            &request.collection,
            &embedding.vector,
            request.limit,
            request.filter.as_ref(),
        );
        let hits = match timeout(self.options.query_timeout, query).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                tracing::warn!(collection = %request.collection, error = %e, "Vector query failed");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(
                    collection = %request.collection,
                    timeout = ?self.options.query_timeout,
                    "Vector query timed out"
                );
                return Vec::new();
            }
        };

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| {
                SearchResult::from_distance(
                    document_from_parts(hit.id, hit.content, hit.metadata),
                    hit.distance,
                    0,
                )
            })
            .filter(|result| result.score >= request.score_threshold)
            .collect();
        assign_ranks(&mut results);
        results
    }

    pub async fn get_document(&self, collection: &str, id: &str) -> Option<Document> {
        match self.backend.get(collection, id).await {
            Ok(Some(record)) => Some(document_from_parts(
                record.id,
                record.content,
                record.metadata,
            )),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(collection = %collection, id = %id, error = %e, "Document fetch failed");
                None
            }
        }
    }

    /// Re-embed and replace an existing document; `false` when the
    /// document or collection is missing or the backend fails
    pub async fn update_document(&self, collection: &str, document: &Document) -> bool {
        let provider = match self.provider_for(collection).await {
            Some(provider) => provider,
            None => {
                tracing::warn!(collection = %collection, "No embedding provider bound");
                return false;
            }
        };

        let embedding = match self.embed_one(&provider, &document.content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Update embedding failed");
                return false;
            }
        };

        match self
            .backend
            .update(collection, record_from_document(document, embedding.vector))
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(collection = %collection, id = %document.id, error = %e, "Update failed");
                false
            }
        }
    }

    /// Delete documents by id, returning how many existed
    pub async fn delete_documents(&self, collection: &str, ids: &[String]) -> usize {
        match self.backend.delete(collection, ids).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(collection = %collection, error = %e, "Delete failed");
                0
            }
        }
    }

    pub async fn list_collections(&self) -> Vec<CollectionInfo> {
        match self.backend.list_collections().await {
            Ok(collections) => collections,
            Err(e) => {
                tracing::warn!(error = %e, "Listing collections failed");
                Vec::new()
            }
        }
    }

    pub async fn get_collection_stats(&self, name: &str) -> Option<CollectionInfo> {
        match self.backend.collection_info(name).await {
            Ok(info) => Some(info),
            Err(BackendError::CollectionNotFound(_)) => None,
            Err(e) => {
                tracing::warn!(collection = %name, error = %e, "Stats fetch failed");
                None
            }
        }
    }

    /// Destroy a collection and its provider binding; irreversible
    pub async fn delete_collection(&self, name: &str) -> bool {
        match self.backend.delete_collection(name).await {
            Ok(()) => {
                self.providers.write().await.remove(name);
                tracing::info!(collection = %name, "Deleted collection");
                true
            }
            Err(BackendError::CollectionNotFound(_)) => false,
            Err(e) => {
                tracing::warn!(collection = %name, error = %e, "Collection deletion failed");
                false
            }
        }
    }

    async fn bind(&self, name: &str, provider: Arc<dyn EmbeddingProvider>) {
        self.providers
            .write()
            .await
            .insert(name.to_string(), provider);
    }

    async fn provider_for(&self, collection: &str) -> Option<Arc<dyn EmbeddingProvider>> {
        self.providers.read().await.get(collection).cloned()
    }

    fn check_binding(
        &self,
        info: &CollectionInfo,
        provider: &dyn EmbeddingProvider,
    ) -> StoreResult<()> {
        if info.embedding_model != provider.model_name() {
            return Err(StoreError::ModelMismatch {
                collection: info.name.clone(),
                stored: info.embedding_model.clone(),
                requested: provider.model_name().to_string(),
            });
        }
        if info.dimensions != provider.dimensions() {
            return Err(BackendError::DimensionMismatch {
                expected: info.dimensions,
                actual: provider.dimensions(),
            }
            .into());
        }
        Ok(())
    }

    async fn embed_one(
        &self,
        provider: &Arc<dyn EmbeddingProvider>,
        text: &str,
    ) -> StoreResult<EmbeddingResult> {
        match timeout(self.options.embed_timeout, provider.embed(text)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(StoreError::Timeout("Embedding", self.options.embed_timeout)),
        }
    }

    async fn embed_batch(
        &self,
        provider: &Arc<dyn EmbeddingProvider>,
        texts: &[String],
    ) -> StoreResult<Vec<EmbeddingResult>> {
        match timeout(self.options.embed_timeout, provider.embed_batch(texts)).await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(StoreError::Timeout(
                "Batch embedding",
                self.options.embed_timeout,
            )),
        }
    }
}

fn record_from_document(document: &Document, vector: Vec<f32>) -> VectorRecord {
    let mut metadata = document.metadata.clone();
    if let Some(source) = &document.source {
        metadata
            .entry("source".to_string())
            .or_insert_with(|| MetadataValue::from(source.clone()));
    }
    VectorRecord {
        id: document.id.clone(),
        vector,
        content: document.content.clone(),
        metadata,
    }
}

fn document_from_parts(id: String, content: String, metadata: Metadata) -> Document {
    let source = metadata
        .get("source")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Document {
        id,
        content,
        metadata,
        source,
        created_at: Utc::now(),
    }
}
