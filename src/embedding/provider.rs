//! Embedding provider trait and the fastembed-backed implementation

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding timed out after {0:?}")]
    Timeout(Duration),
}

/// One embedding produced by a provider
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Identifier of the producing model
    pub model: String,
    /// Vector dimensionality
    pub dimensions: usize,
    /// Time taken to produce the embedding
    pub elapsed: Duration,
}

/// Trait for embedding providers
///
/// Abstracts over different embedding backends (FastEmbed, feature
/// hashing, remote APIs). Identical text must yield embeddings usable for
/// consistent nearest-neighbor ranking across calls.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<EmbeddingResult, EmbeddingError>;

    /// Generate embeddings for multiple texts (batched for efficiency)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimensions(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Local model inference via fastembed
///
/// Models download to `~/.cache/huggingface/` on first use; the default
/// all-MiniLM-L6-v2 is ~90MB. Fully offline after that.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // TextEmbedding does not implement Debug, so the model field is elided
        f.debug_struct("FastEmbedProvider")
            .field("model_name", &self.model_name)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl FastEmbedProvider {
    /// Initialize the named model, downloading it if not cached.
    ///
    /// Supported: `all-MiniLM-L6-v2` (384d, ~90MB),
    /// `bge-small-en-v1.5` (384d, ~130MB), `bge-base-en-v1.5` (768d, ~440MB).
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimensions, approx_mb) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384, 90),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384, 130),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768, 440),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!(
            model = %model_name,
            dimensions,
            approx_mb,
            "Initializing embedding model (downloads if not cached)"
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }

    /// The default all-MiniLM-L6-v2 model
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }

    /// Run model inference off the async runtime; the underlying session
    /// call is CPU-blocking.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        // Verify all dimensions
        for embedding in &embeddings {
            if embedding.len() != self.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<EmbeddingResult, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let start = Instant::now();
        let mut embeddings = self.embed_texts(vec![text.to_string()]).await?;

        if embeddings.is_empty() {
            return Err(EmbeddingError::GenerationError(
                "No embeddings generated".to_string(),
            ));
        }

        Ok(EmbeddingResult {
            vector: embeddings.swap_remove(0),
            model: self.model_name.clone(),
            dimensions: self.dimensions,
            elapsed: start.elapsed(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().all(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "All texts are empty".to_string(),
            ));
        }

        let start = Instant::now();
        let embeddings = self.embed_texts(texts.to_vec()).await?;
        let elapsed = start.elapsed();

        Ok(embeddings
            .into_iter()
            .map(|vector| EmbeddingResult {
                vector,
                model: self.model_name.clone(),
                dimensions: self.dimensions,
                elapsed,
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
