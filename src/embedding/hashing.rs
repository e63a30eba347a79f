//! Deterministic feature-hashing embedding provider
//!
//! Hashes word and character-trigram features into a fixed-dimension
//! signed vector (BLAKE3 for stable, platform-independent indices), then
//! L2-normalizes. No model download, no network, identical text always
//! yields the identical vector, so ranking-sensitive tests and offline
//! deployments can run without an inference runtime. Not a semantic
//! model: similarity reflects surface overlap, smoothed by trigrams.

use async_trait::async_trait;
use std::time::Instant;

use super::{EmbeddingError, EmbeddingProvider, EmbeddingResult};

/// Weight of char-trigram features relative to whole-word features.
/// Words dominate so exact-term overlap outranks shared morphology.
const TRIGRAM_WEIGHT: f32 = 0.5;

pub struct HashingProvider {
    dimensions: usize,
    model_name: String,
}

impl HashingProvider {
    pub fn new(dimensions: usize) -> Result<Self, EmbeddingError> {
        if dimensions == 0 {
            return Err(EmbeddingError::InitializationError(
                "Dimensions must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimensions,
            model_name: format!("feature-hash-{}", dimensions),
        })
    }

    /// Create provider with the default dimensionality (256)
    pub fn with_default_dimensions() -> Result<Self, EmbeddingError> {
        Self::new(256)
    }

    fn hash_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            self.mix(&mut vector, &word, 1.0);

            // Trigrams smooth over inflection ("function" vs "functions")
            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    self.mix(&mut vector, &trigram, TRIGRAM_WEIGHT);
                }
            }
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn mix(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        let h = u64::from_le_bytes(bytes);

        let index = ((h >> 1) % self.dimensions as u64) as usize;
        let sign = if h & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed(&self, text: &str) -> Result<EmbeddingResult, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let start = Instant::now();
        Ok(EmbeddingResult {
            vector: self.hash_text(text),
            model: self.model_name.clone(),
            dimensions: self.dimensions,
            elapsed: start.elapsed(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingResult>, EmbeddingError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
