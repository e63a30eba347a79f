//! Embedding generation
//!
//! This module provides the embedding seam of the engine:
//! - EmbeddingProvider trait for abstraction over embedding backends
//! - FastEmbedProvider for local model inference (all-MiniLM-L6-v2, 384-dim)
//! - HashingProvider for deterministic, download-free feature hashing

mod hashing;
mod provider;

pub use hashing::HashingProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
