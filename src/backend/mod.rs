//! Vector storage backends
//!
//! A backend persists embedded documents inside named collections and
//! answers nearest-neighbor queries by distance. Two implementations are
//! provided: an in-memory store for tests and ephemeral use, and a
//! SQLite-backed store for persistence. Both do exact scans; approximate
//! indexing is deliberately left behind this trait.

mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::document::{Metadata, MetadataValue};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        BackendError::Storage(e.to_string())
    }
}

impl From<r2d2::Error> for BackendError {
    fn from(e: r2d2::Error) -> Self {
        BackendError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Serialization(e.to_string())
    }
}

/// One embedded document as stored by a backend
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: Metadata,
}

/// One nearest-neighbor hit, ordered by ascending distance
#[derive(Debug, Clone)]
pub struct BackendHit {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Collection descriptor and statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimensions: usize,
    pub embedding_model: String,
    pub document_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Exact-match metadata predicates, all of which must hold
pub type MetadataFilter = HashMap<String, MetadataValue>;

/// Trait for vector storage backends
///
/// Writers to the same collection are serialized internally (lock or
/// database transaction); callers get no partial-write visibility.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create a collection. Fails with [`BackendError::CollectionExists`]
    /// if the name is taken.
    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        embedding_model: &str,
    ) -> Result<(), BackendError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, BackendError>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, BackendError>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, BackendError>;

    /// Destructive and irreversible
    async fn delete_collection(&self, name: &str) -> Result<(), BackendError>;

    /// Insert records, replacing any existing record with the same id
    async fn insert(&self, collection: &str, records: Vec<VectorRecord>)
        -> Result<(), BackendError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorRecord>, BackendError>;

    /// Replace an existing record. Returns false when the id is unknown.
    async fn update(&self, collection: &str, record: VectorRecord) -> Result<bool, BackendError>;

    /// Delete by id, returning how many records were actually removed
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, BackendError>;

    /// Nearest-neighbor query ordered by ascending distance; ties keep
    /// insertion order. The filter is applied before ranking.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<BackendHit>, BackendError>;
}

/// Cosine distance in [0,2]; orthogonal or zero-norm inputs yield 1.0
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Exact-match filter check: every predicate key must exist and be equal
pub fn matches_filter(metadata: &Metadata, filter: &MetadataFilter) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_identical() {
        let v = vec![0.5, 0.5, 0.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_zero_norm() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }

    #[test]
    fn test_matches_filter() {
        let mut metadata = Metadata::new();
        metadata.insert("lang".to_string(), MetadataValue::from("en"));
        metadata.insert("year".to_string(), MetadataValue::from(2024i64));

        let mut filter = MetadataFilter::new();
        filter.insert("lang".to_string(), MetadataValue::from("en"));
        assert!(matches_filter(&metadata, &filter));

        filter.insert("year".to_string(), MetadataValue::from(2023i64));
        assert!(!matches_filter(&metadata, &filter));

        filter.remove("year");
        filter.insert("missing".to_string(), MetadataValue::from(true));
        assert!(!matches_filter(&metadata, &filter));

        // Empty filter matches everything
        assert!(matches_filter(&metadata, &MetadataFilter::new()));
    }
}
