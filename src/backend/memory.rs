//! In-memory vector backend
//!
//! Exact cosine scan over per-collection record lists. Intended for tests
//! and ephemeral single-process use; nothing survives a restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    cosine_distance, matches_filter, BackendError, BackendHit, CollectionInfo, MetadataFilter,
    VectorBackend, VectorRecord,
};

struct MemoryCollection {
    dimensions: usize,
    embedding_model: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
    /// Insertion order is preserved; it breaks distance ties in queries
    records: Vec<VectorRecord>,
}

impl MemoryCollection {
    fn info(&self, name: &str) -> CollectionInfo {
        CollectionInfo {
            name: name.to_string(),
            dimensions: self.dimensions,
            embedding_model: self.embedding_model.clone(),
            document_count: self.records.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), BackendError> {
        if vector.len() != self.dimensions {
            return Err(BackendError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        embedding_model: &str,
    ) -> Result<(), BackendError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(BackendError::CollectionExists(name.to_string()));
        }

        let now = Utc::now();
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimensions,
                embedding_model: embedding_model.to_string(),
                created_at: now,
                updated_at: now,
                records: Vec::new(),
            },
        );
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, BackendError> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, BackendError> {
        let collections = self.collections.read().await;
        let mut infos: Vec<CollectionInfo> = collections
            .iter()
            .map(|(name, collection)| collection.info(name))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, BackendError> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .map(|collection| collection.info(name))
            .ok_or_else(|| BackendError::CollectionNotFound(name.to_string()))
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        let mut collections = self.collections.write().await;
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BackendError::CollectionNotFound(name.to_string()))
    }

    async fn insert(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), BackendError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))?;

        for record in &records {
            target.check_dimensions(&record.vector)?;
        }

        for record in records {
            match target.records.iter_mut().find(|r| r.id == record.id) {
                // Replacing in place keeps the original insertion position
                Some(existing) => *existing = record,
                None => target.records.push(record),
            }
        }
        target.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorRecord>, BackendError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))?;

        Ok(target.records.iter().find(|r| r.id == id).cloned())
    }

    async fn update(&self, collection: &str, record: VectorRecord) -> Result<bool, BackendError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))?;

        target.check_dimensions(&record.vector)?;

        match target.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                *existing = record;
                target.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, BackendError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))?;

        let before = target.records.len();
        target.records.retain(|r| !ids.contains(&r.id));
        let removed = before - target.records.len();
        if removed > 0 {
            target.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<BackendHit>, BackendError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))?;

        target.check_dimensions(vector)?;

        let mut scored: Vec<(f32, &VectorRecord)> = target
            .records
            .iter()
            .filter(|record| match filter {
                Some(f) => matches_filter(&record.metadata, f),
                None => true,
            })
            .map(|record| (cosine_distance(vector, &record.vector), record))
            .collect();

        // Stable sort keeps insertion order for equal distances
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(distance, record)| BackendHit {
                id: record.id.clone(),
                content: record.content.clone(),
                metadata: record.metadata.clone(),
                distance,
            })
            .collect())
    }
}
