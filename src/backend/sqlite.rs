//! SQLite vector backend with migrations
//!
//! Collections and embedded documents live in a single database file.
//! Vectors are stored as little-endian f32 blobs; document content is
//! zstd-compressed above a size threshold and flagged per row. Queries
//! are exact scans ordered by distance, with rowid breaking ties so
//! insertion order is stable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::{
    cosine_distance, matches_filter, BackendError, BackendHit, CollectionInfo, MetadataFilter,
    VectorBackend, VectorRecord,
};
use crate::document::Metadata;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Documents whose content exceeds this many bytes are zstd-compressed
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 4096;

const ZSTD_LEVEL: i32 = 3;

pub struct SqliteBackend {
    pool: DbPool,
    compression_threshold: usize,
}

impl SqliteBackend {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: &Path) -> Result<Self, BackendError> {
        Self::with_compression_threshold(db_path, DEFAULT_COMPRESSION_THRESHOLD)
    }

    pub fn with_compression_threshold(
        db_path: &Path,
        compression_threshold: usize,
    ) -> Result<Self, BackendError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BackendError::Storage(format!("Failed to create database directory: {}", e))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(16).build(manager)?;

        {
            let conn = pool.get()?;

            // WAL mode for concurrent readers alongside one writer
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let backend = Self {
            pool,
            compression_threshold,
        };
        backend.migrate()?;

        Ok(backend)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, BackendError> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<(), BackendError> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    fn dimensions_of(
        conn: &rusqlite::Connection,
        collection: &str,
    ) -> Result<usize, BackendError> {
        let dimensions: Option<i64> = conn
            .query_row(
                "SELECT dimensions FROM collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;

        dimensions
            .map(|d| d as usize)
            .ok_or_else(|| BackendError::CollectionNotFound(collection.to_string()))
    }

    fn touch(conn: &rusqlite::Connection, collection: &str) -> Result<(), BackendError> {
        conn.execute(
            "UPDATE collections SET updated_at = ?1 WHERE name = ?2",
            params![Utc::now().to_rfc3339(), collection],
        )?;
        Ok(())
    }

    fn encode_content(&self, content: &str) -> Result<(Vec<u8>, bool), BackendError> {
        let raw = content.as_bytes();
        if raw.len() > self.compression_threshold {
            let compressed = zstd::encode_all(raw, ZSTD_LEVEL)
                .map_err(|e| BackendError::Storage(format!("Compression failed: {}", e)))?;
            Ok((compressed, true))
        } else {
            Ok((raw.to_vec(), false))
        }
    }

    fn decode_content(bytes: Vec<u8>, compressed: bool) -> Result<String, BackendError> {
        let raw = if compressed {
            zstd::decode_all(bytes.as_slice())
                .map_err(|e| BackendError::Storage(format!("Decompression failed: {}", e)))?
        } else {
            bytes
        };
        String::from_utf8(raw).map_err(|e| BackendError::Serialization(e.to_string()))
    }

    fn row_to_record(
        id: String,
        content: Vec<u8>,
        compressed: bool,
        metadata_json: String,
        vector_blob: Vec<u8>,
    ) -> Result<VectorRecord, BackendError> {
        Ok(VectorRecord {
            id,
            vector: decode_vector(&vector_blob)?,
            content: Self::decode_content(content, compressed)?,
            metadata: serde_json::from_str::<Metadata>(&metadata_json)?,
        })
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, BackendError> {
    if bytes.len() % 4 != 0 {
        return Err(BackendError::Serialization(
            "Vector blob length is not a multiple of 4".to_string(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl VectorBackend for SqliteBackend {
    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        embedding_model: &str,
    ) -> Result<(), BackendError> {
        let conn = self.get_conn()?;

        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(BackendError::CollectionExists(name.to_string()));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO collections (name, dimensions, embedding_model, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, dimensions as i64, embedding_model, now, now],
        )?;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, BackendError> {
        let conn = self.get_conn()?;
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>, BackendError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.name, c.dimensions, c.embedding_model, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM documents d WHERE d.collection = c.name)
             FROM collections c ORDER BY c.name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut infos = Vec::new();
        for row in rows {
            let (name, dimensions, embedding_model, created_at, updated_at, count) = row?;
            infos.push(CollectionInfo {
                name,
                dimensions: dimensions as usize,
                embedding_model,
                document_count: count as usize,
                created_at: parse_timestamp(&created_at),
                updated_at: parse_timestamp(&updated_at),
            });
        }
        Ok(infos)
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, BackendError> {
        let conn = self.get_conn()?;
        let info = conn
            .query_row(
                "SELECT c.dimensions, c.embedding_model, c.created_at, c.updated_at,
                        (SELECT COUNT(*) FROM documents d WHERE d.collection = c.name)
                 FROM collections c WHERE c.name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let (dimensions, embedding_model, created_at, updated_at, count) =
            info.ok_or_else(|| BackendError::CollectionNotFound(name.to_string()))?;

        Ok(CollectionInfo {
            name: name.to_string(),
            dimensions: dimensions as usize,
            embedding_model,
            document_count: count as usize,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<(), BackendError> {
        let conn = self.get_conn()?;
        let removed = conn.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        if removed == 0 {
            return Err(BackendError::CollectionNotFound(name.to_string()));
        }
        // Cascade removes the documents, but only with foreign_keys on;
        // delete explicitly so a fresh pooled connection cannot leak rows.
        conn.execute("DELETE FROM documents WHERE collection = ?1", params![name])?;
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), BackendError> {
        let mut conn = self.get_conn()?;
        let dimensions = Self::dimensions_of(&conn, collection)?;

        for record in &records {
            if record.vector.len() != dimensions {
                return Err(BackendError::DimensionMismatch {
                    expected: dimensions,
                    actual: record.vector.len(),
                });
            }
        }

        let tx = conn.transaction()?;
        for record in &records {
            let (content, compressed) = self.encode_content(&record.content)?;
            let metadata = serde_json::to_string(&record.metadata)?;
            tx.execute(
                "INSERT INTO documents (collection, id, content, compressed, metadata, vector)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(collection, id) DO UPDATE SET
                     content = excluded.content,
                     compressed = excluded.compressed,
                     metadata = excluded.metadata,
                     vector = excluded.vector",
                params![
                    collection,
                    record.id,
                    content,
                    compressed,
                    metadata,
                    encode_vector(&record.vector)
                ],
            )?;
        }
        Self::touch(&tx, collection)?;
        tx.commit()?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<VectorRecord>, BackendError> {
        let conn = self.get_conn()?;
        Self::dimensions_of(&conn, collection)?;

        let row = conn
            .query_row(
                "SELECT content, compressed, metadata, vector
                 FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| {
                    Ok((
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((content, compressed, metadata, vector)) => Ok(Some(Self::row_to_record(
                id.to_string(),
                content,
                compressed,
                metadata,
                vector,
            )?)),
            None => Ok(None),
        }
    }

    async fn update(&self, collection: &str, record: VectorRecord) -> Result<bool, BackendError> {
        let conn = self.get_conn()?;
        let dimensions = Self::dimensions_of(&conn, collection)?;

        if record.vector.len() != dimensions {
            return Err(BackendError::DimensionMismatch {
                expected: dimensions,
                actual: record.vector.len(),
            });
        }

        let (content, compressed) = self.encode_content(&record.content)?;
        let metadata = serde_json::to_string(&record.metadata)?;
        let changed = conn.execute(
            "UPDATE documents SET content = ?1, compressed = ?2, metadata = ?3, vector = ?4
             WHERE collection = ?5 AND id = ?6",
            params![
                content,
                compressed,
                metadata,
                encode_vector(&record.vector),
                collection,
                record.id
            ],
        )?;

        if changed > 0 {
            Self::touch(&conn, collection)?;
        }
        Ok(changed > 0)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, BackendError> {
        let mut conn = self.get_conn()?;
        Self::dimensions_of(&conn, collection)?;

        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in ids {
            removed += tx.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
        }
        if removed > 0 {
            Self::touch(&tx, collection)?;
        }
        tx.commit()?;
        Ok(removed)
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<BackendHit>, BackendError> {
        let conn = self.get_conn()?;
        let dimensions = Self::dimensions_of(&conn, collection)?;

        if vector.len() != dimensions {
            return Err(BackendError::DimensionMismatch {
                expected: dimensions,
                actual: vector.len(),
            });
        }

        let mut stmt = conn.prepare(
            "SELECT id, content, compressed, metadata, vector
             FROM documents WHERE collection = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
            ))
        })?;

        let mut scored: Vec<(f32, VectorRecord)> = Vec::new();
        for row in rows {
            let (id, content, compressed, metadata, vector_blob) = row?;
            let record = Self::row_to_record(id, content, compressed, metadata, vector_blob)?;

            if let Some(f) = filter {
                if !matches_filter(&record.metadata, f) {
                    continue;
                }
            }

            scored.push((cosine_distance(vector, &record.vector), record));
        }

        // Stable sort keeps rowid order for equal distances
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        Ok(scored
            .into_iter()
            .map(|(distance, record)| BackendHit {
                id: record.id,
                content: record.content,
                metadata: record.metadata,
                distance,
            })
            .collect())
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    -- Collections table
    CREATE TABLE collections (
        name TEXT PRIMARY KEY,
        dimensions INTEGER NOT NULL,
        embedding_model TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    -- Embedded documents
    CREATE TABLE documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        content BLOB NOT NULL,
        compressed BOOLEAN NOT NULL DEFAULT 0,
        metadata TEXT NOT NULL,  -- JSON metadata
        vector BLOB NOT NULL,    -- little-endian f32 values
        PRIMARY KEY (collection, id),
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
    );

    CREATE INDEX idx_documents_collection ON documents(collection);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MetadataValue;
    use tempfile::TempDir;

    fn record(id: &str, vector: Vec<f32>, content: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            content: content.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_database_creation() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let _backend = SqliteBackend::new(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_migrations() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let backend = SqliteBackend::new(&db_path).unwrap();

        let conn = backend.get_conn().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
            .unwrap();

        assert_eq!(version, MIGRATIONS.len() as i32);
    }

    #[test]
    fn test_vector_blob_roundtrip() {
        let vector = vec![0.1f32, -2.5, 3.75, 0.0];
        let decoded = decode_vector(&encode_vector(&vector)).unwrap();
        assert_eq!(decoded, vector);

        assert!(decode_vector(&[1, 2, 3]).is_err());
    }

    #[tokio::test]
    async fn test_insert_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(&temp_dir.path().join("test.db")).unwrap();

        backend.create_collection("docs", 3, "test-model").await.unwrap();

        let mut rec = record("a", vec![1.0, 0.0, 0.0], "héllo wörld ✓");
        rec.metadata
            .insert("lang".to_string(), MetadataValue::from("de"));
        backend.insert("docs", vec![rec]).await.unwrap();

        let stored = backend.get("docs", "a").await.unwrap().unwrap();
        assert_eq!(stored.content, "héllo wörld ✓");
        assert_eq!(stored.vector, vec![1.0, 0.0, 0.0]);
        assert_eq!(
            stored.metadata.get("lang"),
            Some(&MetadataValue::from("de"))
        );
    }

    #[tokio::test]
    async fn test_compression_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let backend = SqliteBackend::with_compression_threshold(
            &temp_dir.path().join("test.db"),
            64, // force compression for small payloads
        )
        .unwrap();

        backend.create_collection("docs", 2, "test-model").await.unwrap();

        let long_content = "sentence with recurring words. ".repeat(50);
        backend
            .insert("docs", vec![record("big", vec![1.0, 0.0], &long_content)])
            .await
            .unwrap();

        // Verify the compressed flag was actually set
        let conn = backend.get_conn().unwrap();
        let compressed: bool = conn
            .query_row(
                "SELECT compressed FROM documents WHERE collection = 'docs' AND id = 'big'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(compressed);

        let stored = backend.get("docs", "big").await.unwrap().unwrap();
        assert_eq!(stored.content, long_content);
    }

    #[tokio::test]
    async fn test_query_ordering() {
        let temp_dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(&temp_dir.path().join("test.db")).unwrap();

        backend.create_collection("docs", 2, "test-model").await.unwrap();
        backend
            .insert(
                "docs",
                vec![
                    record("far", vec![0.0, 1.0], "orthogonal"),
                    record("near", vec![1.0, 0.1], "close"),
                    record("exact", vec![1.0, 0.0], "same"),
                ],
            )
            .await
            .unwrap();

        let hits = backend.query("docs", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "exact");
        assert_eq!(hits[1].id, "near");
        assert!(hits[0].distance < hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_with_filter() {
        let temp_dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(&temp_dir.path().join("test.db")).unwrap();

        backend.create_collection("docs", 2, "test-model").await.unwrap();

        let mut tagged = record("a", vec![1.0, 0.0], "tagged");
        tagged
            .metadata
            .insert("topic".to_string(), MetadataValue::from("db"));
        backend
            .insert("docs", vec![tagged, record("b", vec![1.0, 0.0], "plain")])
            .await
            .unwrap();

        let mut filter = MetadataFilter::new();
        filter.insert("topic".to_string(), MetadataValue::from("db"));

        let hits = backend
            .query("docs", &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let backend = SqliteBackend::new(&db_path).unwrap();
            backend.create_collection("docs", 2, "test-model").await.unwrap();
            backend
                .insert("docs", vec![record("a", vec![1.0, 0.0], "persisted")])
                .await
                .unwrap();
        }

        let reopened = SqliteBackend::new(&db_path).unwrap();
        let info = reopened.collection_info("docs").await.unwrap();
        assert_eq!(info.document_count, 1);
        assert_eq!(info.embedding_model, "test-model");

        let stored = reopened.get("docs", "a").await.unwrap().unwrap();
        assert_eq!(stored.content, "persisted");
    }

    #[tokio::test]
    async fn test_delete_and_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let backend = SqliteBackend::new(&temp_dir.path().join("test.db")).unwrap();

        backend.create_collection("docs", 2, "test-model").await.unwrap();
        backend
            .insert("docs", vec![record("a", vec![1.0, 0.0], "x")])
            .await
            .unwrap();

        let err = backend
            .insert("docs", vec![record("bad", vec![1.0, 0.0, 0.0], "y")])
            .await;
        assert!(matches!(err, Err(BackendError::DimensionMismatch { .. })));

        let removed = backend.delete("docs", &["a".to_string()]).await.unwrap();
        assert_eq!(removed, 1);

        backend.delete_collection("docs").await.unwrap();
        assert!(!backend.collection_exists("docs").await.unwrap());
    }
}
