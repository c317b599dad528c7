//! Embedded vector collection store
//!
//! Collections live in the same SQLite file as the task history. Each point
//! keeps its vector as a little-endian `f32` BLOB; search loads a
//! collection's points, scores them by cosine similarity and returns the
//! best `limit` in descending order. Equal scores keep insertion order.

use super::MemoryError;
use crate::db::Database;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Distance metric name recorded for every collection
pub const COSINE: &str = "cosine";

/// Collection metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub distance: String,
}

/// A search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Encode a vector as a little-endian `f32` BLOB.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` BLOB.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, MemoryError> {
    if bytes.len() % 4 != 0 {
        return Err(MemoryError::CorruptVector);
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Vector store backed by SQLite
#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open (or create) the database at `path` and run its migrations.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Database::new(path).await?.memory_store())
    }

    /// Wrap an existing, already migrated pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the collection if it does not exist.
    ///
    /// Calling this again with the same dimension is a no-op. A different
    /// dimension for an existing name is a [`MemoryError::DimensionMismatch`].
    pub async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<CollectionInfo, MemoryError> {
        if dimension == 0 {
            return Err(MemoryError::DimensionMismatch {
                expected: 1,
                got: 0,
            });
        }

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO vector_collections (name, dimension, distance, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(dimension as i64)
        .bind(COSINE)
        .bind(now_secs())
        .execute(&self.pool)
        .await?
        .rows_affected();

        let info = self
            .collection(name)
            .await?
            .ok_or_else(|| MemoryError::UnknownCollection(name.to_string()))?;

        if inserted > 0 {
            info!(collection = %name, dimension, "Created vector collection");
        } else {
            debug!(collection = %name, "Vector collection already exists");
        }

        if info.dimension != dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: info.dimension,
                got: dimension,
            });
        }

        Ok(info)
    }

    /// Look up one collection.
    pub async fn collection(&self, name: &str) -> Result<Option<CollectionInfo>, MemoryError> {
        let row = sqlx::query("SELECT name, dimension, distance FROM vector_collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| CollectionInfo {
            name: r.get("name"),
            dimension: r.get::<i64, _>("dimension") as usize,
            distance: r.get("distance"),
        }))
    }

    async fn dimension_of(&self, collection: &str) -> Result<usize, MemoryError> {
        self.collection(collection)
            .await?
            .map(|c| c.dimension)
            .ok_or_else(|| MemoryError::UnknownCollection(collection.to_string()))
    }

    /// Insert a point, or replace the vector and text of an existing id.
    pub async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: &[f32],
        text: &str,
    ) -> Result<(), MemoryError> {
        let dimension = self.dimension_of(collection).await?;
        if vector.len() != dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: dimension,
                got: vector.len(),
            });
        }
        if !vector.iter().all(|v| v.is_finite()) {
            return Err(MemoryError::NonFiniteVector);
        }

        sqlx::query(
            "INSERT INTO vector_points (id, collection, vector, text, created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET vector = excluded.vector, text = excluded.text",
        )
        .bind(id)
        .bind(collection)
        .bind(encode_vector(vector))
        .bind(text)
        .bind(now_secs())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of points in a collection.
    pub async fn count(&self, collection: &str) -> Result<u64, MemoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_points WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Return up to `limit` points ranked by cosine similarity to `query`.
    pub async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, MemoryError> {
        if limit == 0 {
            return Err(MemoryError::InvalidLimit);
        }

        let dimension = self.dimension_of(collection).await?;
        if query.len() != dimension {
            return Err(MemoryError::DimensionMismatch {
                expected: dimension,
                got: query.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT id, vector, text FROM vector_points WHERE collection = ? ORDER BY seq ASC",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let bytes: Vec<u8> = row.get("vector");
            let vector = decode_vector(&bytes)?;
            if vector.len() != dimension {
                return Err(MemoryError::CorruptVector);
            }
            scored.push(ScoredPoint {
                id: row.get("id"),
                text: row.get("text"),
                score: cosine_similarity(query, &vector),
            });
        }

        // sort_by is stable, so equal scores stay in seq order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);

        debug!(collection = %collection, hits = scored.len(), "Vector search");
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, VectorStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open(&temp_dir.path().join("memory.db"))
            .await
            .unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_vector_blob_encoding() {
        let v = vec![0.5f32, -1.25, 3.0];
        let bytes = encode_vector(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(decode_vector(&bytes).unwrap(), v);
        assert!(matches!(
            decode_vector(&bytes[..5]),
            Err(MemoryError::CorruptVector)
        ));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let (_dir, store) = setup().await;

        store.ensure_collection("agent_memory", 4).await.unwrap();
        store.ensure_collection("agent_memory", 4).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vector_collections")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let info = store.collection("agent_memory").await.unwrap().unwrap();
        assert_eq!(info.distance, COSINE);

        let mismatch = store.ensure_collection("agent_memory", 8).await;
        assert!(matches!(
            mismatch,
            Err(MemoryError::DimensionMismatch {
                expected: 4,
                got: 8
            })
        ));
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let (_dir, store) = setup().await;
        store.ensure_collection("c", 2).await.unwrap();

        store.upsert("c", "far", &[0.0, 1.0], "far").await.unwrap();
        store.upsert("c", "near", &[1.0, 0.1], "near").await.unwrap();
        store.upsert("c", "exact", &[1.0, 0.0], "exact").await.unwrap();

        let hits = store.search("c", &[1.0, 0.0], 2).await.unwrap();
        let texts: Vec<_> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["exact", "near"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let (_dir, store) = setup().await;
        store.ensure_collection("c", 2).await.unwrap();

        for id in ["first", "second", "third"] {
            store.upsert("c", id, &[1.0, 1.0], id).await.unwrap();
        }

        let hits = store.search("c", &[1.0, 1.0], 3).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_id() {
        let (_dir, store) = setup().await;
        store.ensure_collection("c", 2).await.unwrap();

        store.upsert("c", "p", &[1.0, 0.0], "old").await.unwrap();
        store.upsert("c", "p", &[0.0, 1.0], "new").await.unwrap();

        assert_eq!(store.count("c").await.unwrap(), 1);
        let hits = store.search("c", &[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "new");
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let (_dir, store) = setup().await;
        store.ensure_collection("c", 3).await.unwrap();

        assert!(matches!(
            store.upsert("c", "p", &[1.0], "x").await,
            Err(MemoryError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            store.search("c", &[1.0, 0.0, 0.0], 0).await,
            Err(MemoryError::InvalidLimit)
        ));
        assert!(matches!(
            store.upsert("missing", "p", &[1.0, 0.0, 0.0], "x").await,
            Err(MemoryError::UnknownCollection(_))
        ));
        assert!(matches!(
            store.upsert("c", "p", &[1.0, f32::NAN, 0.0], "x").await,
            Err(MemoryError::NonFiniteVector)
        ));
        assert!(matches!(
            store.upsert("c", "p", &[f32::INFINITY, 0.0, 0.0], "x").await,
            Err(MemoryError::NonFiniteVector)
        ));
        assert_eq!(store.count("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_with_nan_query_keeps_every_hit() {
        let (_dir, store) = setup().await;
        store.ensure_collection("c", 2).await.unwrap();
        for (id, v) in [("a", [1.0, 0.0]), ("b", [0.0, 1.0]), ("c", [1.0, 1.0])] {
            store.upsert("c", id, &v, id).await.unwrap();
        }

        let hits = store.search("c", &[f32::NAN, 1.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_collection_search() {
        let (_dir, store) = setup().await;
        store.ensure_collection("c", 2).await.unwrap();
        assert!(store.search("c", &[1.0, 0.0], 3).await.unwrap().is_empty());
    }
}
