//! Vector Memory
//!
//! Retrieval-augmented context for the worker stage. [`VectorMemory`] binds
//! one collection of the [`store::VectorStore`] to one [`Embedder`]: stored
//! texts are embedded as documents, queries are embedded with the configured
//! query task type, and results come back as plain texts, most similar first.

use crate::llm::{EmbeddingTask, Embedder, LLMError};
use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::{debug, info};

pub mod store;

pub use store::{CollectionInfo, ScoredPoint, VectorStore};

/// Default collection name
pub const DEFAULT_COLLECTION: &str = "agent_memory";

/// Errors that can occur in the memory store
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("{0}")]
    Embedding(#[from] LLMError),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("query limit must be at least 1")]
    InvalidLimit,

    #[error("unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored vector is corrupt")]
    CorruptVector,

    #[error("vector contains NaN or infinite values")]
    NonFiniteVector,
}

impl From<MemoryError> for EngineError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Embedding(e) => e.into(),
            MemoryError::Database(e) => EngineError::Database(e.to_string()),
            other => EngineError::Memory(other.to_string()),
        }
    }
}

/// A single named collection plus the embedder that feeds it
pub struct VectorMemory {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    collection: String,
    query_task: EmbeddingTask,
}

impl VectorMemory {
    /// Bind `collection` to `embedder`, creating the collection if needed.
    ///
    /// Fails with [`MemoryError::DimensionMismatch`] if the collection already
    /// exists with a different dimension than the embedder produces.
    pub async fn new(
        store: VectorStore,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
    ) -> Result<Self, MemoryError> {
        let collection = collection.into();
        store
            .ensure_collection(&collection, embedder.dimension())
            .await?;

        info!(
            collection = %collection,
            embedder = embedder.name(),
            dimension = embedder.dimension(),
            "Vector memory ready"
        );

        Ok(Self {
            store,
            embedder,
            collection,
            query_task: EmbeddingTask::RetrievalQuery,
        })
    }

    /// Task type used when embedding queries (defaults to `RetrievalQuery`).
    pub fn with_query_task(mut self, task: EmbeddingTask) -> Self {
        self.query_task = task;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn query_task(&self) -> EmbeddingTask {
        self.query_task
    }

    /// Embed `text` as a document and store it under a fresh id.
    pub async fn store(&self, text: &str) -> Result<String, MemoryError> {
        let vector = self
            .embedder
            .embed(text, EmbeddingTask::RetrievalDocument)
            .await?;

        let id = uuid::Uuid::new_v4().to_string();
        self.store
            .upsert(&self.collection, &id, &vector, text)
            .await?;

        debug!(collection = %self.collection, %id, "Stored memory");
        Ok(id)
    }

    /// The `k` stored texts most similar to `text`, most similar first.
    ///
    /// An empty collection yields an empty list. `k == 0` is rejected.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, MemoryError> {
        Ok(self
            .query_scored(text, k)
            .await?
            .into_iter()
            .map(|p| p.text)
            .collect())
    }

    /// Like [`VectorMemory::query`], keeping ids and scores.
    pub async fn query_scored(&self, text: &str, k: usize) -> Result<Vec<ScoredPoint>, MemoryError> {
        if k == 0 {
            return Err(MemoryError::InvalidLimit);
        }

        let vector = self.embedder.embed(text, self.query_task).await?;
        self.store.search(&self.collection, &vector, k).await
    }

    /// Number of stored records.
    pub async fn len(&self) -> Result<u64, MemoryError> {
        self.store.count(&self.collection).await
    }

    pub async fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.len().await? == 0)
    }
}
