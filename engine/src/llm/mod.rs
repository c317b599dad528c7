//! LLM Provider Abstraction Layer
//!
//! This module provides the two narrow capabilities the pipeline needs from a
//! hosted model: turning a prompt into a completion ([`TextGenerator`]) and
//! turning text into a fixed-length vector ([`Embedder`]). The pipeline and
//! memory store only ever see these traits, so tests can swap in
//! deterministic substitutes ([`mock::MockGenerator`], [`hashing::HashingEmbedder`]).

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::QuotaInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod gemini;
pub mod hashing;
pub mod mock;
pub mod quota;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    /// The embedding service failed (network, auth, bad response)
    #[error("Embedding service error: {0}")]
    Embedding(String),

    /// The embedding service reported a rate limit / quota condition
    #[error("Embedding service error: {0}")]
    EmbeddingQuota(QuotaInfo),

    /// The generation service failed
    #[error("Generation service error: {0}")]
    Generation(String),

    /// The generation service reported a rate limit / quota condition
    #[error("Generation service error: {0}")]
    QuotaExceeded(QuotaInfo),

    /// Transport failure or malformed response
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl LLMError {
    /// True for generation failures, including the quota sub-kind.
    pub fn is_generation(&self) -> bool {
        matches!(self, LLMError::Generation(_) | LLMError::QuotaExceeded(_))
    }

    /// Quota metadata, when this is a quota failure.
    pub fn quota(&self) -> Option<&QuotaInfo> {
        match self {
            LLMError::QuotaExceeded(info) | LLMError::EmbeddingQuota(info) => Some(info),
            _ => None,
        }
    }
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Embedding(msg) => EngineError::Embedding(msg),
            LLMError::EmbeddingQuota(info) => EngineError::EmbeddingQuota(info),
            LLMError::Generation(msg) => EngineError::Generation(msg),
            LLMError::QuotaExceeded(info) => EngineError::QuotaExceeded(info),
            LLMError::Upstream(msg) => EngineError::Upstream(msg),
        }
    }
}

/// Task-type hint sent with an embedding request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingTask {
    /// Text that will be stored and later retrieved
    RetrievalDocument,

    /// Text used to search stored documents
    RetrievalQuery,
}

impl EmbeddingTask {
    /// Wire value expected by the Gemini API
    pub fn as_api_str(&self) -> &'static str {
        match self {
            EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

impl fmt::Display for EmbeddingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingTask::RetrievalDocument => write!(f, "retrieval_document"),
            EmbeddingTask::RetrievalQuery => write!(f, "retrieval_query"),
        }
    }
}

impl FromStr for EmbeddingTask {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "retrieval_document" | "RETRIEVAL_DOCUMENT" => Ok(EmbeddingTask::RetrievalDocument),
            "retrieval_query" | "RETRIEVAL_QUERY" => Ok(EmbeddingTask::RetrievalQuery),
            other => Err(format!("unknown embedding task type '{}'", other)),
        }
    }
}

/// Turns a prompt into a single text completion
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the name of the generator (e.g. "gemini")
    fn name(&self) -> &str;

    /// Generate a completion for `prompt`
    ///
    /// # Returns
    /// * `Ok(String)` - A non-empty completion
    /// * `Err(LLMError)` - `Generation`, `QuotaExceeded` or `Upstream`
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Turns text into a fixed-length vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the name of the embedder (e.g. "gemini", "hashing")
    fn name(&self) -> &str;

    /// Length of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Embed `text` with the given task-type hint
    ///
    /// Implementations must return exactly [`Embedder::dimension`] values or
    /// an `LLMError::Embedding` / `LLMError::EmbeddingQuota`.
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>>;
}
