//! Error types and handling
//!
//! This module provides the top-level error type used by the Triad engine,
//! its CLI and the API server. All errors implement the `TriadErrorExt` trait
//! which provides user-friendly hints and indicates whether errors are
//! recoverable.
//!
//! # Security
//!
//! Error messages never include the upstream API key: request URLs carrying
//! the key are not embedded in any variant.

use crate::types::{AgentStage, QuotaInfo};
use thiserror::Error;

/// Trait for Triad error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information.
pub trait TriadErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried by the user (for example after a
    /// quota window passes). Non-recoverable errors need a configuration or
    /// installation change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **Upstream**: Embedding / generation service failures, including quota
/// - **Pipeline**: A stage failure, tagged with the stage that produced it
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, TriadErrorExt};
/// use sdk::types::{AgentStage, QuotaInfo};
///
/// let error = EngineError::Stage {
///     stage: AgentStage::Planner,
///     source: Box::new(EngineError::QuotaExceeded(QuotaInfo::default())),
/// };
/// assert!(error.quota().is_some());
/// assert!(error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Request errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // Upstream service errors
    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Embedding service error: {0}")]
    EmbeddingQuota(QuotaInfo),

    #[error("Generation service error: {0}")]
    Generation(String),

    #[error("Generation service error: {0}")]
    QuotaExceeded(QuotaInfo),

    #[error("Upstream error: {0}")]
    Upstream(String),

    // Memory store errors
    #[error("Memory store error: {0}")]
    Memory(String),

    // Pipeline errors
    #[error("{stage} agent failed: {source}")]
    Stage {
        stage: AgentStage,
        source: Box<EngineError>,
    },

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Quota metadata if this error (or the stage error it wraps) is a
    /// quota failure.
    pub fn quota(&self) -> Option<&QuotaInfo> {
        match self {
            Self::QuotaExceeded(info) | Self::EmbeddingQuota(info) => Some(info),
            Self::Stage { source, .. } => source.quota(),
            _ => None,
        }
    }

    /// The pipeline stage that produced this error, if any.
    pub fn stage(&self) -> Option<AgentStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Short machine-friendly name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Database(_) => "DatabaseError",
            Self::InvalidInput(_) => "InvalidInput",
            Self::TaskNotFound(_) => "TaskNotFound",
            Self::Embedding(_) | Self::EmbeddingQuota(_) => "EmbeddingServiceError",
            Self::Generation(_) => "GenerationServiceError",
            Self::QuotaExceeded(_) => "QuotaExceeded",
            Self::Upstream(_) => "UpstreamError",
            Self::Memory(_) => "MemoryError",
            Self::Stage { source, .. } => source.kind(),
            Self::Io(_) => "IoError",
        }
    }
}

impl TriadErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file and GEMINI_API_KEY",
            Self::Database(_) => "Database operation failed. Check the data directory",
            Self::InvalidInput(_) => "Please enter a task",
            Self::TaskNotFound(_) => "No task with that ID exists",
            Self::Embedding(_) => "Embedding service unavailable. Check your API key and network",
            Self::Generation(_) => "Text generation failed. Check your API key and network",
            Self::QuotaExceeded(_) | Self::EmbeddingQuota(_) => {
                "API quota exceeded. Please wait before trying again"
            }
            Self::Upstream(_) => "Upstream service unreachable. Check your connection",
            Self::Memory(_) => "Memory store operation failed",
            Self::Stage { source, .. } => source.user_hint(),
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Stage { source, .. } => source.is_recoverable(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_display() {
        let err = EngineError::Stage {
            stage: AgentStage::Worker,
            source: Box::new(EngineError::Embedding("HTTP 503".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Worker agent failed: Embedding service error: HTTP 503"
        );
        assert_eq!(err.stage(), Some(AgentStage::Worker));
        assert_eq!(err.kind(), "EmbeddingServiceError");
        assert!(err.quota().is_none());
    }

    #[test]
    fn test_quota_is_found_through_stage() {
        let info = QuotaInfo {
            retry_after_secs: Some(12.0),
            ..Default::default()
        };
        let err = EngineError::Stage {
            stage: AgentStage::Evaluator,
            source: Box::new(EngineError::QuotaExceeded(info.clone())),
        };
        assert_eq!(err.quota(), Some(&info));
        assert_eq!(
            err.user_hint(),
            "API quota exceeded. Please wait before trying again"
        );
    }

    #[test]
    fn test_embedding_quota_keeps_embedding_kind() {
        let err = EngineError::Stage {
            stage: AgentStage::Worker,
            source: Box::new(EngineError::EmbeddingQuota(QuotaInfo {
                retry_after_secs: Some(46.69),
                ..Default::default()
            })),
        };
        assert_eq!(err.kind(), "EmbeddingServiceError");
        assert_eq!(err.quota().and_then(|q| q.retry_after_secs), Some(46.69));
        assert!(err.to_string().starts_with("Worker agent failed: Embedding service error:"));
    }

    #[test]
    fn test_config_errors_are_not_recoverable() {
        assert!(!EngineError::Config("missing key".into()).is_recoverable());
        assert!(EngineError::Generation("HTTP 500".into()).is_recoverable());
    }
}
