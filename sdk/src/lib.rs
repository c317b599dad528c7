//! Triad SDK
//!
//! Shared library providing the error taxonomy and value types used by the
//! engine and the API server.

/// Error types and handling
pub mod errors;

/// Shared value types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, TriadErrorExt};
pub use types::{AgentStage, QuotaInfo, DEFAULT_RETRY_SECS};
