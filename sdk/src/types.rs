//! Shared value types
//!
//! Types that cross the engine / api-server boundary and appear inside
//! [`EngineError`](crate::errors::EngineError).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three stages of the agent pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStage {
    Planner,
    Worker,
    Evaluator,
}

impl AgentStage {
    /// All stages in execution order.
    pub const ALL: [AgentStage; 3] = [AgentStage::Planner, AgentStage::Worker, AgentStage::Evaluator];

    /// Name used for persisted step records ("Planner", "Worker", "Evaluator").
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStage::Planner => "Planner",
            AgentStage::Worker => "Worker",
            AgentStage::Evaluator => "Evaluator",
        }
    }
}

impl fmt::Display for AgentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry delay shown when a quota error names none
pub const DEFAULT_RETRY_SECS: f64 = 60.0;

/// Metadata extracted from an upstream rate-limit / quota failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaInfo {
    /// Seconds the upstream asked us to wait, when it said so
    pub retry_after_secs: Option<f64>,

    /// Model named in the error text
    pub model: Option<String>,

    /// Quota limit named in the error text
    pub limit: Option<u64>,

    /// Raw upstream error text
    pub details: String,
}

impl QuotaInfo {
    /// Retry delay to show a user, falling back to `default_secs`.
    pub fn retry_after_or(&self, default_secs: f64) -> f64 {
        self.retry_after_secs.unwrap_or(default_secs)
    }
}

impl fmt::Display for QuotaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quota exceeded")?;
        if let Some(model) = &self.model {
            write!(f, " for model {}", model)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " (limit {})", limit)?;
        }
        if let Some(secs) = self.retry_after_secs {
            write!(f, ", retry in {:.2}s", secs)?;
        }
        Ok(())
    }
}
