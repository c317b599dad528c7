//! Worker stage
//!
//! Pulls the most relevant memories for the goal and asks the model to carry
//! out the plan with them as context. An empty memory gives an empty context,
//! which is still a valid prompt.

use super::types::{Planned, Worked};
use super::{StageError, StageFailure};
use crate::llm::TextGenerator;
use crate::memory::VectorMemory;
use sdk::types::AgentStage;
use std::sync::Arc;

/// Number of memories retrieved when none is configured
pub const DEFAULT_TOP_K: usize = 3;

pub struct Worker {
    llm: Arc<dyn TextGenerator>,
    memory: Arc<VectorMemory>,
    top_k: usize,
}

impl Worker {
    pub fn new(llm: Arc<dyn TextGenerator>, memory: Arc<VectorMemory>) -> Self {
        Self {
            llm,
            memory,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn prompt(plan: &str, context: &str) -> String {
        format!("Plan:\n{}\nContext:\n{}", plan, context)
    }

    pub async fn run(&self, planned: Planned) -> Result<Worked, StageError> {
        tracing::info!(stage = "Worker", top_k = self.top_k, "Stage started");

        let context = self
            .memory
            .query(&planned.input, self.top_k)
            .await
            .map_err(|e| StageError::new(AgentStage::Worker, StageFailure::Memory(e)))?;

        tracing::debug!(stage = "Worker", retrieved = context.len(), "Memory context retrieved");

        let prompt = Self::prompt(&planned.plan, &context.join("\n"));
        let result = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| StageError::new(AgentStage::Worker, StageFailure::Llm(e)))?;

        tracing::info!(stage = "Worker", result_len = result.len(), "Stage finished");
        Ok(Worked {
            input: planned.input,
            plan: planned.plan,
            context,
            result,
        })
    }
}
