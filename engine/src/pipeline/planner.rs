//! Planner stage
//!
//! Asks the model to break the user's goal into steps.

use super::types::{Goal, Planned};
use super::{StageError, StageFailure};
use crate::llm::TextGenerator;
use sdk::types::AgentStage;
use std::sync::Arc;

pub struct Planner {
    llm: Arc<dyn TextGenerator>,
}

impl Planner {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub fn prompt(goal: &Goal) -> String {
        format!("Break this goal into steps:\n{}", goal.input)
    }

    pub async fn run(&self, goal: Goal) -> Result<Planned, StageError> {
        tracing::info!(stage = "Planner", "Stage started");

        let plan = self
            .llm
            .generate(&Self::prompt(&goal))
            .await
            .map_err(|e| StageError::new(AgentStage::Planner, StageFailure::Llm(e)))?;

        tracing::info!(stage = "Planner", plan_len = plan.len(), "Stage finished");
        Ok(Planned {
            input: goal.input,
            plan,
        })
    }
}
