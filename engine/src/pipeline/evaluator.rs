//! Evaluator stage
//!
//! Asks the model whether the worker's result satisfies the original goal.
//! The answer is kept verbatim; see [`super::verdict`] for structured parsing.

use super::types::{Evaluated, Worked};
use super::{StageError, StageFailure};
use crate::llm::TextGenerator;
use sdk::types::AgentStage;
use std::sync::Arc;

pub struct Evaluator {
    llm: Arc<dyn TextGenerator>,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    pub fn prompt(input: &str, result: &str) -> String {
        format!(
            "Evaluate if this answer satisfies the task. Task: {}\nResult: {}\nReturn PASS or FAIL with a confidence score.",
            input, result
        )
    }

    pub async fn run(&self, worked: Worked) -> Result<Evaluated, StageError> {
        tracing::info!(stage = "Evaluator", "Stage started");

        let evaluation = self
            .llm
            .generate(&Self::prompt(&worked.input, &worked.result))
            .await
            .map_err(|e| StageError::new(AgentStage::Evaluator, StageFailure::Llm(e)))?;

        tracing::info!(stage = "Evaluator", "Stage finished");
        Ok(Evaluated {
            input: worked.input,
            plan: worked.plan,
            context: worked.context,
            result: worked.result,
            evaluation,
        })
    }
}
