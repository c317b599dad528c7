//! Agent Pipeline
//!
//! A strictly linear planner → worker → evaluator run. Each stage makes
//! exactly one generation call (the worker also queries vector memory); the
//! first failure stops the run and comes back tagged with its stage. There
//! are no retries and no branches.

use crate::llm::{LLMError, TextGenerator};
use crate::memory::{MemoryError, VectorMemory};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{AgentStage, QuotaInfo};
use std::convert::Infallible;
use std::sync::Arc;

pub mod evaluator;
pub mod planner;
pub mod types;
pub mod verdict;
pub mod worker;

pub use evaluator::Evaluator;
pub use planner::Planner;
pub use types::{Evaluated, Goal, PhaseError, PipelinePhase, Planned, Worked};
pub use verdict::Verdict;
pub use worker::{Worker, DEFAULT_TOP_K};

/// What went wrong inside a stage
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// A stage failure, tagged with the stage that produced it
#[derive(Debug, thiserror::Error)]
#[error("{stage} agent failed: {source}")]
pub struct StageError {
    pub stage: AgentStage,
    #[source]
    pub source: StageFailure,
}

impl StageError {
    pub fn new(stage: AgentStage, source: StageFailure) -> Self {
        Self { stage, source }
    }

    /// Quota metadata if the stage failed on a rate limit.
    pub fn quota(&self) -> Option<&QuotaInfo> {
        match &self.source {
            StageFailure::Llm(e) | StageFailure::Memory(MemoryError::Embedding(e)) => e.quota(),
            StageFailure::Memory(_) => None,
        }
    }
}

impl From<StageError> for EngineError {
    fn from(err: StageError) -> Self {
        let source: EngineError = match err.source {
            StageFailure::Llm(e) => e.into(),
            StageFailure::Memory(e) => e.into(),
        };
        EngineError::Stage {
            stage: err.stage,
            source: Box::new(source),
        }
    }
}

/// One finished stage: what it was given and what it produced
#[derive(Debug, Clone, Copy)]
pub struct StageOutput<'a> {
    pub stage: AgentStage,
    /// 1-based position in the run
    pub order: i64,
    pub input: &'a str,
    pub output: &'a str,
}

/// Called after each stage completes, in execution order. An error stops
/// the run before the next stage starts.
#[async_trait]
pub trait StageObserver: Send {
    type Error: Send;

    async fn stage_completed(&mut self, output: StageOutput<'_>) -> Result<(), Self::Error>;
}

struct Unobserved;

#[async_trait]
impl StageObserver for Unobserved {
    type Error = Infallible;

    async fn stage_completed(&mut self, _output: StageOutput<'_>) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Why an observed run stopped
#[derive(Debug, thiserror::Error)]
pub enum RunError<E> {
    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("{0}")]
    Observer(E),
}

impl From<RunError<EngineError>> for EngineError {
    fn from(err: RunError<EngineError>) -> Self {
        match err {
            RunError::Stage(e) => e.into(),
            RunError::Observer(e) => e,
        }
    }
}

/// The three stages wired together
pub struct Pipeline {
    planner: Planner,
    worker: Worker,
    evaluator: Evaluator,
}

impl Pipeline {
    pub fn new(planner: Planner, worker: Worker, evaluator: Evaluator) -> Self {
        Self {
            planner,
            worker,
            evaluator,
        }
    }

    /// All three stages sharing one generator
    pub fn with_generator(
        llm: Arc<dyn TextGenerator>,
        memory: Arc<VectorMemory>,
        top_k: usize,
    ) -> Self {
        Self::new(
            Planner::new(Arc::clone(&llm)),
            Worker::new(Arc::clone(&llm), memory).with_top_k(top_k),
            Evaluator::new(llm),
        )
    }

    /// Run planner, worker and evaluator in order.
    pub async fn run(&self, goal: Goal) -> Result<Evaluated, StageError> {
        match self.run_observed(goal, &mut Unobserved).await {
            Ok(state) => Ok(state),
            Err(RunError::Stage(e)) => Err(e),
            Err(RunError::Observer(never)) => match never {},
        }
    }

    /// Like [`Pipeline::run`], reporting each finished stage to `observer`.
    ///
    /// Inputs reported per stage: the goal for the planner, the plan plus
    /// retrieved context for the worker, the worker result for the evaluator.
    pub async fn run_observed<O: StageObserver>(
        &self,
        goal: Goal,
        observer: &mut O,
    ) -> Result<Evaluated, RunError<O::Error>> {
        let result: Result<Evaluated, RunError<O::Error>> = async {
            let planned = self.planner.run(goal).await?;
            observer
                .stage_completed(StageOutput {
                    stage: AgentStage::Planner,
                    order: 1,
                    input: &planned.input,
                    output: &planned.plan,
                })
                .await
                .map_err(RunError::Observer)?;

            let worked = self.worker.run(planned).await?;
            let worker_input = format!("{}\nContext:\n{}", worked.plan, worked.context_text());
            observer
                .stage_completed(StageOutput {
                    stage: AgentStage::Worker,
                    order: 2,
                    input: &worker_input,
                    output: &worked.result,
                })
                .await
                .map_err(RunError::Observer)?;

            let evaluated = self.evaluator.run(worked).await?;
            observer
                .stage_completed(StageOutput {
                    stage: AgentStage::Evaluator,
                    order: 3,
                    input: &evaluated.result,
                    output: &evaluated.evaluation,
                })
                .await
                .map_err(RunError::Observer)?;

            Ok(evaluated)
        }
        .await;

        if let Err(RunError::Stage(e)) = &result {
            tracing::warn!(stage = %e.stage, error = %e.source, "Pipeline stopped");
        }
        result
    }
}
