//! Request Orchestrator
//!
//! Takes a user goal, records a task, runs the pipeline and persists an
//! agent step after each stage completes. On failure
//! the task is marked `failed` with a stage-tagged message and the steps
//! already written are kept.

use crate::config::Config;
use crate::db::{AgentStep, Database, Task, TaskRepository};
use crate::llm::gemini::GeminiClient;
use crate::llm::hashing::HashingEmbedder;
use crate::llm::{Embedder, TextGenerator};
use crate::memory::{ScoredPoint, VectorMemory};
use crate::pipeline::{
    Evaluated, Goal, Pipeline, PipelinePhase, StageObserver, StageOutput, Verdict,
};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::AgentStage;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Longest error message stored on a failed task
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Everything produced by a successful run
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub state: Evaluated,
    pub verdict: Option<Verdict>,
    pub steps: Vec<AgentStep>,
}

/// A failed run: the task (if one was created), how far it got, and why
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    pub task_id: Option<String>,
    pub phase: PipelinePhase,
    pub error: EngineError,
}

/// Build the text generator described by `config`.
pub fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>, EngineError> {
    let client = GeminiClient::from_env(
        config.llm.gemini.clone(),
        config.memory.dimension,
        Duration::from_secs(config.llm.request_timeout_secs),
    )?;
    Ok(Arc::new(client))
}

/// Build the embedder described by `config`.
pub fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>, EngineError> {
    match config.llm.embedding_provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.memory.dimension))),
        "gemini" => {
            let client = GeminiClient::from_env(
                config.llm.gemini.clone(),
                config.memory.dimension,
                Duration::from_secs(config.llm.request_timeout_secs),
            )?;
            Ok(Arc::new(client))
        }
        other => Err(EngineError::Config(format!(
            "Unknown embedding provider '{}'",
            other
        ))),
    }
}

/// Open the vector memory described by `config` on an existing database.
pub async fn open_memory(
    config: &Config,
    db: &Database,
    embedder: Arc<dyn Embedder>,
) -> Result<VectorMemory, EngineError> {
    let memory = VectorMemory::new(db.memory_store(), embedder, config.memory.collection.clone())
        .await?
        .with_query_task(config.memory.query_task_type);
    Ok(memory)
}

fn db_error(err: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", err))
}

/// Cut `message` to at most `max` characters.
pub fn truncate_message(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

pub struct Orchestrator {
    db: Database,
    pipeline: Pipeline,
    memory: Arc<VectorMemory>,
}

impl Orchestrator {
    pub fn new(db: Database, pipeline: Pipeline, memory: Arc<VectorMemory>) -> Self {
        Self {
            db,
            pipeline,
            memory,
        }
    }

    /// Wire database, clients, memory and pipeline from configuration.
    pub async fn from_config(config: &Config) -> Result<Self, EngineError> {
        let generator = build_generator(config)?;
        let embedder = build_embedder(config)?;
        Self::with_clients(config, generator, embedder).await
    }

    /// Like [`Orchestrator::from_config`] with caller-supplied clients.
    pub async fn with_clients(
        config: &Config,
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, EngineError> {
        let db = Database::new(&config.database_path())
            .await
            .map_err(db_error)?;
        let memory = Arc::new(open_memory(config, &db, embedder).await?);
        let pipeline =
            Pipeline::with_generator(generator, Arc::clone(&memory), config.memory.top_k);

        Ok(Self::new(db, pipeline, memory))
    }

    pub fn tasks(&self) -> TaskRepository {
        self.db.tasks()
    }

    pub fn memory(&self) -> &Arc<VectorMemory> {
        &self.memory
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run the full pipeline for `goal`, persisting the task and its steps.
    pub async fn run_task(&self, goal: &str) -> Result<TaskReport, RunFailure> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(RunFailure {
                task_id: None,
                phase: PipelinePhase::Pending,
                error: EngineError::InvalidInput("Please enter a task".to_string()),
            });
        }

        let tasks = self.db.tasks();
        let task_id = uuid::Uuid::new_v4().to_string();

        let fail_early = |error: EngineError| RunFailure {
            task_id: None,
            phase: PipelinePhase::Pending,
            error,
        };
        tasks
            .create_task(&task_id, goal)
            .await
            .map_err(|e| fail_early(db_error(e)))?;
        tasks
            .mark_running(&task_id)
            .await
            .map_err(|e| fail_early(db_error(e)))?;

        info!(task_id = %task_id, "Task started");

        let mut phase = PipelinePhase::Pending;
        match self.drive(&tasks, &task_id, goal, &mut phase).await {
            Ok(report) => {
                info!(
                    task_id = %task_id,
                    confidence = ?report.verdict.and_then(|v| v.confidence),
                    "Task completed"
                );
                Ok(report)
            }
            Err(error) => {
                let message = truncate_message(&error.to_string(), MAX_ERROR_MESSAGE_LEN);
                warn!(task_id = %task_id, phase = %phase, error = %message, "Task failed");

                if let Err(e) = tasks.fail_task(&task_id, &message).await {
                    warn!(task_id = %task_id, "Failed to record task failure: {:#}", e);
                }

                Err(RunFailure {
                    task_id: Some(task_id),
                    phase,
                    error,
                })
            }
        }
    }

    async fn drive(
        &self,
        tasks: &TaskRepository,
        task_id: &str,
        goal: &str,
        phase: &mut PipelinePhase,
    ) -> Result<TaskReport, EngineError> {
        let mut recorder = StepRecorder {
            tasks,
            task_id,
            phase,
            steps: Vec::with_capacity(AgentStage::ALL.len()),
        };
        let evaluated = self
            .pipeline
            .run_observed(Goal::new(goal), &mut recorder)
            .await?;
        let StepRecorder { phase, steps, .. } = recorder;

        let verdict = Verdict::parse(&evaluated.evaluation);
        tasks
            .complete_task(
                task_id,
                &evaluated.result,
                verdict.and_then(|v| v.confidence),
            )
            .await
            .map_err(db_error)?;
        advance(phase, PipelinePhase::Done);

        Ok(TaskReport {
            task_id: task_id.to_string(),
            state: evaluated,
            verdict,
            steps,
        })
    }

    /// Store `text` in vector memory, returning its id.
    pub async fn remember(&self, text: &str) -> Result<String, EngineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidInput(
                "Memory text must not be empty".to_string(),
            ));
        }
        Ok(self.memory.store(text).await?)
    }

    /// The `k` memories most similar to `query`, with scores.
    pub async fn recall(&self, query: &str, k: usize) -> Result<Vec<ScoredPoint>, EngineError> {
        if query.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "Query must not be empty".to_string(),
            ));
        }
        Ok(self.memory.query_scored(query, k).await?)
    }

    /// A task and its steps in execution order.
    pub async fn task_with_steps(
        &self,
        task_id: &str,
    ) -> Result<(Task, Vec<AgentStep>), EngineError> {
        let tasks = self.db.tasks();
        let task = tasks
            .get_task(task_id)
            .await
            .map_err(db_error)?
            .ok_or_else(|| EngineError::TaskNotFound(task_id.to_string()))?;
        let steps = tasks.get_task_steps(task_id).await.map_err(db_error)?;
        Ok((task, steps))
    }

    pub async fn recent_tasks(&self, limit: i64) -> Result<Vec<Task>, EngineError> {
        self.db.tasks().get_recent_tasks(limit).await.map_err(db_error)
    }

    /// Delete every failed task. Returns how many were removed.
    pub async fn clear_failed_tasks(&self) -> Result<u64, EngineError> {
        let count = self
            .db
            .tasks()
            .delete_failed_tasks()
            .await
            .map_err(db_error)?;
        info!(count, "Cleared failed tasks");
        Ok(count)
    }
}

/// Persists an agent step as each stage finishes
struct StepRecorder<'a> {
    tasks: &'a TaskRepository,
    task_id: &'a str,
    phase: &'a mut PipelinePhase,
    steps: Vec<AgentStep>,
}

#[async_trait]
impl<'a> StageObserver for StepRecorder<'a> {
    type Error = EngineError;

    async fn stage_completed(&mut self, output: StageOutput<'_>) -> Result<(), EngineError> {
        let step = self
            .tasks
            .add_step(
                self.task_id,
                output.order,
                output.stage.as_str(),
                output.input,
                output.output,
            )
            .await
            .map_err(db_error)?;
        self.steps.push(step);

        let reached = match output.stage {
            AgentStage::Planner => PipelinePhase::Planned,
            AgentStage::Worker => PipelinePhase::Worked,
            AgentStage::Evaluator => PipelinePhase::Evaluated,
        };
        advance(self.phase, reached);
        Ok(())
    }
}

fn advance(phase: &mut PipelinePhase, to: PipelinePhase) {
    match phase.advance(to) {
        Ok(next) => *phase = next,
        Err(e) => warn!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short", 500), "short");
        let long = "é".repeat(600);
        let cut = truncate_message(&long, 500);
        assert_eq!(cut.chars().count(), 500);
    }

    #[test]
    fn test_build_embedder_hashing_needs_no_key() {
        let mut config = Config::default();
        config.llm.embedding_provider = "hashing".to_string();
        config.memory.dimension = 16;

        let embedder = build_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 16);
        assert_eq!(embedder.name(), "hashing");
    }

    #[test]
    fn test_build_generator_requires_key() {
        let mut config = Config::default();
        config.llm.gemini.api_key_env = "TRIAD_TEST_UNSET_KEY_VAR".to_string();
        assert!(matches!(
            build_generator(&config),
            Err(EngineError::Config(_))
        ));
    }
}
