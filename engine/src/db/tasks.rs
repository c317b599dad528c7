/// Task history rows: one `tasks` row per submitted goal, one
/// `agent_steps` row per stage that produced output.
///
/// Tasks record one submitted goal each; agent steps record the input and
/// output of every pipeline stage that completed for that task. All queries
/// are parameterized.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::time::{SystemTime, UNIX_EPOCH};

/// Task status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            _ => TaskStatus::Failed,
        }
    }
}

/// Task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_input: String,
    pub status: TaskStatus,
    pub final_output: Option<String>,
    pub confidence: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

/// Agent step record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    pub id: Option<i64>,
    pub task_id: String,
    pub step_order: i64,
    pub agent_name: String,
    pub input_data: String,
    pub output_data: String,
    pub created_at: i64,
}

const TASK_COLUMNS: &str =
    "id, user_input, status, final_output, confidence, error_message, created_at, completed_at";

fn now_secs() -> Result<i64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() as i64)
}

fn task_from_row(r: &SqliteRow) -> Task {
    Task {
        id: r.get("id"),
        user_input: r.get("user_input"),
        status: TaskStatus::from_db(r.get::<String, _>("status").as_str()),
        final_output: r.get("final_output"),
        confidence: r.get("confidence"),
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
        completed_at: r.get("completed_at"),
    }
}

/// Reads and writes the task history tables
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new task in `pending` state
    pub async fn create_task(&self, id: &str, user_input: &str) -> Result<Task> {
        let now = now_secs()?;

        sqlx::query("INSERT INTO tasks (id, user_input, status, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(user_input)
            .bind(TaskStatus::Pending.as_str())
            .bind(now)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Inserting task {}", id))?;

        Ok(Task {
            id: id.to_string(),
            user_input: user_input.to_string(),
            status: TaskStatus::Pending,
            final_output: None,
            confidence: None,
            error_message: None,
            created_at: now,
            completed_at: None,
        })
    }

    /// Move a task to `running`
    pub async fn mark_running(&self, task_id: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(TaskStatus::Running.as_str())
            .bind(task_id)
            .execute(&self.pool)
            .await
            .context("Updating task status")?;

        Ok(())
    }

    /// Complete a task with its final output and optional confidence
    pub async fn complete_task(
        &self,
        task_id: &str,
        final_output: &str,
        confidence: Option<f64>,
    ) -> Result<()> {
        let now = now_secs()?;

        sqlx::query(
            "UPDATE tasks SET status = ?, final_output = ?, confidence = ?, completed_at = ? WHERE id = ?",
        )
        .bind(TaskStatus::Completed.as_str())
        .bind(final_output)
        .bind(confidence)
        .bind(now)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .context("Recording task completion")?;

        Ok(())
    }

    /// Mark a task as failed, keeping any steps already recorded
    pub async fn fail_task(&self, task_id: &str, error_message: &str) -> Result<()> {
        let now = now_secs()?;

        sqlx::query("UPDATE tasks SET status = ?, error_message = ?, completed_at = ? WHERE id = ?")
            .bind(TaskStatus::Failed.as_str())
            .bind(error_message)
            .bind(now)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .context("Recording task failure")?;

        Ok(())
    }

    /// Get a task by ID
    pub async fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .context("Loading task")?;

        Ok(row.as_ref().map(task_from_row))
    }

    /// Get recent tasks, newest first
    pub async fn get_recent_tasks(&self, limit: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT ?",
            TASK_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Listing recent tasks")?;

        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Record one stage's input and output
    pub async fn add_step(
        &self,
        task_id: &str,
        step_order: i64,
        agent_name: &str,
        input_data: &str,
        output_data: &str,
    ) -> Result<AgentStep> {
        let now = now_secs()?;

        let result = sqlx::query(
            "INSERT INTO agent_steps (task_id, step_order, agent_name, input_data, output_data, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(step_order)
        .bind(agent_name)
        .bind(input_data)
        .bind(output_data)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to add agent step")?;

        Ok(AgentStep {
            id: Some(result.last_insert_rowid()),
            task_id: task_id.to_string(),
            step_order,
            agent_name: agent_name.to_string(),
            input_data: input_data.to_string(),
            output_data: output_data.to_string(),
            created_at: now,
        })
    }

    /// Get all steps for a task in execution order
    pub async fn get_task_steps(&self, task_id: &str) -> Result<Vec<AgentStep>> {
        let rows = sqlx::query(
            "SELECT id, task_id, step_order, agent_name, input_data, output_data, created_at FROM agent_steps WHERE task_id = ? ORDER BY step_order ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch agent steps")?;

        Ok(rows
            .into_iter()
            .map(|r| AgentStep {
                id: Some(r.get("id")),
                task_id: r.get("task_id"),
                step_order: r.get("step_order"),
                agent_name: r.get("agent_name"),
                input_data: r.get("input_data"),
                output_data: r.get("output_data"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Delete every failed task (and, via cascade, its steps)
    pub async fn delete_failed_tasks(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tasks WHERE status = ?")
            .bind(TaskStatus::Failed.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to delete failed tasks")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("triad.db"))
            .await
            .unwrap();
        (temp_dir, db)
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();

        let task = repo.create_task("t1", "write a haiku").await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        repo.mark_running("t1").await.unwrap();
        assert_eq!(
            repo.get_task("t1").await.unwrap().unwrap().status,
            TaskStatus::Running
        );

        repo.complete_task("t1", "PASS 90%", Some(0.9)).await.unwrap();
        let task = repo.get_task("t1").await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.final_output.as_deref(), Some("PASS 90%"));
        assert_eq!(task.confidence, Some(0.9));
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_steps_are_ordered() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();
        repo.create_task("t1", "goal").await.unwrap();

        repo.add_step("t1", 2, "Worker", "plan", "result").await.unwrap();
        repo.add_step("t1", 1, "Planner", "goal", "plan").await.unwrap();

        let steps = repo.get_task_steps("t1").await.unwrap();
        let names: Vec<_> = steps.iter().map(|s| s.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Planner", "Worker"]);
    }

    #[tokio::test]
    async fn test_step_requires_existing_task() {
        let (_dir, db) = setup().await;
        let result = db
            .tasks()
            .add_step("missing", 1, "Planner", "in", "out")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_failed_tasks_cascades() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();

        repo.create_task("ok", "goal").await.unwrap();
        repo.complete_task("ok", "done", None).await.unwrap();

        repo.create_task("bad", "goal").await.unwrap();
        repo.add_step("bad", 1, "Planner", "goal", "plan").await.unwrap();
        repo.fail_task("bad", "Worker agent failed: boom").await.unwrap();

        let failed = repo.get_task("bad").await.unwrap().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("Worker agent failed: boom")
        );

        assert_eq!(repo.delete_failed_tasks().await.unwrap(), 1);
        assert!(repo.get_task("bad").await.unwrap().is_none());
        assert!(repo.get_task_steps("bad").await.unwrap().is_empty());
        assert!(repo.get_task("ok").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_recent_tasks_newest_first() {
        let (_dir, db) = setup().await;
        let repo = db.tasks();
        for id in ["a", "b", "c"] {
            repo.create_task(id, "goal").await.unwrap();
        }

        let recent = repo.get_recent_tasks(2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }
}
