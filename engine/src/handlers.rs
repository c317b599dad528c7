//! `triad` subcommand implementations
//!
//! Each handler opens what it needs from the config and prints text or JSON:
//! - run: Send a goal through the pipeline
//! - remember / recall: Write to and search vector memory
//! - history: newest tasks first
//! - replay: one task with its stage outputs
//! - clear-failed: Delete failed tasks

use anyhow::{Context, Result};
use sdk::errors::TriadErrorExt;
use sdk::types::DEFAULT_RETRY_SECS;
use serde_json::json;

use crate::config::Config;
use crate::db::Database;
use crate::memory::VectorMemory;
use crate::orchestrator::{build_embedder, open_memory, Orchestrator};

/// How handlers print their results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}

fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

/// Memory handle that needs only the embedder, not the text generator
async fn memory_only(config: &Config) -> Result<VectorMemory> {
    let db = open_database(config).await?;
    let embedder = build_embedder(config)?;
    Ok(open_memory(config, &db, embedder).await?)
}

/// Run a goal through the pipeline
pub async fn handle_run(goal: String, config: &Config, format: OutputFormat) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config).await?;

    if let OutputFormat::Text = format {
        println!("Goal: {}", goal);
        println!();
    }

    match orchestrator.run_task(&goal).await {
        Ok(report) => {
            match format {
                OutputFormat::Text => {
                    for step in &report.steps {
                        println!("[{}] {}", step.step_order, step.agent_name);
                        println!("{}", step.output_data);
                        println!();
                    }
                    println!("✓ Task completed");
                    println!("  Task ID: {}", report.task_id);
                    if let Some(verdict) = report.verdict {
                        println!(
                            "  Verdict: {}",
                            if verdict.passed { "PASS" } else { "FAIL" }
                        );
                        if let Some(confidence) = verdict.confidence {
                            println!("  Confidence: {:.0}%", confidence * 100.0);
                        }
                    }
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": "completed",
                        "task_id": report.task_id,
                        "plan": report.state.plan,
                        "context": report.state.context,
                        "result": report.state.result,
                        "evaluation": report.state.evaluation,
                        "verdict": report.verdict,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Ok(())
        }
        Err(failure) => {
            let error = &failure.error;
            match format {
                OutputFormat::Text => {
                    if let Some(quota) = error.quota() {
                        println!(
                            "✗ Quota exceeded. Try again in {} seconds.",
                            quota.retry_after_or(DEFAULT_RETRY_SECS).ceil()
                        );
                    } else {
                        println!("✗ {}", error);
                    }
                    println!("  Hint: {}", error.user_hint());
                }
                OutputFormat::Json => {
                    let output = json!({
                        "status": "failed",
                        "task_id": failure.task_id,
                        "phase": failure.phase,
                        "error": error.to_string(),
                        "kind": error.kind(),
                        "stage": error.stage(),
                        "quota": error.quota(),
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
            Err(failure.into())
        }
    }
}

/// Store a text in vector memory
pub async fn handle_remember(text: String, config: &Config, format: OutputFormat) -> Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Memory text must not be empty");
    }

    let memory = memory_only(config).await?;
    let id = memory.store(text.trim()).await?;

    match format {
        OutputFormat::Text => println!("✓ Stored memory {}", id),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "id": id, "collection": memory.collection() }))?
            );
        }
    }

    Ok(())
}

/// Show the memories most similar to a query
pub async fn handle_recall(
    query: String,
    k: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let memory = memory_only(config).await?;
    let hits = memory.query_scored(&query, k).await?;

    match format {
        OutputFormat::Text => {
            if hits.is_empty() {
                println!("No memories stored");
                return Ok(());
            }
            for (rank, hit) in hits.iter().enumerate() {
                println!("{}. ({:.3}) {}", rank + 1, hit.score, hit.text);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "query": query,
                "results": hits,
                "count": hits.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show task history
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let task_repo = database.tasks();

    let tasks = task_repo
        .get_recent_tasks(limit as i64)
        .await
        .context("Listing task history")?;

    match format {
        OutputFormat::Text => {
            if tasks.is_empty() {
                println!("No tasks recorded yet");
                return Ok(());
            }

            println!("Recent tasks (up to {}):", limit);
            println!();

            for task in tasks {
                println!("{}", task.id);
                println!("  Input: {}", task.user_input);
                println!("  Status: {}", task.status.as_str());

                if let Some(confidence) = task.confidence {
                    println!("  Confidence: {:.0}%", confidence * 100.0);
                }

                if let Some(error) = &task.error_message {
                    println!("  Error: {}", error);
                }

                println!("  Created: {}", format_timestamp(task.created_at));
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "tasks": tasks,
                "count": tasks.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print a stored task and the output of each stage it reached
pub async fn handle_replay(task_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let task_repo = database.tasks();

    let task = task_repo
        .get_task(&task_id)
        .await
        .context("Loading task")?
        .ok_or_else(|| anyhow::anyhow!("Task not found: {}", task_id))?;

    let steps = task_repo
        .get_task_steps(&task_id)
        .await
        .context("Failed to fetch agent steps")?;

    match format {
        OutputFormat::Text => {
            println!("Task {}", task_id);
            println!();
            println!("Input: {}", task.user_input);
            println!("Status: {}", task.status.as_str());
            println!("Created: {}", format_timestamp(task.created_at));

            if let Some(error) = &task.error_message {
                println!("Error: {}", error);
            }

            println!();
            println!("{} step(s):", steps.len());
            println!();

            for step in steps {
                println!("Step {}: {}", step.step_order, step.agent_name);
                println!("  Input:  {}", step.input_data);
                println!("  Output: {}", step.output_data);
                println!();
            }

            if let Some(output) = &task.final_output {
                println!("Final output:");
                println!("{}", output);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "task": task,
                "steps": steps,
                "step_count": steps.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Delete every failed task
pub async fn handle_clear_failed(config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let count = database
        .tasks()
        .delete_failed_tasks()
        .await
        .context("Failed to delete failed tasks")?;

    let message = format!("Cleared {} failed tasks", count);
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "message": message, "count": count }))?
            );
        }
    }

    Ok(())
}
