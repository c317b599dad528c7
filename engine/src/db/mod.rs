/// SQLite persistence
///
/// One database file holds the task history (tasks plus the agent steps of
/// each run) and the vector memory tables. The CLI and the server open the
/// same file, so the pool runs in WAL mode.
use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::memory::VectorStore;

pub mod tasks;

pub use tasks::{AgentStep, Task, TaskRepository, TaskStatus};

/// Embedded schema, applied in order on every open. Each script is
/// idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_initial", include_str!("../../migrations/001_initial.sql")),
    (
        "002_vector_memory",
        include_str!("../../migrations/002_vector_memory.sql"),
    ),
];

const MAX_CONNECTIONS: u32 = 5;

/// Shared SQLite pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and bring its schema up
    /// to date. Missing parent directories are created.
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!(path = %db_path.display(), "Opening database");

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        for &(name, sql) in MIGRATIONS {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Migration {} failed", name))?;
            debug!(migration = name, "Applied migration");
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tasks(&self) -> TaskRepository {
        TaskRepository::new(self.pool.clone())
    }

    /// Vector store sharing this pool
    pub fn memory_store(&self) -> VectorStore {
        VectorStore::from_pool(self.pool.clone())
    }

    /// Checkpoint the WAL into the main database file.
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("WAL checkpoint failed")?;
        Ok(())
    }

    /// Checkpoint and close every pooled connection.
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;
        debug!("Database closed");
        Ok(())
    }
}
