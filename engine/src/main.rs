// Triad Agent Pipeline
// Main entry point for the triad binary

use clap::Parser;
use triad_engine::cli::{Cli, Command};
use triad_engine::config::Config;
use triad_engine::handlers::{
    handle_clear_failed, handle_history, handle_recall, handle_remember, handle_replay, handle_run,
    OutputFormat,
};
use triad_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    if let Some(level) = &cli.log {
        config.core.log_level = level.clone();
    }

    // RUST_LOG still wins over the configured level
    init_telemetry_with_level(&config.core.log_level);
    tracing::debug!("Triad v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Run { goal } => handle_run(goal, &config, format).await,
        Command::Remember { text } => handle_remember(text, &config, format).await,
        Command::Recall { query, k } => handle_recall(query, k, &config, format).await,
        Command::History { limit } => handle_history(limit, &config, format).await,
        Command::Replay { task_id } => handle_replay(task_id, &config, format).await,
        Command::ClearFailed => handle_clear_failed(&config, format).await,
    }
}
