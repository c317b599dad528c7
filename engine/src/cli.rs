//! CLI interface for Triad
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Triad planner / worker / evaluator agent pipeline
///
/// Sends a goal through three model calls, grounded by a local vector memory,
/// and keeps a history of every run.
#[derive(Parser, Debug)]
#[command(name = "triad")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a goal through the planner, worker and evaluator
    Run {
        /// The goal to work on
        goal: String,
    },

    /// Store a text in vector memory
    Remember {
        /// Text to store
        text: String,
    },

    /// Show the stored memories most similar to a query
    Recall {
        /// Query text
        query: String,

        /// Number of memories to return
        #[arg(short, long, default_value = "3")]
        k: usize,
    },

    /// Show task history
    History {
        /// Number of tasks to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a task and all of its agent steps
    Replay {
        /// Task ID to replay
        task_id: String,
    },

    /// Delete all failed tasks
    ClearFailed,
}
