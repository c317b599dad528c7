//! Triad Engine Library
//!
//! This library provides the planner / worker / evaluator pipeline, its
//! vector memory and task history. It is used by the `triad` binary, the
//! API server and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Text generation and embedding clients
pub mod llm;

/// Vector memory over SQLite
pub mod memory;

/// Planner, worker and evaluator stages
pub mod pipeline;

/// Task lifecycle around a pipeline run
pub mod orchestrator;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
