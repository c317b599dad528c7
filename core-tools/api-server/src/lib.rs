//! API Server
//!
//! HTTP front end for the Triad pipeline. Serves the goal form, runs the
//! pipeline for submitted goals and exposes task history and memory over a
//! small JSON API.
//!
//! # Endpoints
//!
//! - GET / - Goal form
//! - POST / - Run a goal (form field `user_input`)
//! - GET /health/ - Liveness check
//! - POST /admin/clear-failed/ - Delete failed tasks (requires Bearer token)
//! - GET /api/tasks - Get task history
//! - GET /api/tasks/:id - Get a task and its steps
//! - POST /api/memory - Store a text in vector memory

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use sdk::{EngineError, QuotaInfo, DEFAULT_RETRY_SECS};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::TraceLayer;
use triad_engine::config::Config;
use triad_engine::orchestrator::{Orchestrator, TaskReport};

/// Quota limit shown when a quota error names none
pub const DEFAULT_QUOTA_LIMIT: u64 = 20;

/// Tasks returned by `/api/tasks` without a `limit`
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    admin_token: Option<String>,
    model: String,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, admin_token: Option<String>, model: String) -> Self {
        Self {
            orchestrator,
            admin_token,
            model,
        }
    }

    /// Wire the orchestrator and server settings from configuration.
    pub async fn build(config: &Config) -> Result<Self, EngineError> {
        let orchestrator = Orchestrator::from_config(config).await?;
        Ok(Self::new(
            Arc::new(orchestrator),
            config.server.admin_token.clone(),
            config.llm.gemini.text_model.clone(),
        ))
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler).post(submit_handler))
        .route("/health/", get(health_handler))
        .route("/admin/clear-failed/", post(clear_failed_handler))
        .route("/api/tasks", get(tasks_handler))
        .route("/api/tasks/:id", get(task_handler))
        .route("/api/memory", post(memory_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to `server.bind_addr` and serve until Ctrl-C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let state = AppState::build(config).await?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    let addr = listener.local_addr()?;

    if state.admin_token.is_none() {
        tracing::warn!("No admin token configured; /admin/clear-failed/ will reject every request");
    }
    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("API server shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GoalForm {
    #[serde(default)]
    user_input: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MemoryRequest {
    #[serde(default)]
    text: String,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn status_for(error: &EngineError) -> StatusCode {
    if error.quota().is_some() {
        return StatusCode::TOO_MANY_REQUESTS;
    }
    match error {
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error(error: EngineError) -> Response {
    json_error(status_for(&error), error.to_string())
}

fn token_matches(expected: &str, given: &str) -> bool {
    expected.as_bytes().ct_eq(given.as_bytes()).into()
}

/// Goal form
async fn index_handler() -> Html<String> {
    Html(render_form(None))
}

/// Run the pipeline for a submitted goal
async fn submit_handler(State(state): State<AppState>, Form(form): Form<GoalForm>) -> Response {
    let user_input = form.user_input.trim().to_string();
    if user_input.is_empty() {
        return Html(render_form(Some("Please enter a task"))).into_response();
    }

    match state.orchestrator.run_task(&user_input).await {
        Ok(report) => Html(render_result(&report)).into_response(),
        Err(failure) => {
            if let Some(quota) = failure.error.quota() {
                tracing::warn!(task_id = ?failure.task_id, "Quota exceeded");
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    Html(render_quota(quota, &state.model)),
                )
                    .into_response();
            }

            tracing::error!(task_id = ?failure.task_id, "Pipeline failed: {}", failure.error);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render_error(&failure.error, &user_input)),
            )
                .into_response()
        }
    }
}

/// Liveness check
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "message": "Agentic AI system is running"
    }))
}

/// Delete every failed task
async fn clear_failed_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = match (&state.admin_token, token) {
        (Some(expected), Some(given)) => token_matches(expected, given),
        _ => false,
    };
    if !authorized {
        return json_error(StatusCode::FORBIDDEN, "Unauthorized");
    }

    match state.orchestrator.clear_failed_tasks().await {
        Ok(count) => Json(json!({
            "message": format!("Cleared {} failed tasks", count)
        }))
        .into_response(),
        Err(e) => engine_error(e),
    }
}

/// Recent tasks
async fn tasks_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(0);
    match state.orchestrator.recent_tasks(limit).await {
        Ok(tasks) => Json(json!({
            "tasks": tasks,
            "count": tasks.len(),
            "limit": limit
        }))
        .into_response(),
        Err(e) => engine_error(e),
    }
}

/// One task with its steps
async fn task_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.orchestrator.task_with_steps(&id).await {
        Ok((task, steps)) => Json(json!({
            "task": task,
            "steps": steps,
            "step_count": steps.len()
        }))
        .into_response(),
        Err(e) => engine_error(e),
    }
}

/// Store a text in vector memory
async fn memory_handler(
    State(state): State<AppState>,
    Json(request): Json<MemoryRequest>,
) -> Response {
    match state.orchestrator.remember(&request.text).await {
        Ok(id) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
        Err(e) => engine_error(e),
    }
}

/// Escape text for inclusion in HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
            max-width: 800px;
            margin: 50px auto;
            padding: 20px;
            background: #f5f5f5;
        }
        .container {
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        h1 { color: #333; margin-top: 0; }
        .step {
            margin: 20px 0;
            padding: 15px;
            background: #f8f9fa;
            border-left: 4px solid #007bff;
        }
        .warning {
            margin: 20px 0;
            padding: 15px;
            background: #fff3cd;
            border-left: 4px solid #ffc107;
            color: #856404;
        }
        .error { color: #dc3545; font-weight: bold; }
        pre { white-space: pre-wrap; }
        textarea { width: 100%; min-height: 100px; }
"#;

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="container">
{body}
    </div>
</body>
</html>"#,
        title = escape_html(title),
    )
}

/// The goal form, optionally with an error line above it
pub fn render_form(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"        <p class="error">{}</p>"#, escape_html(e)))
        .unwrap_or_default();
    page(
        "Triad",
        &format!(
            r#"        <h1>Triad</h1>
{error}
        <form method="post" action="/">
            <textarea name="user_input" placeholder="Describe a task"></textarea>
            <p><button type="submit">Run</button></p>
        </form>"#
        ),
    )
}

/// Result page listing every step in execution order
pub fn render_result(report: &TaskReport) -> String {
    let mut body = format!(
        "        <h1>Result</h1>\n        <p><strong>Task:</strong> {}</p>\n",
        escape_html(&report.state.input)
    );

    for step in &report.steps {
        body.push_str(&format!(
            "        <div class=\"step\">\n            <h3>{}. {}</h3>\n            <pre>{}</pre>\n        </div>\n",
            step.step_order,
            escape_html(&step.agent_name),
            escape_html(&step.output_data)
        ));
    }

    body.push_str(&format!(
        "        <h2>Final output</h2>\n        <pre>{}</pre>\n",
        escape_html(&report.state.result)
    ));

    if let Some(confidence) = report.verdict.and_then(|v| v.confidence) {
        body.push_str(&format!(
            "        <p><strong>Confidence:</strong> {:.0}%</p>\n",
            confidence * 100.0
        ));
    }

    body.push_str("        <p><a href=\"/\">New task</a></p>");
    page("Triad - Result", &body)
}

/// Quota page: retry delay, model and limit with upstream details
pub fn render_quota(quota: &QuotaInfo, default_model: &str) -> String {
    let retry = quota.retry_after_or(DEFAULT_RETRY_SECS).ceil() as u64;
    let model = quota.model.as_deref().unwrap_or(default_model);
    let limit = quota.limit.unwrap_or(DEFAULT_QUOTA_LIMIT);

    page(
        "Triad - Quota exceeded",
        &format!(
            r#"        <h1>Quota exceeded</h1>
        <div class="warning">
            <p>The model API quota has been used up. Please try again in <strong>{retry}</strong> seconds.</p>
            <p>Model: <code>{model}</code></p>
            <p>Limit: {limit} requests</p>
        </div>
        <pre>{details}</pre>
        <p><a href="/">Back</a></p>"#,
            model = escape_html(model),
            details = escape_html(&quota.details),
        ),
    )
}

/// Generic error page
pub fn render_error(error: &EngineError, user_input: &str) -> String {
    page(
        "Triad - Error",
        &format!(
            r#"        <h1>Something went wrong</h1>
        <p class="error">{message}</p>
        <p>Error type: <code>{kind}</code></p>
        <p>Task: {input}</p>
        <p><a href="/">Back</a></p>"#,
            message = escape_html(&error.to_string()),
            kind = error.kind(),
            input = escape_html(user_input),
        ),
    )
}
