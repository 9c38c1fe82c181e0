//! Inbound HTTP API.
//!
//! Three endpoints, mirroring what the external chat gateway consumes:
//! - `POST /run` -- run one supervised request
//! - `GET /health` -- process status plus per-tool-server availability
//! - `GET /models` -- resolved model per category and the process default
//!
//! Error taxonomy at the boundary: configuration problems (missing cloud
//! credential, unknown category with no fallback) reject with 400 before any
//! model call; an invocation timeout maps to 504; "no models resolvable at
//! all" is the one service-level 503; everything else is a 500.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::agents::{compose, runner};
use crate::cache::AgentCache;
use crate::config::AppConfig;
use crate::error::{AgentError, ModelError};
use crate::models::ModelRegistry;
use crate::tools::ToolRuntime;
use crate::toolserver::ToolServerManager;

/// Shared state behind the router. Everything here is a process-wide
/// singleton; requests only read it (the cache's own lock excepted).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
    pub toolservers: Arc<ToolServerManager>,
    pub cache: Arc<AgentCache>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run))
        .route("/health", get(health))
        .route("/models", get(list_models))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub response: String,
}

async fn run(
    State(state): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, (StatusCode, Json<Value>)> {
    let request_id = Uuid::new_v4();

    // Validate the model selection before building anything; a missing cloud
    // credential must reject without a single model call.
    let category = match &req.model {
        Some(category) => category.clone(),
        None => state.registry.default_category().await,
    };
    let resolved = state.registry.resolve(&category).await.map_err(reject_model_error)?;

    tracing::info!(
        %request_id,
        category = %resolved.category,
        model = %resolved.name,
        history_turns = req.history.len(),
        "run request"
    );

    let supervisor = state
        .cache
        .get_or_build(&resolved.category, || async {
            Ok(compose::compose_supervisor(&resolved, &state.toolservers, &state.config).await)
        })
        .await
        .map_err(reject_agent_error)?;

    let prompt = build_prompt_with_history(&req.message, &req.history, state.config.history_turns);

    let runtime = ToolRuntime {
        config: state.config.clone(),
        registry: state.registry.clone(),
    };

    let answer = runner::run_agent(&supervisor, &prompt, &runtime, &state.toolservers)
        .await
        .map_err(reject_agent_error)?;

    tracing::info!(%request_id, chars = answer.len(), "run complete");
    Ok(Json(RunResponse { response: answer }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let mut servers = serde_json::Map::new();
    for (id, health, tool_count) in state.toolservers.health_report() {
        servers.insert(
            id,
            json!({"state": health.to_string(), "tools": tool_count}),
        );
    }

    Json(json!({
        "status": "ok",
        "servers": servers,
        "cached_agents": state.cache.len().await,
    }))
}

async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let default_category = state.registry.default_category().await;

    let mut models_info: HashMap<String, Value> = HashMap::new();
    for model in state.registry.resolved_categories().await {
        models_info.insert(
            model.category.clone(),
            json!({
                "name": model.name,
                "type": if model.is_cloud() { "cloud" } else { "local" },
                "available": !model.is_cloud() || state.config.zai_api_key.is_some(),
                "is_default": model.category == default_category,
            }),
        );
    }

    Json(json!({
        "default_model": default_category,
        "models": models_info,
        "ollama_models": state.registry.ollama_models().await,
    }))
}

/// Render the last `max_turns` history turns as a plain transcript prefix.
pub fn build_prompt_with_history(
    message: &str,
    history: &[HistoryTurn],
    max_turns: usize,
) -> String {
    if history.is_empty() {
        return message.to_string();
    }

    let start = history.len().saturating_sub(max_turns);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|turn| {
            let role = if turn.role == "user" { "User" } else { "Assistant" };
            format!("{role}: {}", turn.content)
        })
        .collect();

    format!(
        "Previous conversation:\n{}\n\nCurrent message: {message}",
        lines.join("\n")
    )
}

/// Map model-resolution failures to response codes: credential and category
/// problems are the caller's (400); an empty resolution table is the service's
/// one fatal condition (503).
fn reject_model_error(err: ModelError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        ModelError::NoModelsResolvable => StatusCode::SERVICE_UNAVAILABLE,
        ModelError::OllamaUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ModelError::ModelUnavailable { .. } | ModelError::CredentialMissing { .. } => {
            StatusCode::BAD_REQUEST
        }
    };
    tracing::warn!(%err, "model resolution rejected");
    (status, Json(json!({"detail": err.to_string()})))
}

fn reject_agent_error(err: AgentError) -> (StatusCode, Json<Value>) {
    let status = match &err {
        AgentError::InvocationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!(%err, "agent invocation failed");
    (status, Json(json!({"detail": err.to_string()})))
}
