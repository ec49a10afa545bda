use crate::collector::{CollectionSummary, Collector, Window};
use crate::config::Config;
use crate::error::CollectError;
use crate::tasks::{LastCollection, TaskRegistry, TaskStatus};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub collector: Arc<Collector>,
    pub tasks: TaskRegistry,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let collector = Arc::new(Collector::new(&config));
        Self {
            config: Arc::new(config),
            collector,
            tasks: TaskRegistry::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    pub channel_id: String,
    #[serde(default = "default_hours")]
    pub hours: u32,
    // Optional per-request credential overrides; absent fields fall back
    // to the server's environment configuration.
    pub discord_token: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuickQuery {
    /// Defaults to `COLLECTION_HOURS` from the environment.
    pub hours: Option<u32>,
    pub channel_id: Option<String>,
}

fn default_hours() -> u32 {
    1
}

#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CollectionSummary>,
}

/// Error envelope returned by every handler, `{"status": "error", ...}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({"status": "error", "message": self.message}));
        (self.status, body).into_response()
    }
}

impl From<CollectError> for ApiError {
    fn from(err: CollectError) -> Self {
        match err {
            CollectError::Window(_) => Self::bad_request(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    // CORS is permissive: collection requests come from dashboards on
    // arbitrary origins.
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/collect", post(collect))
        .route("/collect/sync", post(collect_sync))
        .route("/collect/quick", get(collect_quick))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{task_id}", get(task_status))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "running",
        "server_info": {
            "name": "vaultcord",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Collects Discord channel messages into Supabase",
        },
        "last_collection": state.tasks.last_collection(),
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let discord_token = !state.config.discord_token.is_empty();
    let supabase_url = !state.config.supabase_url.is_empty();
    let supabase_key = !state.config.supabase_key.is_empty();
    let default_channel_id = state.config.default_channel_id.is_some();
    let healthy = discord_token && supabase_url && supabase_key && default_channel_id;

    Json(json!({
        "status": if healthy { "healthy" } else { "partial" },
        "timestamp": Utc::now(),
        "env_vars_loaded": {
            "discord_token": discord_token,
            "supabase_url": supabase_url,
            "supabase_key": supabase_key,
            "default_channel_id": default_channel_id,
        },
    }))
}

/// Starts a collection in the background and returns a task id right away.
async fn collect(
    State(state): State<AppState>,
    Json(request): Json<CollectRequest>,
) -> Result<(StatusCode, Json<CollectResponse>), ApiError> {
    let window = validated_window(&request.channel_id, request.hours)?;

    let task_id = state.tasks.start(&request.channel_id, &window.to_string());
    let collector = collector_for(&state, &request);
    let tasks = state.tasks.clone();
    let channel_id = request.channel_id.clone();
    let background_id = task_id.clone();
    tokio::spawn(async move {
        run_collection_task(collector, tasks, background_id, channel_id, window).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(CollectResponse {
            status: "accepted".to_string(),
            message: format!("Collection started for channel {}", request.channel_id),
            task_id: Some(task_id),
            data: None,
        }),
    ))
}

/// Runs a collection inline and returns the summary.
async fn collect_sync(
    State(state): State<AppState>,
    Json(request): Json<CollectRequest>,
) -> Result<Json<CollectResponse>, ApiError> {
    let window = validated_window(&request.channel_id, request.hours)?;
    let collector = collector_for(&state, &request);
    run_sync(&state, &collector, &request.channel_id, window).await
}

/// Collection with the environment's default channel, driven by query
/// parameters only.
async fn collect_quick(
    State(state): State<AppState>,
    Query(query): Query<QuickQuery>,
) -> Result<Json<CollectResponse>, ApiError> {
    let window = Window::hours(query.hours.unwrap_or(state.config.collection_hours))?;
    let channel_id = query
        .channel_id
        .or_else(|| state.config.default_channel_id.clone())
        .ok_or_else(|| {
            ApiError::bad_request("channel_id is required (no DEFAULT_CHANNEL_ID configured)")
        })?;
    let collector = state.collector.clone();
    run_sync(&state, &collector, &channel_id, window).await
}

async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatus>, ApiError> {
    state
        .tasks
        .get(&task_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("task {} not found", task_id)))
}

async fn list_tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"tasks": state.tasks.snapshot()}))
}

fn validated_window(channel_id: &str, hours: u32) -> Result<Window, ApiError> {
    if channel_id.is_empty() {
        return Err(ApiError::bad_request("channel_id is required"));
    }
    Ok(Window::hours(hours)?)
}

/// A request carrying credential overrides gets its own short-lived
/// collector; otherwise the shared one is used.
fn collector_for(state: &AppState, request: &CollectRequest) -> Arc<Collector> {
    if request.discord_token.is_none()
        && request.supabase_url.is_none()
        && request.supabase_key.is_none()
    {
        return state.collector.clone();
    }

    let mut config = (*state.config).clone();
    if let Some(token) = &request.discord_token {
        config.discord_token = token.clone();
    }
    if let Some(url) = &request.supabase_url {
        config.supabase_url = url.clone();
    }
    if let Some(key) = &request.supabase_key {
        config.supabase_key = key.clone();
    }
    Arc::new(Collector::new(&config))
}

async fn run_sync(
    state: &AppState,
    collector: &Collector,
    channel_id: &str,
    window: Window,
) -> Result<Json<CollectResponse>, ApiError> {
    let summary = collector.collect(channel_id, window).await?;

    state.tasks.record_completion(LastCollection {
        channel_id: summary.channel_id.clone(),
        window: summary.window.clone(),
        timestamp: summary.timestamp,
        execution_time: summary.execution_time.clone(),
        status: "completed".to_string(),
    });

    Ok(Json(CollectResponse {
        status: "completed".to_string(),
        message: format!(
            "Saved {} messages from channel {}",
            summary.messages_saved, summary.channel_id
        ),
        task_id: None,
        data: Some(summary),
    }))
}

async fn run_collection_task(
    collector: Arc<Collector>,
    tasks: TaskRegistry,
    task_id: String,
    channel_id: String,
    window: Window,
) {
    tasks.mark_running(&task_id);
    match collector.collect(&channel_id, window).await {
        Ok(summary) => {
            tasks.complete(&task_id, summary.messages_saved, &summary.execution_time);
        }
        Err(e) => {
            error!("Background collection {} failed: {}", task_id, e);
            tasks.fail(&task_id, &e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            discord_token: "test-token".to_string(),
            supabase_url: "http://localhost:9".to_string(),
            supabase_key: "service-key".to_string(),
            supabase_table: "discord_messages".to_string(),
            default_channel_id: Some("42".to_string()),
            api_host: "127.0.0.1".to_string(),
            api_port: 0,
            collection_hours: 1,
            collection_days: 1,
            fetch_page_limit: 100,
            upsert_batch_size: 50,
        }
    }

    fn request(overrides: bool) -> CollectRequest {
        CollectRequest {
            channel_id: "42".to_string(),
            hours: 1,
            discord_token: overrides.then(|| "other-token".to_string()),
            supabase_url: None,
            supabase_key: None,
        }
    }

    #[test]
    fn window_validation_rejects_bad_input() {
        assert!(validated_window("", 1).is_err());
        assert!(validated_window("42", 0).is_err());
        assert!(validated_window("42", 25).is_err());
        assert!(validated_window("42", 24).is_ok());
    }

    #[test]
    fn shared_collector_reused_without_overrides() {
        let state = AppState::new(test_config());
        let shared = collector_for(&state, &request(false));
        assert!(Arc::ptr_eq(&shared, &state.collector));

        let overridden = collector_for(&state, &request(true));
        assert!(!Arc::ptr_eq(&overridden, &state.collector));
    }

    #[test]
    fn request_hours_defaults_to_one() {
        let request: CollectRequest =
            serde_json::from_str(r#"{"channel_id": "42"}"#).unwrap();
        assert_eq!(request.hours, 1);
        assert!(request.discord_token.is_none());
    }

    #[test]
    fn collect_response_omits_empty_fields() {
        let response = CollectResponse {
            status: "accepted".to_string(),
            message: "ok".to_string(),
            task_id: Some("task_1".to_string()),
            data: None,
        };
        let encoded = serde_json::to_string(&response).unwrap();
        assert!(encoded.contains("task_1"));
        assert!(!encoded.contains("data"));
    }

    #[test]
    fn window_errors_map_to_bad_request() {
        let err: ApiError = Window::hours(99).unwrap_err().into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
