//! REST endpoints for submitting and inspecting tasks.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::service::{ApiError, NO_TASKS_PLACEHOLDER, TaskListing, TaskService};
use crate::error::JobError;
use crate::worker::state::parse_instant;

/// Shared state for the task routes.
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<TaskService>,
}

#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleTaskRequest {
    pub prompt: String,
    /// ISO-8601 instant; values without an offset are taken as UTC.
    pub scheduled_time: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Rejected(JobError::MalformedSchedule { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Rejected(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({"detail": self.to_string()}))).into_response()
    }
}

/// POST /process_task
async fn process_task(
    State(state): State<ApiState>,
    Json(req): Json<TaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.process_task(&req.prompt).await?))
}

/// POST /process_task_fire_and_forget
async fn process_task_fire_and_forget(
    State(state): State<ApiState>,
    Json(req): Json<TaskRequest>,
) -> impl IntoResponse {
    Json(state.service.process_task_fire_and_forget(&req.prompt))
}

/// POST /schedule_task
async fn schedule_task(
    State(state): State<ApiState>,
    Json(req): Json<ScheduleTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scheduled_time = parse_instant(&req.scheduled_time)?;
    let resp = state
        .service
        .schedule_task(&req.prompt, scheduled_time, Utc::now())
        .await?;
    Ok(Json(resp))
}

/// GET /view_tasks
///
/// Every stored job, or a single placeholder entry before the store exists.
async fn view_tasks(State(state): State<ApiState>) -> Response {
    match state.service.list_tasks().await {
        Ok(TaskListing::Tasks(rows)) => Json(rows).into_response(),
        Ok(TaskListing::Uninitialized) => {
            Json(serde_json::json!([{"message": NO_TASKS_PLACEHOLDER}])).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"detail": e.to_string()})),
        )
            .into_response(),
    }
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Build the task REST routes.
pub fn api_routes(service: Arc<TaskService>) -> Router {
    Router::new()
        .route("/process_task", post(process_task))
        .route(
            "/process_task_fire_and_forget",
            post(process_task_fire_and_forget),
        )
        .route("/schedule_task", post(schedule_task))
        .route("/view_tasks", get(view_tasks))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ApiState { service })
}
