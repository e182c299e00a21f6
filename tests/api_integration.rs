//! Drives the HTTP router in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Value, json};
use taskforge::api::{TaskService, api_routes};
use taskforge::executor::{Dispatcher, EchoExecutor};
use taskforge::store::{JobStore, LibSqlJobStore};
use tower::ServiceExt;

async fn app() -> (axum::Router, Arc<LibSqlJobStore>) {
    let store = Arc::new(LibSqlJobStore::new_memory().await.unwrap());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(EchoExecutor)));
    let service = Arc::new(TaskService::new(store.clone(), dispatcher));
    (api_routes(service), store)
}

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (app, _) = app().await;
    let (status, body) = send(app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn process_task_waits_for_output() {
    let (app, _) = app().await;
    let (status, body) = send(app, "POST", "/process_task", Some(json!({"prompt": "ping"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["agent_output"], "Processed: 'ping'");
    assert!(body.get("task_id").is_none());
}

#[tokio::test]
async fn fire_and_forget_returns_task_id() {
    let (app, _) = app().await;
    let (status, body) = send(
        app,
        "POST",
        "/process_task_fire_and_forget",
        Some(json!({"prompt": "later"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "submitted");
    assert!(body["task_id"].as_str().is_some());
}

#[tokio::test]
async fn past_schedule_is_rejected_and_not_stored() {
    let (app, store) = app().await;
    let past = (Utc::now() - ChronoDuration::hours(1)).to_rfc3339();
    let (status, body) = send(
        app,
        "POST",
        "/schedule_task",
        Some(json!({"prompt": "too late", "scheduled_time": past})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Scheduled time must be in the future.");
    assert!(store.scan_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn unparseable_schedule_is_unprocessable() {
    let (app, store) = app().await;
    let (status, body) = send(
        app,
        "POST",
        "/schedule_task",
        Some(json!({"prompt": "x", "scheduled_time": "tomorrow-ish"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("tomorrow-ish"));
    assert!(store.scan_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn scheduled_task_shows_up_in_view() {
    let (app, _) = app().await;

    // Naive timestamps are taken as UTC.
    let future = (Utc::now() + ChronoDuration::hours(1))
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();
    let (status, body) = send(
        app.clone(),
        "POST",
        "/schedule_task",
        Some(json!({"prompt": "weekly report", "scheduled_time": future})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "scheduled");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let (status, rows) = send(app, "GET", "/view_tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], task_id);
    assert_eq!(rows[0]["prompt"], "weekly report");
    assert_eq!(rows[0]["status"], "PENDING");
    assert_eq!(rows[0]["result"], "");
    assert!(rows[0]["scheduled_time_iso"].as_str().unwrap().ends_with("+00:00"));
}
