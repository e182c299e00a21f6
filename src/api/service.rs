//! Request-path operations, independent of the HTTP transport.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::agent::AgentNode;
use crate::context::InvocationContext;
use crate::error::{JobError, StoreError};
use crate::executor::Dispatcher;
use crate::executor::dispatch::truncate;
use crate::store::JobStore;
use crate::worker::state::Job;

/// Shown by `list_tasks` before the job table exists.
pub const NO_TASKS_PLACEHOLDER: &str = "No task store found, or no tasks scheduled yet.";

/// Body returned by the submit operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
}

/// One stored job, column for column as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub prompt: String,
    pub scheduled_time_iso: String,
    pub status: String,
    pub created_at_iso: String,
    pub result: String,
    pub error_message: String,
}

impl From<&Job> for TaskRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            prompt: job.prompt.clone(),
            scheduled_time_iso: job.scheduled_time_iso.clone(),
            status: job.status.as_str().to_string(),
            created_at_iso: job.created_at_iso.clone(),
            result: job.result.clone().unwrap_or_default(),
            error_message: job.error_message.clone().unwrap_or_default(),
        }
    }
}

/// Result of `list_tasks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskListing {
    /// The store has never been initialized.
    Uninitialized,
    Tasks(Vec<TaskRow>),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Rejected(#[from] JobError),

    #[error("Failed to schedule task: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Execution(String),
}

/// The four request-path operations.
pub struct TaskService {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    target: Option<Arc<AgentNode>>,
    background: TaskTracker,
}

impl TaskService {
    pub fn new(store: Arc<dyn JobStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            target: None,
            background: TaskTracker::new(),
        }
    }

    /// Run immediate and background work as `node`.
    pub fn with_target(mut self, node: Arc<AgentNode>) -> Self {
        self.target = Some(node);
        self
    }

    /// Run `prompt` now and wait for the answer.
    pub async fn process_task(&self, prompt: &str) -> Result<AgentResponse, ApiError> {
        info!("Received request for immediate processing: {}", truncate(prompt, 80));
        let outcome = self
            .dispatcher
            .invoke(self.target.as_deref(), prompt, InvocationContext::default())
            .await;
        match outcome.into_result() {
            Ok(output) => Ok(AgentResponse {
                status: "completed".to_string(),
                message: "Agent processing finished.".to_string(),
                agent_output: Some(output),
                task_id: None,
            }),
            Err(e) => Err(ApiError::Execution(e)),
        }
    }

    /// Start `prompt` in the background and return its id immediately.
    ///
    /// The outcome is only visible in the logs.
    pub fn process_task_fire_and_forget(&self, prompt: &str) -> AgentResponse {
        let task_id = Uuid::new_v4();
        info!(task_id = %task_id, "Received fire-and-forget request: {}", truncate(prompt, 80));

        let dispatcher = Arc::clone(&self.dispatcher);
        let target = self.target.clone();
        let prompt = prompt.to_string();
        self.background.spawn(async move {
            let outcome = dispatcher
                .invoke(target.as_deref(), &prompt, InvocationContext::for_job(task_id))
                .await;
            match outcome.into_result() {
                Ok(output) => info!(
                    task_id = %task_id,
                    "Background task completed. Result: {}",
                    truncate(&output, 50)
                ),
                Err(e) => warn!(task_id = %task_id, "Background task failed: {e}"),
            }
        });

        AgentResponse {
            status: "submitted".to_string(),
            message: "Task submitted for background processing. Check server logs for completion."
                .to_string(),
            agent_output: None,
            task_id: Some(task_id),
        }
    }

    /// Store `prompt` for execution at `scheduled_time`.
    ///
    /// Instants not strictly after `now` are rejected before anything is
    /// written.
    pub async fn schedule_task(
        &self,
        prompt: &str,
        scheduled_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<AgentResponse, ApiError> {
        if scheduled_time <= now {
            return Err(JobError::ScheduleInPast.into());
        }
        let task_id = self.store.append(prompt, scheduled_time).await.map_err(|e| {
            error!("Error scheduling task: {e}");
            e
        })?;
        info!(job_id = %task_id, "Task scheduled for {}", scheduled_time.to_rfc3339());
        Ok(AgentResponse {
            status: "scheduled".to_string(),
            message: format!(
                "Task scheduled successfully for {}.",
                scheduled_time.to_rfc3339()
            ),
            agent_output: None,
            task_id: Some(task_id),
        })
    }

    /// Every stored job, in insertion order.
    pub async fn list_tasks(&self) -> Result<TaskListing, StoreError> {
        if !self.store.is_initialized().await? {
            return Ok(TaskListing::Uninitialized);
        }
        let jobs = self.store.scan_all().await?;
        Ok(TaskListing::Tasks(jobs.iter().map(TaskRow::from).collect()))
    }

    /// Wait for background work, up to `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        self.background.close();
        if tokio::time::timeout(grace, self.background.wait()).await.is_err() {
            warn!(
                remaining = self.background.len(),
                "Abandoning unfinished background tasks"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::agent::{AgentTree, ChildConfig, NoCapabilities};
    use crate::error::ExecutorError;
    use crate::executor::{EchoExecutor, ExecutionRequest, Executor};
    use crate::store::LibSqlJobStore;

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Executor for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.prompt == "fail" {
                return Err(ExecutorError::Failed("no luck".into()));
            }
            Ok(format!("ok: {}", request.prompt))
        }
    }

    async fn service() -> (Arc<LibSqlJobStore>, TaskService, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(LibSqlJobStore::new_memory().await.unwrap());
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(Counting {
            calls: Arc::clone(&calls),
        })));
        (store.clone(), TaskService::new(store, dispatcher), calls)
    }

    #[tokio::test]
    async fn process_task_returns_output_or_error() {
        let (_, service, _) = service().await;
        let ok = service.process_task("hi").await.unwrap();
        assert_eq!(ok.status, "completed");
        assert_eq!(ok.agent_output.as_deref(), Some("ok: hi"));

        let err = service.process_task("fail").await.unwrap_err();
        assert!(matches!(err, ApiError::Execution(ref m) if m.contains("no luck")));
    }

    #[tokio::test]
    async fn fire_and_forget_returns_immediately_and_runs() {
        let (store, service, calls) = service().await;
        let resp = service.process_task_fire_and_forget("later");
        assert_eq!(resp.status, "submitted");
        assert!(resp.task_id.is_some());

        service.shutdown(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Background work is not a stored job.
        assert!(store.scan_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn past_schedule_is_rejected_before_append() {
        let (store, service, _) = service().await;
        let now = Utc::now();

        let err = service
            .schedule_task("too late", now - ChronoDuration::seconds(5), now)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Scheduled time must be in the future.");

        let err = service.schedule_task("exactly now", now, now).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(JobError::ScheduleInPast)));

        assert!(store.scan_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn future_schedule_is_appended() {
        let (store, service, calls) = service().await;
        let now = Utc::now();
        let resp = service
            .schedule_task("report", now + ChronoDuration::minutes(10), now)
            .await
            .unwrap();
        assert_eq!(resp.status, "scheduled");

        let jobs = store.scan_all().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(Some(jobs[0].id), resp.task_id);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn list_tasks_mirrors_the_store() {
        let (_, service, _) = service().await;
        assert_eq!(service.list_tasks().await.unwrap(), TaskListing::Tasks(vec![]));

        let now = Utc::now();
        service
            .schedule_task("a", now + ChronoDuration::minutes(1), now)
            .await
            .unwrap();
        let TaskListing::Tasks(rows) = service.list_tasks().await.unwrap() else {
            panic!("store is initialized");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "PENDING");
        assert_eq!(rows[0].result, "");
        assert_eq!(rows[0].error_message, "");
    }

    #[tokio::test]
    async fn target_agent_receives_immediate_work() {
        let store = Arc::new(LibSqlJobStore::new_memory().await.unwrap());
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(EchoExecutor)));
        let tree = AgentTree::new(
            "Root",
            ChildConfig::new("root"),
            Arc::clone(&dispatcher),
            Arc::new(NoCapabilities),
        )
        .unwrap();
        let service = TaskService::new(store, dispatcher).with_target(Arc::clone(tree.root()));

        service.process_task("hello").await.unwrap();
        assert_eq!(tree.root().history().await.len(), 2);
    }
}
