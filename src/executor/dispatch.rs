//! Executor dispatch: one executor invocation with uniform outcome capture.
//!
//! Used by the scheduler for stored jobs, by the request path for immediate
//! work, and by every agent node for its own invocations. Errors, timeouts
//! and panics all come back as `DispatchOutcome::error`; nothing escapes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::agent::AgentNode;
use crate::context::InvocationContext;
use crate::error::ExecutorError;
use crate::executor::{ExecutionRequest, Executor};

/// Result of one dispatch: exactly one of `result` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub result: Option<String>,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn success(result: String) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            result: None,
            error: Some(error),
        }
    }

    /// Convert into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<String, String> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.result.unwrap_or_default()),
        }
    }
}

/// Wraps the executor with timeout and fault capture.
pub struct Dispatcher {
    executor: Arc<dyn Executor>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            timeout: None,
        }
    }

    /// Bound every invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn executor_name(&self) -> &str {
        self.executor.name()
    }

    /// Run `prompt`, optionally as `node`, capturing the outcome.
    pub async fn invoke(
        &self,
        node: Option<&AgentNode>,
        prompt: &str,
        context: InvocationContext,
    ) -> DispatchOutcome {
        match self.execute(node, prompt, context).await {
            Ok(output) => DispatchOutcome::success(output),
            Err(e) => DispatchOutcome::failure(format!("Error processing task: {e}")),
        }
    }

    /// Same as [`Dispatcher::invoke`], keeping the typed error.
    ///
    /// With a node, the request carries its system prompt, a snapshot of its
    /// conversation and its tool registry, and a successful turn is appended
    /// to its conversation afterwards. No lock is held while the executor
    /// runs.
    pub async fn execute(
        &self,
        node: Option<&AgentNode>,
        prompt: &str,
        context: InvocationContext,
    ) -> Result<String, ExecutorError> {
        let request = match node {
            Some(node) => node.execution_request(prompt, context).await,
            None => ExecutionRequest::new(prompt, context),
        };
        let label = request.context.label();

        info!("{label} Executing: {}", truncate(prompt, 80));
        let start = Instant::now();

        match self.run(request).await {
            Ok(output) => {
                info!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "{label} Finished. Response: {}",
                    truncate(&output, 80)
                );
                if let Some(node) = node {
                    node.record_turn(prompt, &output).await;
                }
                Ok(output)
            }
            Err(e) => {
                error!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "{label} Error during execution: {e}"
                );
                Err(e)
            }
        }
    }

    async fn run(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        let executor = Arc::clone(&self.executor);
        let mut handle = tokio::spawn(async move { executor.execute(request).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(ExecutorError::Timeout(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(ExecutorError::Panicked(panic_message(e))),
            Err(e) => Err(ExecutorError::Failed(format!("executor task aborted: {e}"))),
        }
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
