//! Offline executor used when no model credentials are configured.

use async_trait::async_trait;

use crate::error::ExecutorError;
use crate::executor::{ExecutionRequest, Executor};

/// Acknowledges every prompt without calling a model.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError> {
        Ok(format!("Processed: '{}'", request.prompt))
    }
}
