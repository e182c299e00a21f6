//! The executor boundary.
//!
//! An `Executor` turns a prompt into a result or an error. Everything behind
//! it (model calls, tool-use loops) is opaque to the scheduler and the
//! delegation tree, which only ever reach it through the `Dispatcher`.

mod anthropic;
pub mod dispatch;
mod echo;
pub(crate) mod retry;

pub use anthropic::AnthropicExecutor;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use echo::EchoExecutor;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::InvocationContext;
use crate::error::ExecutorError;
use crate::tools::ToolRegistry;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of an agent's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Function-calling description of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Everything an executor needs for one invocation.
#[derive(Clone)]
pub struct ExecutionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Prior turns of the invoking agent, oldest first.
    pub history: Vec<ChatTurn>,
    /// Capability surface of the invoking agent.
    pub tools: Option<Arc<ToolRegistry>>,
    pub context: InvocationContext,
}

impl ExecutionRequest {
    /// A bare request with no agent attached.
    pub fn new(prompt: impl Into<String>, context: InvocationContext) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            history: Vec::new(),
            tools: None,
            context,
        }
    }
}

impl std::fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("prompt", &self.prompt)
            .field("system_prompt", &self.system_prompt)
            .field("history_len", &self.history.len())
            .field("has_tools", &self.tools.is_some())
            .field("context", &self.context)
            .finish()
    }
}

/// The opaque prompt-to-result collaborator.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn execute(&self, request: ExecutionRequest) -> Result<String, ExecutorError>;
}
