//! Delegation built-ins: `list_children`, `create_child`, `call_child`.
//!
//! Each tool holds a weak reference to the agent that owns it, so a call
//! always operates on that agent's children. The reference is weak because
//! the agent owns the registry the tool lives in.

use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;

use crate::agent::{AgentNode, ChildConfig};
use crate::context::InvocationContext;
use crate::error::DelegationError;
use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// The three built-ins, bound to `owner`.
pub fn delegation_tools(owner: Weak<AgentNode>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListChildrenTool {
            owner: owner.clone(),
        }),
        Arc::new(CreateChildTool {
            owner: owner.clone(),
        }),
        Arc::new(CallChildTool { owner }),
    ]
}

fn upgrade(owner: &Weak<AgentNode>, ctx: &InvocationContext) -> Result<Arc<AgentNode>, ToolError> {
    owner.upgrade().ok_or_else(|| {
        ToolError::ExecutionFailed(
            DelegationError::Detached {
                name: ctx.agent.clone().unwrap_or_default(),
            }
            .to_string(),
        )
    })
}

/// Lists the owner's direct children.
pub struct ListChildrenTool {
    owner: Weak<AgentNode>,
}

#[async_trait]
impl Tool for ListChildrenTool {
    fn name(&self) -> &str {
        "list_children"
    }

    fn description(&self) -> &str {
        "Lists the qualified names of all sub-agents you have created and can call \
         for specialized tasks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let node = upgrade(&self.owner, ctx)?;
        let children = node.list_children().await;
        Ok(ToolOutput::success(
            serde_json::json!(children),
            start.elapsed(),
        ))
    }
}

/// Creates a child of the owner.
pub struct CreateChildTool {
    owner: Weak<AgentNode>,
}

#[async_trait]
impl Tool for CreateChildTool {
    fn name(&self) -> &str {
        "create_child"
    }

    fn description(&self) -> &str {
        "Creates a new specialized sub-agent. Use this when a distinct expertise is needed \
         that no existing sub-agent covers. Give it a unique 'name' (no '/') and a \
         'system_prompt' defining its role. Example: name='MathExpert', \
         system_prompt='You are an expert in calculus and algebra.'"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Local name of the new sub-agent"
                },
                "system_prompt": {
                    "type": "string",
                    "description": "Role and expertise of the new sub-agent"
                },
                "capabilities": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional host capabilities to grant (e.g. ask_user)"
                }
            },
            "required": ["name", "system_prompt"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let name = require_str(&params, "name")?;
        let system_prompt = require_str(&params, "system_prompt")?;
        let capabilities = params
            .get("capabilities")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|c| c.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let node = upgrade(&self.owner, ctx)?;
        let message = node
            .create_child(
                name,
                ChildConfig {
                    system_prompt: system_prompt.to_string(),
                    capabilities,
                },
            )
            .await;
        Ok(ToolOutput::text(message, start.elapsed()))
    }
}

/// Delegates a task to a child (by local name) or to any node (by
/// qualified name) and returns its answer.
pub struct CallChildTool {
    owner: Weak<AgentNode>,
}

#[async_trait]
impl Tool for CallChildTool {
    fn name(&self) -> &str {
        "call_child"
    }

    fn description(&self) -> &str {
        "Delegates 'task' to the sub-agent identified by 'name' and waits for its answer. \
         A plain name refers to one of your own sub-agents; a name containing '/' is a \
         full path from the root agent. Make sure the sub-agent exists first \
         (see list_children)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Local or fully qualified name of the sub-agent"
                },
                "task": {
                    "type": "string",
                    "description": "Detailed task for the sub-agent"
                }
            },
            "required": ["name", "task"]
        })
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let name = require_str(&params, "name")?;
        let task = require_str(&params, "task")?;

        let node = upgrade(&self.owner, ctx)?;
        let answer = node.call_child(name, task, ctx).await;
        Ok(ToolOutput::text(answer, start.elapsed()))
    }
}
