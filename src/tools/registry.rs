//! Per-agent tool registry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use crate::context::InvocationContext;
use crate::executor::ToolDefinition;
use crate::tools::tool::{Tool, ToolError, ToolOutput};

/// Names of the delegation built-ins present on every agent.
pub const BUILTIN_TOOL_NAMES: &[&str] = &["list_children", "create_child", "call_child"];

/// Registry of the capabilities available to one agent.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    /// Registration order, for stable listings.
    order: RwLock<Vec<String>>,
    /// Tracks which names were registered as built-in (protected from removal).
    builtin_names: RwLock<HashSet<String>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            builtin_names: RwLock::new(HashSet::new()),
        }
    }

    /// Register a tool. Names are unique within a registry.
    ///
    /// Registration happens while a node is built, before the registry is
    /// shared, so the locks are taken without waiting.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        let (Ok(mut tools), Ok(mut order)) = (self.tools.try_write(), self.order.try_write())
        else {
            return Err(ToolError::ExecutionFailed(format!(
                "registry busy while registering {name}"
            )));
        };
        if tools.contains_key(&name) {
            tracing::warn!(tool = %name, "Rejected tool registration: name already taken");
            return Err(ToolError::Duplicate(name));
        }
        tools.insert(name.clone(), tool);
        order.push(name.clone());
        if BUILTIN_TOOL_NAMES.contains(&name.as_str())
            && let Ok(mut builtins) = self.builtin_names.try_write()
        {
            builtins.insert(name.clone());
        }
        tracing::debug!("Registered tool: {}", name);
        Ok(())
    }

    /// Unregister a tool. Built-ins cannot be removed.
    pub async fn unregister(&self, name: &str) -> Option<Arc<dyn Tool>> {
        if self.builtin_names.read().await.contains(name) {
            tracing::warn!(tool = %name, "Refusing to unregister a built-in tool");
            return None;
        }
        let removed = self.tools.write().await.remove(name);
        if removed.is_some() {
            self.order.write().await.retain(|n| n != name);
        }
        removed
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check if a tool exists.
    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// List all tool names in registration order.
    pub async fn list(&self) -> Vec<String> {
        self.order.read().await.clone()
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.try_read().map(|t| t.len()).unwrap_or(0)
    }

    /// Run a tool by name. The registry lock is not held while it runs.
    pub async fn execute(
        &self,
        name: &str,
        params: serde_json::Value,
        ctx: &InvocationContext,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .await
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        let start = Instant::now();
        let result = tool.execute(params, ctx).await;
        tracing::debug!(
            tool = %name,
            agent = ctx.agent.as_deref().unwrap_or("-"),
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Tool executed"
        );
        result
    }

    /// Get tool definitions for function calling, in registration order.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        self.order
            .read()
            .await
            .iter()
            .filter_map(|name| tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
