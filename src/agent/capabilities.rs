//! Host-provided capabilities installed on agents at creation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tools::ToolRegistry;
use crate::tools::builtin::AskUserTool;

/// How a new agent should be set up.
///
/// `capabilities` names host capabilities to install next to the
/// delegation built-ins; this layer does not interpret them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildConfig {
    pub system_prompt: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl ChildConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, name: impl Into<String>) -> Self {
        self.capabilities.push(name.into());
        self
    }
}

/// Installs host capabilities into a freshly built registry.
///
/// Runs before the node is shared.
pub trait CapabilityProvider: Send + Sync {
    fn install(&self, node_name: &str, config: &ChildConfig, registry: &ToolRegistry);
}

/// Installs nothing beyond the built-ins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCapabilities;

impl CapabilityProvider for NoCapabilities {
    fn install(&self, _node_name: &str, _config: &ChildConfig, _registry: &ToolRegistry) {}
}

/// Capabilities offered by this server process.
#[derive(Debug, Clone)]
pub struct HostCapabilities {
    ask_user_answer: String,
}

impl HostCapabilities {
    pub const ASK_USER: &'static str = "ask_user";

    pub fn new(ask_user_answer: impl Into<String>) -> Self {
        Self {
            ask_user_answer: ask_user_answer.into(),
        }
    }
}

impl CapabilityProvider for HostCapabilities {
    fn install(&self, node_name: &str, config: &ChildConfig, registry: &ToolRegistry) {
        for capability in &config.capabilities {
            let result = match capability.as_str() {
                Self::ASK_USER => {
                    registry.register(Arc::new(AskUserTool::new(self.ask_user_answer.clone())))
                }
                other => {
                    tracing::warn!(agent = %node_name, "Unknown capability '{other}' ignored");
                    continue;
                }
            };
            if let Err(e) = result {
                tracing::warn!(agent = %node_name, "Failed to install {capability}: {e}");
            }
        }
    }
}
