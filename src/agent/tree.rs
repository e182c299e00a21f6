//! The delegation tree: a root agent and everything below it.

use std::sync::Arc;

use crate::agent::capabilities::{CapabilityProvider, ChildConfig};
use crate::agent::node::{AgentNode, AgentRuntime, validate_local_name};
use crate::error::DelegationError;
use crate::executor::Dispatcher;

/// Owns the root agent and the collaborators its descendants share.
///
/// # Invariants
/// - Exactly one root; its qualified name is its local name.
/// - Every other node's qualified name is `parent + "/" + local`.
/// - Ownership is single-parent, so the structure has no cycles.
pub struct AgentTree {
    root: Arc<AgentNode>,
}

impl AgentTree {
    pub fn new(
        root_name: &str,
        config: ChildConfig,
        dispatcher: Arc<Dispatcher>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Result<Self, DelegationError> {
        validate_local_name(root_name)?;

        let runtime = Arc::new(AgentRuntime::new(dispatcher, capabilities));
        let root = AgentNode::build(
            root_name.to_string(),
            root_name.to_string(),
            &config,
            Arc::clone(&runtime),
        );
        // A fresh runtime has no root yet.
        let _ = runtime.root.set(Arc::downgrade(&root));

        tracing::info!(agent = %root_name, "Initialized root agent");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Arc<AgentNode> {
        &self.root
    }

    /// Look up any node by qualified name, the root included.
    pub async fn find(&self, qualified_name: &str) -> Option<Arc<AgentNode>> {
        if qualified_name == self.root.qualified_name() {
            return Some(Arc::clone(&self.root));
        }
        self.root.find(qualified_name).await
    }

    /// Qualified names of every node, depth-first in creation order.
    pub async fn qualified_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut stack = vec![Arc::clone(&self.root)];
        while let Some(node) = stack.pop() {
            names.push(node.qualified_name().to_string());
            let mut children = Vec::new();
            for local in node.child_names().await {
                if let Some(child) = node.child(&local).await {
                    children.push(child);
                }
            }
            stack.extend(children.into_iter().rev());
        }
        names
    }
}
