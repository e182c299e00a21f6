//! A named worker in the delegation tree.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock, Weak};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::agent::capabilities::{CapabilityProvider, ChildConfig};
use crate::context::InvocationContext;
use crate::error::DelegationError;
use crate::executor::{ChatTurn, Dispatcher, ExecutionRequest};
use crate::tools::ToolRegistry;
use crate::tools::builtin::delegation_tools;

/// Separator between segments of a qualified name.
pub const NAME_SEPARATOR: char = '/';

/// Messages kept in a node's conversation; oldest are dropped first.
pub const MAX_HISTORY_MESSAGES: usize = 50;

/// Collaborators shared by every node of one tree.
pub(crate) struct AgentRuntime {
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) capabilities: Arc<dyn CapabilityProvider>,
    /// Set once the root exists; qualified lookups start here.
    pub(crate) root: OnceLock<Weak<AgentNode>>,
}

impl AgentRuntime {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        capabilities: Arc<dyn CapabilityProvider>,
    ) -> Self {
        Self {
            dispatcher,
            capabilities,
            root: OnceLock::new(),
        }
    }

    fn root(&self) -> Option<Arc<AgentNode>> {
        self.root.get().and_then(Weak::upgrade)
    }
}

/// One agent: a system prompt, a tool registry, a conversation and
/// exclusively owned children.
pub struct AgentNode {
    qualified_name: String,
    local_name: String,
    system_prompt: String,
    tools: Arc<ToolRegistry>,
    /// Children keyed by local name, in creation order.
    children: RwLock<Vec<(String, Arc<AgentNode>)>>,
    conversation: Mutex<VecDeque<ChatTurn>>,
    runtime: Arc<AgentRuntime>,
}

impl AgentNode {
    /// Build a node with the delegation built-ins closed over itself and the
    /// host capabilities requested by `config`.
    pub(crate) fn build(
        qualified_name: String,
        local_name: String,
        config: &ChildConfig,
        runtime: Arc<AgentRuntime>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<AgentNode>| {
            let tools = ToolRegistry::new();
            for tool in delegation_tools(weak.clone()) {
                if let Err(e) = tools.register(tool) {
                    warn!(agent = %qualified_name, "Failed to register built-in: {e}");
                }
            }
            runtime
                .capabilities
                .install(&qualified_name, config, &tools);

            Self {
                qualified_name,
                local_name,
                system_prompt: config.system_prompt.clone(),
                tools: Arc::new(tools),
                children: RwLock::new(Vec::new()),
                conversation: Mutex::new(VecDeque::new()),
                runtime,
            }
        })
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Qualified names of the direct children, in creation order.
    pub async fn list_children(&self) -> Vec<String> {
        self.children
            .read()
            .await
            .iter()
            .map(|(_, child)| child.qualified_name.clone())
            .collect()
    }

    /// Local names of the direct children, in creation order.
    pub async fn child_names(&self) -> Vec<String> {
        self.children
            .read()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn child(&self, local_name: &str) -> Option<Arc<AgentNode>> {
        self.children
            .read()
            .await
            .iter()
            .find(|(name, _)| name == local_name)
            .map(|(_, child)| Arc::clone(child))
    }

    /// Create a child named `local_name`.
    ///
    /// Never fails: a taken name yields a warning string and keeps the
    /// existing child, an invalid name yields an error string.
    pub async fn create_child(&self, local_name: &str, config: ChildConfig) -> String {
        if let Err(e) = validate_local_name(local_name) {
            warn!(agent = %self.qualified_name, "{e}");
            return e.to_string();
        }
        let qualified = format!("{}{NAME_SEPARATOR}{local_name}", self.qualified_name);

        let mut children = self.children.write().await;
        if children.iter().any(|(name, _)| name == local_name) {
            let msg = DelegationError::DuplicateChild { name: qualified }.to_string();
            warn!(agent = %self.qualified_name, "{msg}");
            return msg;
        }

        let child = AgentNode::build(
            qualified.clone(),
            local_name.to_string(),
            &config,
            Arc::clone(&self.runtime),
        );
        children.push((local_name.to_string(), child));
        drop(children);

        info!(agent = %self.qualified_name, child = %qualified, "Created child agent");
        format!(
            "Agent '{qualified}' created successfully with system prompt: '{}'. \
             It can now be called using its name.",
            config.system_prompt
        )
    }

    /// Find the target of a delegation.
    ///
    /// A name without a separator is a child of this node; anything else is
    /// a qualified name looked up from the root.
    pub async fn resolve(&self, name: &str) -> Option<Arc<AgentNode>> {
        if name.contains(NAME_SEPARATOR) {
            let root = self.runtime.root()?;
            root.find(name).await
        } else {
            self.child(name).await
        }
    }

    /// Walk `qualified_name` downward from this node. The first segment must
    /// name this node. Returns `None` for this node itself.
    pub(crate) async fn find(&self, qualified_name: &str) -> Option<Arc<AgentNode>> {
        let mut segments = qualified_name.split(NAME_SEPARATOR);
        if segments.next()? != self.local_name {
            return None;
        }
        let mut current: Option<Arc<AgentNode>> = None;
        for segment in segments {
            let next = match &current {
                None => self.child(segment).await?,
                Some(node) => node.child(segment).await?,
            };
            current = Some(next);
        }
        current
    }

    /// Delegate `task` to another node and wait for its answer.
    ///
    /// A missing target is reported as a string, never as an error.
    pub async fn call_child(&self, name: &str, task: &str, ctx: &InvocationContext) -> String {
        let Some(target) = self.resolve(name).await else {
            let qualified = if name.contains(NAME_SEPARATOR) {
                name.to_string()
            } else {
                format!("{}{NAME_SEPARATOR}{name}", self.qualified_name)
            };
            let msg = DelegationError::TargetMissing {
                name: qualified,
                caller: self.qualified_name.clone(),
            }
            .to_string();
            warn!(agent = %self.qualified_name, "{msg}");
            return msg;
        };

        info!(
            agent = %self.qualified_name,
            target = %target.qualified_name,
            depth = ctx.depth + 1,
            "Delegating task"
        );
        target.invoke_self(task, ctx.delegated()).await
    }

    /// Run `task` as this node. Executor faults come back as
    /// `"Error in <name>: <reason>"`.
    pub async fn invoke_self(&self, task: &str, ctx: InvocationContext) -> String {
        let ctx = ctx.as_agent(self.qualified_name.clone());
        match self.runtime.dispatcher.execute(Some(self), task, ctx).await {
            Ok(output) => output,
            Err(e) => format!("Error in {}: {e}", self.qualified_name),
        }
    }

    /// Snapshot of everything the executor needs to run as this node.
    pub(crate) async fn execution_request(
        &self,
        prompt: &str,
        context: InvocationContext,
    ) -> ExecutionRequest {
        let history = self.conversation.lock().await.iter().cloned().collect();
        let context = if context.agent.is_none() {
            context.as_agent(self.qualified_name.clone())
        } else {
            context
        };
        ExecutionRequest {
            prompt: prompt.to_string(),
            system_prompt: Some(self.system_prompt.clone()),
            history,
            tools: Some(Arc::clone(&self.tools)),
            context,
        }
    }

    /// Append a completed exchange to the conversation.
    pub(crate) async fn record_turn(&self, prompt: &str, output: &str) {
        let mut conversation = self.conversation.lock().await;
        conversation.push_back(ChatTurn::user(prompt));
        conversation.push_back(ChatTurn::assistant(output));
        while conversation.len() > MAX_HISTORY_MESSAGES {
            conversation.pop_front();
        }
    }

    /// Current conversation, oldest first.
    pub async fn history(&self) -> Vec<ChatTurn> {
        self.conversation.lock().await.iter().cloned().collect()
    }
}

impl std::fmt::Debug for AgentNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentNode")
            .field("qualified_name", &self.qualified_name)
            .finish_non_exhaustive()
    }
}

pub(crate) fn validate_local_name(name: &str) -> Result<(), DelegationError> {
    let reason = if name.trim().is_empty() {
        "name must not be empty"
    } else if name.contains(NAME_SEPARATOR) {
        "name must not contain '/'"
    } else {
        return Ok(());
    };
    Err(DelegationError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}
