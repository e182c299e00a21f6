//! Agent module: the delegation tree of named workers.
//!
//! - `node`: a single agent with its tools, children and conversation
//! - `tree`: the root agent and qualified-name lookup
//! - `capabilities`: host capabilities installed at creation

mod capabilities;
mod node;
mod tree;

pub use capabilities::{CapabilityProvider, ChildConfig, HostCapabilities, NoCapabilities};
pub use node::{AgentNode, MAX_HISTORY_MESSAGES, NAME_SEPARATOR};
pub use tree::AgentTree;
