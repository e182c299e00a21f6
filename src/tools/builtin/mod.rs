//! Built-in tools: agent delegation and host capabilities.

mod ask_user;
mod delegation;

pub use ask_user::AskUserTool;
pub use delegation::{CallChildTool, CreateChildTool, ListChildrenTool, delegation_tools};
