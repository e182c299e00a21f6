//! Tool abstraction for agent capabilities.

pub mod builtin;
pub mod registry;
pub mod tool;

pub use registry::{BUILTIN_TOOL_NAMES, ToolRegistry};
pub use tool::*;
