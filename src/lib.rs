//! Taskforge: persistent task scheduler and agent delegation tree.

pub mod agent;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod store;
pub mod tools;
pub mod worker;

pub use error::{Error, Result};
