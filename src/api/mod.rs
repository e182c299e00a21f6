//! HTTP request path: submit, schedule and list tasks.

pub mod routes;
pub mod service;

pub use routes::api_routes;
pub use service::{AgentResponse, ApiError, TaskListing, TaskRow, TaskService};
