//! Error types for taskforge.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Delegation error: {0}")]
    Delegation(#[from] DelegationError),

    #[error("Tool error: {0}")]
    Tool(#[from] crate::tools::ToolError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Job store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the durable store failed. The scheduler retries on
    /// its next cycle.
    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt row in job store: {0}")]
    CorruptRow(String),
}

/// Job lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Invalid scheduled_time format '{value}': {reason}")]
    MalformedSchedule { value: String, reason: String },

    #[error("Job {id} already in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: Uuid,
        state: String,
        target: String,
    },

    #[error("Scheduled time must be in the future.")]
    ScheduleInPast,
}

/// Failures surfaced by the opaque executor.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Executor request failed: {0}")]
    RequestFailed(String),

    #[error("Executor rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Invalid executor response: {0}")]
    InvalidResponse(String),

    #[error("Executor timed out after {0:?}")]
    Timeout(Duration),

    #[error("Executor panicked: {0}")]
    Panicked(String),

    #[error("Tool loop exceeded {max} rounds")]
    TooManyToolRounds { max: usize },

    #[error("{0}")]
    Failed(String),
}

impl ExecutorError {
    /// Whether a retry with backoff could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::RequestFailed(_))
    }
}

/// Delegation-tree conditions. These are rendered into strings by the node
/// layer and never escape as failures.
#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("Error: agent '{name}' not found (called from '{caller}').")]
    TargetMissing { name: String, caller: String },

    #[error("Warning: agent '{name}' already exists. Returning existing instance.")]
    DuplicateChild { name: String },

    #[error("Error: invalid agent name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Error: agent '{name}' is no longer reachable.")]
    Detached { name: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
