//! `JobStore` trait: the durable job table behind the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::worker::state::{Job, JobStatus};

/// Terminal outcome recorded by `finalize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(String),
    Failed(String),
}

impl JobOutcome {
    /// Build an outcome from a dispatch `(result, error)` pair.
    pub fn from_dispatch(result: Option<String>, error: Option<String>) -> Self {
        match error {
            Some(e) => Self::Failed(e),
            None => Self::Completed(result.unwrap_or_default()),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed(_) => JobStatus::Completed,
            Self::Failed(_) => JobStatus::Failed,
        }
    }
}

/// Backend-agnostic job store.
///
/// Implementations serialize all mutating operations so that a claim and a
/// finalize can never interleave their read-modify-write.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Pending` job and return its id.
    async fn append(&self, prompt: &str, scheduled_time: DateTime<Utc>)
    -> Result<Uuid, StoreError>;

    /// Every record in insertion order.
    async fn scan_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Replace the entire contents with `jobs`, in the given order.
    async fn rewrite_all(&self, jobs: &[Job]) -> Result<(), StoreError>;

    /// Mark every due `Pending` job `Running` and return copies of them in
    /// scan order. Pending jobs with an unparseable schedule are moved to
    /// `Failed` in the same pass and are not returned.
    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>, StoreError>;

    /// Record a terminal outcome for a `Running` job.
    ///
    /// Returns `false` (and logs) when the id is absent or the job is not
    /// running.
    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, StoreError>;

    /// Whether the backing table has been created.
    async fn is_initialized(&self) -> Result<bool, StoreError>;
}
