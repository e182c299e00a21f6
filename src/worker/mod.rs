//! Worker system: job lifecycle and the scheduler loop.
//!
//! - `state`: Job record and state machine (Pending → Running → Completed/Failed)
//! - `scheduler`: timer-driven claim of due jobs, one task per job

pub mod scheduler;
pub mod state;

pub use scheduler::{Scheduler, spawn_scheduler};
pub use state::{Job, JobStatus};
