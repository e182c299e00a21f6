//! Scheduler loop: claims due jobs and runs each in its own task.
//!
//! Every cycle asks the store for due jobs, spawns one unit per claimed job
//! and goes back to sleep without waiting for them. A unit dispatches the
//! prompt and records the terminal outcome. A failing cycle is logged and
//! the next tick tries again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::agent::AgentNode;
use crate::config::SchedulerConfig;
use crate::context::InvocationContext;
use crate::error::StoreError;
use crate::executor::Dispatcher;
use crate::executor::dispatch::truncate;
use crate::store::{JobOutcome, JobStore};
use crate::worker::state::Job;

/// Drives stored jobs through `Pending -> Running -> Completed | Failed`.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<Dispatcher>,
    /// Agent the jobs run as; `None` dispatches bare prompts.
    target: Option<Arc<AgentNode>>,
    config: SchedulerConfig,
    permits: Option<Arc<Semaphore>>,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        let permits = config
            .max_concurrent_jobs
            .map(|max| Arc::new(Semaphore::new(max.max(1))));
        Self {
            store,
            dispatcher,
            target: None,
            config,
            permits,
            tracker: TaskTracker::new(),
        }
    }

    /// Run every job as `node`.
    pub fn with_target(mut self, node: Arc<AgentNode>) -> Self {
        self.target = Some(node);
        self
    }

    /// Number of job units still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// One cycle: claim what is due at `now` and start a unit per job.
    ///
    /// Returns the number of jobs started.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let claimed = self.store.claim_due(now).await?;
        let count = claimed.len();
        for job in claimed {
            info!(
                job_id = %job.id,
                "Processing due task: \"{}\"",
                truncate(&job.prompt, 50)
            );
            self.spawn_job(job);
        }
        Ok(count)
    }

    fn spawn_job(&self, job: Job) {
        let store = Arc::clone(&self.store);
        let dispatcher = Arc::clone(&self.dispatcher);
        let target = self.target.clone();
        let permits = self.permits.clone();

        self.tracker.spawn(async move {
            // Closed semaphores never happen here; treat it as unbounded.
            let _permit = match permits {
                Some(permits) => permits.acquire_owned().await.ok(),
                None => None,
            };
            run_job(store.as_ref(), &dispatcher, target.as_deref(), job).await;
        });
    }

    /// Tick until `cancel` fires, then wait for in-flight units.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            poll_secs = self.config.poll_interval.as_secs(),
            max_concurrent = ?self.config.max_concurrent_jobs,
            "Scheduler loop started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now = Utc::now();
                    debug!("Scheduler woke up at {}", now.to_rfc3339());
                    match self.run_cycle(now).await {
                        Ok(0) => debug!("No due tasks this cycle"),
                        Ok(n) => info!("Started {n} due task(s)"),
                        Err(e) => error!("Scheduler cycle failed: {e}"),
                    }
                }
            }
        }

        self.shutdown().await;
    }

    /// Stop accepting units and wait for the running ones, up to the
    /// configured grace period.
    async fn shutdown(&self) {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!("Waiting for {pending} in-flight task(s)");
        }
        if tokio::time::timeout(self.config.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.tracker.len(),
                "Shutdown grace elapsed; abandoning in-flight tasks (they stay RUNNING)"
            );
        }
        info!("Scheduler stopped");
    }

    /// Wait for every unit started so far.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

async fn run_job(store: &dyn JobStore, dispatcher: &Dispatcher, target: Option<&AgentNode>, job: Job) {
    let outcome = dispatcher
        .invoke(target, &job.prompt, InvocationContext::for_job(job.id))
        .await;
    let outcome = JobOutcome::from_dispatch(outcome.result, outcome.error);

    match store.finalize(job.id, &outcome).await {
        Ok(true) => info!(job_id = %job.id, status = %outcome.status(), "Task finalized"),
        Ok(false) => warn!(job_id = %job.id, "Task outcome not recorded"),
        Err(e) => error!(job_id = %job.id, "Failed to record task outcome: {e}"),
    }
}

/// Run `scheduler` in the background until `cancel` fires.
pub fn spawn_scheduler(scheduler: Arc<Scheduler>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move { scheduler.run(cancel).await })
}
