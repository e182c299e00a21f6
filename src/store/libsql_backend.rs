//! libSQL backend: async `JobStore` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations, and every operation takes the store lock so
//! claim, finalize and rewrite never interleave.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::IntoParams;
use libsql::{Connection, Database as LibSqlDatabase, Row, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::migrations;
use crate::store::traits::{JobOutcome, JobStore};
use crate::worker::state::{Job, JobStatus};

const JOB_SELECT: &str = "SELECT id, prompt, scheduled_time_iso, status, created_at_iso, result, error_message FROM jobs";

/// libSQL job store.
pub struct LibSqlJobStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    lock: Mutex<()>,
}

impl LibSqlJobStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Job store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            lock: Mutex::new(()),
        })
    }

    async fn select_jobs(
        conn: &Connection,
        filter: &str,
        params: impl IntoParams,
        op: &str,
    ) -> Result<Vec<Job>, StoreError> {
        let sql = format!("{JOB_SELECT} {filter} ORDER BY rowid");
        let mut rows = conn
            .query(&sql, params)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{op}: {e}")))?;

        let mut jobs = Vec::new();
        loop {
            let row = rows
                .next()
                .await
                .map_err(|e| StoreError::Unavailable(format!("{op}: {e}")))?;
            let Some(row) = row else { break };
            match row_to_job(&row) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!("Skipping job row: {e}"),
            }
        }
        Ok(jobs)
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn row_to_job(row: &Row) -> Result<Job, StoreError> {
    let text = |idx: i32| -> Result<String, StoreError> {
        row.get::<String>(idx)
            .map_err(|e| StoreError::CorruptRow(format!("column {idx}: {e}")))
    };

    let id_str = text(0)?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| StoreError::CorruptRow(format!("invalid id '{id_str}': {e}")))?;
    let status_str = text(3)?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|e| StoreError::CorruptRow(format!("job {id}: {e}")))?;

    Ok(Job {
        id,
        prompt: text(1)?,
        scheduled_time_iso: text(2)?,
        status,
        created_at_iso: text(4)?,
        // Terminal fields follow the status, so an empty result is still a result.
        result: (status == JobStatus::Completed).then(|| text(5)).transpose()?,
        error_message: (status == JobStatus::Failed).then(|| text(6)).transpose()?,
    })
}

/// Rowids of the rows `row_to_job` can decode.
async fn decodable_rowids(conn: &Connection) -> Result<Vec<i64>, StoreError> {
    let mut rows = conn
        .query(
            "SELECT id, prompt, scheduled_time_iso, status, created_at_iso, result, error_message, rowid FROM jobs ORDER BY rowid",
            (),
        )
        .await
        .map_err(|e| StoreError::Unavailable(format!("rewrite_all scan: {e}")))?;

    let mut rowids = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| StoreError::Unavailable(format!("rewrite_all scan: {e}")))?
    {
        if row_to_job(&row).is_ok() {
            let rowid = row
                .get::<i64>(7)
                .map_err(|e| StoreError::CorruptRow(format!("rowid: {e}")))?;
            rowids.push(rowid);
        }
    }
    Ok(rowids)
}

async fn insert_job(conn: &Connection, job: &Job) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO jobs (id, prompt, scheduled_time_iso, status, created_at_iso, result, error_message) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            job.id.to_string(),
            job.prompt.clone(),
            job.scheduled_time_iso.clone(),
            job.status.as_str(),
            job.created_at_iso.clone(),
            job.result.clone().unwrap_or_default(),
            job.error_message.clone().unwrap_or_default(),
        ],
    )
    .await
    .map_err(|e| StoreError::Unavailable(format!("insert job {}: {e}", job.id)))?;
    Ok(())
}

#[async_trait]
impl JobStore for LibSqlJobStore {
    async fn append(
        &self,
        prompt: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<Uuid, StoreError> {
        let _guard = self.lock.lock().await;
        let job = Job::new(prompt, scheduled_time);
        insert_job(&self.conn, &job).await?;
        info!(job_id = %job.id, scheduled_time = %job.scheduled_time_iso, "Job appended");
        Ok(job.id)
    }

    async fn scan_all(&self) -> Result<Vec<Job>, StoreError> {
        let _guard = self.lock.lock().await;
        Self::select_jobs(&self.conn, "", (), "scan_all").await
    }

    async fn rewrite_all(&self, jobs: &[Job]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StoreError::Unavailable(format!("rewrite_all begin: {e}")))?;

        // Rows that cannot be decoded never show up in a scan, so they are
        // left in place instead of being dropped with the rest.
        for rowid in decodable_rowids(&tx).await? {
            tx.execute("DELETE FROM jobs WHERE rowid = ?1", params![rowid])
                .await
                .map_err(|e| StoreError::Unavailable(format!("rewrite_all clear: {e}")))?;
        }
        for job in jobs {
            insert_job(&tx, job).await?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Unavailable(format!("rewrite_all commit: {e}")))?;
        debug!(count = jobs.len(), "Job store rewritten");
        Ok(())
    }

    async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<Job>, StoreError> {
        let _guard = self.lock.lock().await;
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| StoreError::Unavailable(format!("claim_due begin: {e}")))?;

        let pending = Self::select_jobs(&tx, "WHERE status = 'PENDING'", (), "claim_due").await?;

        let mut claimed = Vec::new();
        let mut modified = false;
        for mut job in pending {
            match job.is_due(now) {
                Ok(true) => {
                    tx.execute(
                        "UPDATE jobs SET status = 'RUNNING' WHERE id = ?1 AND status = 'PENDING'",
                        params![job.id.to_string()],
                    )
                    .await
                    .map_err(|e| StoreError::Unavailable(format!("claim_due mark running: {e}")))?;
                    job.status = JobStatus::Running;
                    modified = true;
                    info!(job_id = %job.id, "Marking job as RUNNING");
                    claimed.push(job);
                }
                Ok(false) => {}
                Err(e) => {
                    let message = e.to_string();
                    warn!(job_id = %job.id, "{message}. Marking as FAILED.");
                    tx.execute(
                        "UPDATE jobs SET status = 'FAILED', result = '', error_message = ?1 WHERE id = ?2",
                        params![message, job.id.to_string()],
                    )
                    .await
                    .map_err(|e| StoreError::Unavailable(format!("claim_due mark failed: {e}")))?;
                    modified = true;
                }
            }
        }

        if modified {
            tx.commit()
                .await
                .map_err(|e| StoreError::Unavailable(format!("claim_due commit: {e}")))?;
        } else {
            tx.rollback()
                .await
                .map_err(|e| StoreError::Unavailable(format!("claim_due rollback: {e}")))?;
        }
        Ok(claimed)
    }

    async fn finalize(&self, id: Uuid, outcome: &JobOutcome) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let current = Self::select_jobs(
            &self.conn,
            "WHERE id = ?1",
            params![id.to_string()],
            "finalize lookup",
        )
        .await?;

        let Some(mut job) = current.into_iter().next() else {
            warn!(job_id = %id, "Finalize skipped: job not found");
            return Ok(false);
        };

        let applied = match outcome {
            JobOutcome::Completed(result) => job.complete(result.clone()),
            JobOutcome::Failed(message) => job.fail(message.clone()),
        };
        if let Err(e) = applied {
            warn!(job_id = %id, "Finalize skipped: {e}");
            return Ok(false);
        }

        self.conn
            .execute(
                "UPDATE jobs SET status = ?1, result = ?2, error_message = ?3 WHERE id = ?4",
                params![
                    job.status.as_str(),
                    job.result.clone().unwrap_or_default(),
                    job.error_message.clone().unwrap_or_default(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Unavailable(format!("finalize {id}: {e}")))?;

        info!(job_id = %id, status = %job.status, "Job finalized");
        Ok(true)
    }

    async fn is_initialized(&self) -> Result<bool, StoreError> {
        migrations::jobs_table_exists(&self.conn).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    async fn test_store() -> LibSqlJobStore {
        LibSqlJobStore::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn append_then_scan() {
        let store = test_store().await;
        let when = DateTime::parse_from_rfc3339("2031-06-01T09:30:00-05:00")
            .unwrap()
            .with_timezone(&Utc);

        let id = store.append("summarize the report", when).await.unwrap();

        let jobs = store.scan_all().await.unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert_eq!(job.id, id);
        assert_eq!(job.prompt, "summarize the report");
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.scheduled_time_iso, "2031-06-01T14:30:00+00:00");
        assert!(job.result.is_none());
        assert!(job.error_message.is_none());
        assert!(job.created_at().is_ok());
    }

    #[tokio::test]
    async fn scan_preserves_insertion_order() {
        let store = test_store().await;
        let later = Utc::now() + Duration::hours(2);
        let sooner = Utc::now() + Duration::hours(1);
        let a = store.append("a", later).await.unwrap();
        let b = store.append("b", sooner).await.unwrap();
        let c = store.append("c", later).await.unwrap();

        let ids: Vec<Uuid> = store.scan_all().await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[tokio::test]
    async fn claim_due_is_idempotent() {
        let store = test_store().await;
        let now = Utc::now();
        let id = store.append("P1", now - Duration::seconds(1)).await.unwrap();
        store.append("later", now + Duration::hours(1)).await.unwrap();

        let claimed = store.claim_due(now).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, id);
        assert_eq!(claimed[0].status, JobStatus::Running);

        assert!(store.claim_due(now).await.unwrap().is_empty());

        let stored = store.scan_all().await.unwrap();
        assert_eq!(stored[0].status, JobStatus::Running);
        assert_eq!(stored[1].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn claim_due_fails_malformed_schedule() {
        let store = test_store().await;
        let mut bad = Job::new("P2", Utc::now());
        bad.scheduled_time_iso = "not-a-date".to_string();
        let good = Job::new("ok", Utc::now() - Duration::seconds(5));
        store.rewrite_all(&[bad.clone(), good.clone()]).await.unwrap();

        let claimed = store.claim_due(Utc::now()).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, good.id);

        let stored = store.scan_all().await.unwrap();
        let p2 = stored.iter().find(|j| j.id == bad.id).unwrap();
        assert_eq!(p2.status, JobStatus::Failed);
        assert!(p2.error_message.as_deref().unwrap().contains("not-a-date"));
        assert!(p2.result.is_none());

        // Failed jobs are never re-attempted.
        assert!(store.claim_due(Utc::now()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_with_nothing_due_leaves_store_untouched() {
        let store = test_store().await;
        store
            .append("future", Utc::now() + Duration::days(1))
            .await
            .unwrap();
        let before = store.scan_all().await.unwrap();
        assert!(store.claim_due(Utc::now()).await.unwrap().is_empty());
        assert_eq!(store.scan_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn finalize_completed() {
        let store = test_store().await;
        let now = Utc::now();
        let id = store.append("P1", now - Duration::seconds(1)).await.unwrap();
        store.claim_due(now).await.unwrap();

        let applied = store
            .finalize(id, &JobOutcome::Completed("42".into()))
            .await
            .unwrap();
        assert!(applied);

        let job = store.scan_all().await.unwrap().remove(0);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_deref(), Some("42"));
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn empty_result_is_still_a_result() {
        let store = test_store().await;
        let now = Utc::now();
        let id = store.append("tools only", now - Duration::seconds(1)).await.unwrap();
        store.claim_due(now).await.unwrap();

        assert!(
            store
                .finalize(id, &JobOutcome::Completed(String::new()))
                .await
                .unwrap()
        );

        let job = store.scan_all().await.unwrap().remove(0);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.as_deref(), Some(""));
        assert!(job.error_message.is_none());

        let before = store.scan_all().await.unwrap();
        store.rewrite_all(&before).await.unwrap();
        assert_eq!(store.scan_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn rewrite_keeps_rows_it_cannot_decode() {
        let store = test_store().await;
        let kept = store.append("fine", Utc::now()).await.unwrap();
        store
            .conn
            .execute(
                "INSERT INTO jobs (id, prompt, scheduled_time_iso, status, created_at_iso) VALUES ('not-a-uuid', 'x', 'x', 'PENDING', 'x')",
                (),
            )
            .await
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO jobs (id, prompt, scheduled_time_iso, status, created_at_iso) VALUES (?1, 'y', 'y', 'CANCELLED', 'y')",
                params![Uuid::new_v4().to_string()],
            )
            .await
            .unwrap();

        let scanned = store.scan_all().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, kept);

        store.rewrite_all(&scanned).await.unwrap();
        assert_eq!(store.scan_all().await.unwrap(), scanned);

        let mut rows = store.conn.query("SELECT COUNT(*) FROM jobs", ()).await.unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn finalize_unknown_id_is_noop() {
        let store = test_store().await;
        store.append("x", Utc::now()).await.unwrap();
        let before = store.scan_all().await.unwrap();

        let applied = store
            .finalize(Uuid::new_v4(), &JobOutcome::Failed("boom".into()))
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.scan_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn terminal_jobs_cannot_be_finalized_again() {
        let store = test_store().await;
        let now = Utc::now();
        let id = store.append("x", now - Duration::seconds(1)).await.unwrap();
        store.claim_due(now).await.unwrap();
        store
            .finalize(id, &JobOutcome::Failed("executor down".into()))
            .await
            .unwrap();

        let applied = store
            .finalize(id, &JobOutcome::Completed("late".into()))
            .await
            .unwrap();
        assert!(!applied);

        let job = store.scan_all().await.unwrap().remove(0);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("executor down"));
    }

    #[tokio::test]
    async fn pending_jobs_cannot_be_finalized() {
        let store = test_store().await;
        let id = store.append("x", Utc::now()).await.unwrap();
        let applied = store
            .finalize(id, &JobOutcome::Completed("skip".into()))
            .await
            .unwrap();
        assert!(!applied);
    }

    #[tokio::test]
    async fn rewrite_of_scan_is_identity() {
        let store = test_store().await;
        let now = Utc::now();
        let done = store.append("done", now - Duration::seconds(3)).await.unwrap();
        store.append("waiting", now + Duration::hours(3)).await.unwrap();
        store.claim_due(now).await.unwrap();
        store
            .finalize(done, &JobOutcome::Completed("ok".into()))
            .await
            .unwrap();

        let before = store.scan_all().await.unwrap();
        store.rewrite_all(&before).await.unwrap();
        assert_eq!(store.scan_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");

        let id = {
            let store = LibSqlJobStore::new_local(&path).await.unwrap();
            store.append("persist me", Utc::now()).await.unwrap()
        };

        let reopened = LibSqlJobStore::new_local(&path).await.unwrap();
        let jobs = reopened.scan_all().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert!(reopened.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_finalizes_do_not_lose_updates() {
        let store = Arc::new(test_store().await);
        let now = Utc::now();
        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(
                store
                    .append(&format!("job {i}"), now - Duration::seconds(1))
                    .await
                    .unwrap(),
            );
        }
        store.claim_due(now).await.unwrap();

        let mut handles = Vec::new();
        for id in ids {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .finalize(id, &JobOutcome::Completed(id.to_string()))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        for job in store.scan_all().await.unwrap() {
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.result, Some(job.id.to_string()));
        }
    }
}
