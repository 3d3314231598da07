//! SQLite-backed durable job store.
//!
//! All job state lives in a single `jobs` table. The store is the source of
//! truth that survives restarts; the scheduler keeps only ephemeral bookkeeping
//! in memory. Timestamps are stored as Unix milliseconds and ties in
//! `created_at` are broken by insertion order (`rowid`).

use crate::error::StoreError;
use crate::model::{Job, JobResult, JobStatus, JobType, now_millis};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Boxed future returned by [`JobStore::transaction`] closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const JOB_COLUMNS: &str =
    "id, job_type, status, params, result, error, created_at, started_at, completed_at";

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    /// Jobs waiting for a slot
    pub pending: u64,
    /// Jobs handed to an executor
    pub running: u64,
    /// Jobs finished with a result
    pub completed: u64,
    /// Jobs finished with an error
    pub failed: u64,
}

impl JobStats {
    /// Total number of jobs in the store.
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.completed + self.failed
    }
}

/// Durable, queryable persistence of [`Job`] records.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

impl JobStore {
    /// Open (or create) a store file at `path`.
    ///
    /// Missing parent directories are created. The database runs in WAL mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(sqlx::Error::Io)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Opened job store");
        Self::with_pool(pool).await
    }

    /// Open a private in-memory store. Contents vanish when the store is dropped.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection to :memory: is its own database, so pin exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id            TEXT PRIMARY KEY,
                job_type      TEXT NOT NULL,
                status        TEXT NOT NULL,
                params        TEXT NOT NULL,
                result        TEXT NULL,
                error         TEXT NULL,
                created_at    INTEGER NOT NULL,
                started_at    INTEGER NULL,
                completed_at  INTEGER NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Serves both "status newest-first" listing and "status oldest-first" dispatch scans.
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs (status, created_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs (created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new job in `pending` state.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateId` if a job with the same id exists.
    pub async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let params = serde_json::to_string(&job.params)?;

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, status, params, result, error, created_at, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, NULL, NULL)
            "#,
        )
        .bind(&job.id)
        .bind(job.job_type.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(params)
        .bind(job.created_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(job_id = %job.id, job_type = %job.job_type, "Job persisted");
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateId(job.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point lookup. Absence is `Ok(None)`, not an error.
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Change a job's status, optionally stamping start/completion times.
    ///
    /// Timestamps left as `None` keep their stored value. Params, result and
    /// error are never touched.
    pub async fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        set_status(&mut conn, id, status, started_at, completed_at).await
    }

    /// Record a result: status becomes `completed` and `completed_at` is now.
    ///
    /// Last write wins; avoiding double completion is the caller's job.
    pub async fn update_job_result(&self, id: &str, result: &JobResult) -> Result<(), StoreError> {
        let result = serde_json::to_string(result)?;

        sqlx::query(
            "UPDATE jobs SET status = ?1, result = ?2, error = NULL, completed_at = ?3 WHERE id = ?4",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(result)
        .bind(now_millis().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a failure: status becomes `failed` and `completed_at` is now.
    pub async fn update_job_error(&self, id: &str, message: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET status = ?1, error = ?2, result = NULL, completed_at = ?3 WHERE id = ?4",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(message)
        .bind(now_millis().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Jobs newest-first, optionally filtered by status, at most `limit` of them.
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<Job>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ))
                .bind(status.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(job_from_row).collect()
    }

    /// All `pending` and `running` jobs, oldest-first (admission order).
    ///
    /// Rows that cannot be decoded are left out. An unreadable `pending` row
    /// is marked failed so it never blocks admission again.
    pub async fn get_running_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status IN (?1, ?2) ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(JobStatus::Pending.as_str())
        .bind(JobStatus::Running.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            match job_from_row(row) {
                Ok(job) => jobs.push(job),
                Err(e) => self.fail_unreadable(row, &e).await?,
            }
        }

        Ok(jobs)
    }

    async fn fail_unreadable(&self, row: &SqliteRow, err: &StoreError) -> Result<(), StoreError> {
        let id: String = row.try_get("id")?;
        let status: String = row.try_get("status")?;

        if status != JobStatus::Pending.as_str() {
            warn!(job_id = %id, error = %err, "Skipping unreadable job");
            return Ok(());
        }

        error!(job_id = %id, error = %err, "Failing unreadable pending job");
        self.update_job_error(&id, &format!("Stored job is unreadable: {}", err))
            .await
    }

    /// Run `f` inside a transaction: every write it makes commits together or not at all.
    ///
    /// ```ignore
    /// store.transaction(|conn| Box::pin(async move {
    ///     sqlx::query("UPDATE jobs SET ...").execute(&mut *conn).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
    {
        let mut tx = self.pool.begin().await?;

        match f(&mut *tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Transaction rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Move every `running` job back to `pending` in one transaction.
    ///
    /// Returns how many jobs were reset.
    pub async fn reset_running_jobs(&self) -> Result<u64, StoreError> {
        self.transaction(|conn| {
            Box::pin(async move {
                let rows = sqlx::query("SELECT id FROM jobs WHERE status = ?1 ORDER BY created_at ASC, rowid ASC")
                    .bind(JobStatus::Running.as_str())
                    .fetch_all(&mut *conn)
                    .await?;

                for row in &rows {
                    let id: String = row.try_get("id")?;
                    set_status(conn, &id, JobStatus::Pending, None, None).await?;
                }

                Ok(rows.len() as u64)
            })
        })
        .await
    }

    /// Number of jobs in each status.
    pub async fn count_by_status(&self) -> Result<JobStats, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = JobStats::default();
        for row in &rows {
            let status: String = row.try_get("status")?;
            let n: i64 = row.try_get("n")?;
            let n = n.max(0) as u64;
            match JobStatus::from_str(&status) {
                Ok(JobStatus::Pending) => stats.pending = n,
                Ok(JobStatus::Running) => stats.running = n,
                Ok(JobStatus::Completed) => stats.completed = n,
                Ok(JobStatus::Failed) => stats.failed = n,
                Err(e) => return Err(StoreError::corrupt("*", e)),
            }
        }

        Ok(stats)
    }

    /// Administrative purge: delete terminal jobs that finished before `before`.
    ///
    /// Returns how many jobs were deleted.
    pub async fn purge_finished(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let done = sqlx::query(
            "DELETE FROM jobs WHERE status IN (?1, ?2) AND completed_at IS NOT NULL AND completed_at < ?3",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(JobStatus::Failed.as_str())
        .bind(before.timestamp_millis())
        .execute(&self.pool)
        .await?;

        info!(deleted = done.rows_affected(), "Purged finished jobs");
        Ok(done.rows_affected())
    }
}

async fn set_status(
    conn: &mut SqliteConnection,
    id: &str,
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = ?1,
            started_at = COALESCE(?2, started_at),
            completed_at = COALESCE(?3, completed_at)
        WHERE id = ?4
        "#,
    )
    .bind(status.as_str())
    .bind(started_at.map(|t| t.timestamp_millis()))
    .bind(completed_at.map(|t| t.timestamp_millis()))
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn job_from_row(row: &SqliteRow) -> Result<Job, StoreError> {
    let id: String = row.try_get("id")?;

    let job_type: String = row.try_get("job_type")?;
    let job_type = JobType::from_str(&job_type).map_err(|e| StoreError::corrupt(&id, e))?;

    let status: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status).map_err(|e| StoreError::corrupt(&id, e))?;

    let params: String = row.try_get("params")?;
    let params = serde_json::from_str(&params)?;

    let result: Option<String> = row.try_get("result")?;
    let result = result.map(|r| serde_json::from_str::<JobResult>(&r)).transpose()?;

    let created_at: i64 = row.try_get("created_at")?;
    let started_at: Option<i64> = row.try_get("started_at")?;
    let completed_at: Option<i64> = row.try_get("completed_at")?;

    Ok(Job {
        created_at: from_millis(&id, created_at)?,
        started_at: started_at.map(|ms| from_millis(&id, ms)).transpose()?,
        completed_at: completed_at.map(|ms| from_millis(&id, ms)).transpose()?,
        id,
        job_type,
        status,
        params,
        result,
        error: row.try_get("error")?,
    })
}

fn from_millis(id: &str, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::corrupt(id, format!("timestamp {} out of range", ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolOutput;
    use serde_json::json;

    async fn store() -> JobStore {
        JobStore::in_memory().await.unwrap()
    }

    fn job(prompt: &str) -> Job {
        Job::new(JobType::Generate, json!({ "prompt": prompt }))
    }

    fn png_result(path: &str) -> JobResult {
        JobResult::from_output(ToolOutput::png(path)).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let store = store().await;
        let job = job("a cat");
        store.create_job(&job).await.unwrap();

        let loaded = store.get_job(&job.id).await.unwrap().expect("job exists");
        assert_eq!(loaded, job);
    }

    #[tokio::test]
    async fn test_get_missing_job_is_none() {
        let store = store().await;
        assert!(store.get_job("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_always_inserts_pending() {
        let store = store().await;
        let mut job = job("a cat");
        job.status = JobStatus::Running;
        store.create_job(&job).await.unwrap();

        let loaded = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = store().await;
        let job = job("a cat");
        store.create_job(&job).await.unwrap();

        let err = store.create_job(&job).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == job.id));
    }

    #[tokio::test]
    async fn test_update_status_keeps_payloads_and_unset_timestamps() {
        let store = store().await;
        let job = job("a cat");
        store.create_job(&job).await.unwrap();

        let started = now_millis();
        store
            .update_job_status(&job.id, JobStatus::Running, Some(started), None)
            .await
            .unwrap();
        store
            .update_job_status(&job.id, JobStatus::Pending, None, None)
            .await
            .unwrap();

        let loaded = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.started_at, Some(started));
        assert_eq!(loaded.params, job.params);
        assert!(loaded.result.is_none());
        assert!(loaded.error.is_none());
    }

    #[tokio::test]
    async fn test_result_and_error_are_exclusive() {
        let store = store().await;
        let a = job("a");
        let b = job("b");
        store.create_job(&a).await.unwrap();
        store.create_job(&b).await.unwrap();

        store.update_job_result(&a.id, &png_result("/out/a.png")).await.unwrap();
        store.update_job_error(&b.id, "API error").await.unwrap();

        let a = store.get_job(&a.id).await.unwrap().unwrap();
        assert_eq!(a.status, JobStatus::Completed);
        assert_eq!(a.result.unwrap().outputs, vec!["/out/a.png".to_string()]);
        assert!(a.error.is_none());
        assert!(a.completed_at.is_some());

        let b = store.get_job(&b.id).await.unwrap().unwrap();
        assert_eq!(b.status, JobStatus::Failed);
        assert_eq!(b.error.as_deref(), Some("API error"));
        assert!(b.result.is_none());
        assert!(b.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first_with_filter_and_limit() {
        let store = store().await;
        let jobs: Vec<Job> = (0..5).map(|i| job(&format!("p{i}"))).collect();
        for j in &jobs {
            store.create_job(j).await.unwrap();
        }
        store.update_job_error(&jobs[1].id, "boom").await.unwrap();
        store.update_job_error(&jobs[3].id, "boom").await.unwrap();

        let all = store.list_jobs(None, 10).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|j| j.id.as_str()).collect();
        let expected: Vec<&str> = jobs.iter().rev().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, expected);

        let limited = store.list_jobs(None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, jobs[4].id);

        let failed = store.list_jobs(Some(JobStatus::Failed), 10).await.unwrap();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].id, jobs[3].id);
        assert_eq!(failed[1].id, jobs[1].id);
    }

    #[tokio::test]
    async fn test_running_jobs_oldest_first_without_terminal() {
        let store = store().await;
        let jobs: Vec<Job> = (0..4).map(|i| job(&format!("p{i}"))).collect();
        for j in &jobs {
            store.create_job(j).await.unwrap();
        }
        store
            .update_job_status(&jobs[2].id, JobStatus::Running, Some(now_millis()), None)
            .await
            .unwrap();
        store.update_job_result(&jobs[0].id, &png_result("/x.png")).await.unwrap();

        let active = store.get_running_jobs().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![jobs[1].id.as_str(), jobs[2].id.as_str(), jobs[3].id.as_str()]);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let store = store().await;
        let job = job("a cat");
        store.create_job(&job).await.unwrap();

        let id = job.id.clone();
        let outcome: Result<(), StoreError> = store
            .transaction(|conn| {
                Box::pin(async move {
                    set_status(conn, &id, JobStatus::Running, None, None).await?;
                    Err(StoreError::corrupt(&id, "forced failure"))
                })
            })
            .await;
        assert!(outcome.is_err());

        let loaded = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_reset_running_jobs_only_touches_running() {
        let store = store().await;
        let running = job("running");
        let pending = job("pending");
        let done = job("done");
        for j in [&running, &pending, &done] {
            store.create_job(j).await.unwrap();
        }
        store
            .update_job_status(&running.id, JobStatus::Running, Some(now_millis()), None)
            .await
            .unwrap();
        store.update_job_result(&done.id, &png_result("/x.png")).await.unwrap();

        assert_eq!(store.reset_running_jobs().await.unwrap(), 1);

        let stats = store.count_by_status().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.total(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_params_surface_on_read() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO jobs (id, job_type, status, params, created_at) VALUES ('bad', 'generate', 'pending', '{not json', 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.get_job("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_unreadable_pending_job_is_failed_not_returned() {
        let store = store().await;
        let good = job("good");
        store.create_job(&good).await.unwrap();
        sqlx::query(
            "INSERT INTO jobs (id, job_type, status, params, created_at) VALUES ('bad', 'generate', 'pending', '{not json', 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let active = store.get_running_jobs().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, good.id);

        let stats = store.count_by_status().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 1);

        let (error, completed_at): (Option<String>, Option<i64>) =
            sqlx::query_as("SELECT error, completed_at FROM jobs WHERE id = 'bad'")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert!(error.unwrap().starts_with("Stored job is unreadable"));
        assert!(completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_status_is_corrupt() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO jobs (id, job_type, status, params, created_at) VALUES ('odd', 'generate', 'paused', '{}', 0)",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let err = store.get_job("odd").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "odd"));
    }

    #[tokio::test]
    async fn test_purge_finished_keeps_active_and_recent() {
        let store = store().await;
        let old = job("old");
        let active = job("active");
        store.create_job(&old).await.unwrap();
        store.create_job(&active).await.unwrap();
        store.update_job_error(&old.id, "boom").await.unwrap();

        let cutoff = now_millis() + chrono::Duration::seconds(1);
        assert_eq!(store.purge_finished(cutoff).await.unwrap(), 1);
        assert!(store.get_job(&old.id).await.unwrap().is_none());
        assert!(store.get_job(&active.id).await.unwrap().is_some());

        let earlier = now_millis() - chrono::Duration::hours(1);
        assert_eq!(store.purge_finished(earlier).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jobs.db");

        let job = job("persist me");
        {
            let store = JobStore::open(&path).await.unwrap();
            store.create_job(&job).await.unwrap();
            store
                .update_job_status(&job.id, JobStatus::Running, Some(now_millis()), None)
                .await
                .unwrap();
        }

        let reopened = JobStore::open(&path).await.unwrap();
        let loaded = reopened.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Running);
        assert_eq!(loaded.params, json!({ "prompt": "persist me" }));
    }
}
