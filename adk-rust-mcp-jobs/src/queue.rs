//! Bounded-concurrency job scheduler.
//!
//! [`JobQueue`] is a cheap-to-clone handle to a single coordinator task. The
//! coordinator owns the in-memory running set and the cancellation requests and
//! performs every state transition, one command at a time, so dispatch passes
//! never interleave. Executors run on spawned tasks and report back through a
//! completion channel; the dispatcher never waits for them.
//!
//! # Lifecycle
//!
//! ```text
//! create_job ─▶ pending ──dispatch──▶ running ──▶ completed | failed
//!                  │                     │
//!             cancel_job            cancel_job (flag, observed on return)
//!                  ▼                     ▼
//!               failed                failed
//! ```
//!
//! Cancellation is cooperative: a running executor is never interrupted, its
//! result is discarded when it returns. An executor may therefore finish its
//! side effects (e.g. write files) after its job was cancelled.
//!
//! On start, jobs left `running` by a previous process are reset to `pending`
//! and dispatched again. Side effects of the lost run may be repeated.

use crate::error::{JobError, StoreError};
use crate::executor::{ExecutorRegistry, JobContext, ToolExecutor};
use crate::model::{Job, JobResult, JobStatus, JobType, ToolOutput, now_millis};
use crate::store::JobStore;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Error recorded on jobs cancelled by a caller.
pub const CANCELLED_BY_USER: &str = "Job cancelled by user";

/// Error recorded when an executor fails without a message.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Job failed with an unknown error";

/// Default admission limit.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 2;

/// Default interval between cancellation hygiene passes.
pub const DEFAULT_HYGIENE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of jobs running at once (at least 1)
    pub max_concurrent_jobs: usize,
    /// Log executor failures with full diagnostics
    pub debug: bool,
    /// How often stale cancellation requests are purged
    pub hygiene_interval: Duration,
    /// How long a cancellation request is kept after its job finished
    pub cancellation_retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            debug: false,
            hygiene_interval: DEFAULT_HYGIENE_INTERVAL,
            cancellation_retention: Duration::from_secs(60 * 60),
        }
    }
}

impl QueueConfig {
    /// Set the admission limit.
    pub fn with_max_concurrent_jobs(mut self, max_concurrent_jobs: usize) -> Self {
        self.max_concurrent_jobs = max_concurrent_jobs;
        self
    }

    /// Enable or disable debug diagnostics.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the cancellation hygiene interval and retention window.
    pub fn with_hygiene(mut self, interval: Duration, retention: Duration) -> Self {
        self.hygiene_interval = interval;
        self.cancellation_retention = retention;
        self
    }
}

/// What a successful [`JobQueue::cancel_job`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job had not started and is now failed
    Cancelled,
    /// The job is running; it will be marked failed when its executor returns
    CancellationRequested,
}

/// Snapshot of the scheduler's in-memory bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Admission limit
    pub max_concurrent_jobs: usize,
    /// Jobs currently handed to executors
    pub running: usize,
    /// Outstanding cancellation requests
    pub cancellation_requests: usize,
}

enum Command {
    Create {
        job: Job,
        reply: oneshot::Sender<Result<(), JobError>>,
    },
    Cancel {
        id: String,
        reply: oneshot::Sender<Result<CancelOutcome, JobError>>,
    },
    Stats {
        reply: oneshot::Sender<QueueStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum Outcome {
    Output(ToolOutput),
    Failed(anyhow::Error),
    Panicked(String),
}

struct Completion {
    id: String,
    outcome: Outcome,
}

/// Handle to the job scheduler.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: JobStore,
    executors: Arc<ExecutorRegistry>,
    commands: mpsc::UnboundedSender<Command>,
}

impl JobQueue {
    /// Recover interrupted jobs, start the coordinator and run a first dispatch pass.
    ///
    /// Jobs found `running` are reset to `pending` in one transaction before
    /// anything is dispatched.
    ///
    /// # Errors
    /// Returns `JobError::Store` if recovery fails.
    pub async fn start(
        store: JobStore,
        executors: ExecutorRegistry,
        config: QueueConfig,
    ) -> Result<Self, JobError> {
        let mut config = config;
        if config.max_concurrent_jobs == 0 {
            warn!("max_concurrent_jobs must be at least 1, using 1");
            config.max_concurrent_jobs = 1;
        }
        if config.hygiene_interval.is_zero() {
            warn!(
                interval_secs = DEFAULT_HYGIENE_INTERVAL.as_secs(),
                "hygiene_interval must be non-zero, using default"
            );
            config.hygiene_interval = DEFAULT_HYGIENE_INTERVAL;
        }

        let resumed = store.reset_running_jobs().await?;
        if resumed > 0 {
            info!(count = resumed, "Reset interrupted jobs to pending");
        }

        let executors = Arc::new(executors);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut coordinator = Coordinator {
            store: store.clone(),
            executors: executors.clone(),
            config,
            running: HashSet::new(),
            cancel_requests: HashSet::new(),
            completions: completions_tx,
        };

        coordinator.dispatch().await;
        info!(
            max_concurrent_jobs = coordinator.config.max_concurrent_jobs,
            job_types = ?executors.job_types(),
            "Job scheduler started"
        );
        tokio::spawn(coordinator.run(commands_rx, completions_rx));

        Ok(Self {
            store,
            executors,
            commands: commands_tx,
        })
    }

    /// Submit a job and return its id.
    ///
    /// The job is persisted as `pending` and a dispatch pass has run by the time
    /// this returns, so it may already be `running`.
    ///
    /// # Errors
    /// Returns `JobError::Submission` without persisting anything if `params` is
    /// not a JSON object or no executor handles `job_type`.
    #[instrument(level = "debug", skip(self, params))]
    pub async fn create_job(&self, job_type: JobType, params: serde_json::Value) -> Result<String, JobError> {
        if !params.is_object() {
            return Err(JobError::submission("Job params must be a JSON object"));
        }
        if !self.executors.supports(job_type) {
            return Err(JobError::no_executor(job_type));
        }

        let job = Job::new(job_type, params);
        let id = job.id.clone();
        self.request(|reply| Command::Create { job, reply }).await??;

        info!(job_id = %id, job_type = %job_type, "Job created");
        Ok(id)
    }

    /// Look up a job. Unknown ids are `Ok(None)`.
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>, JobError> {
        Ok(self.store.get_job(id).await?)
    }

    /// Jobs newest-first, optionally filtered by status.
    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: u32) -> Result<Vec<Job>, JobError> {
        Ok(self.store.list_jobs(status, limit).await?)
    }

    /// Cancel a job.
    ///
    /// A pending job fails immediately with "Job cancelled by user". A running
    /// job is flagged and fails once its executor returns, whatever it returns.
    ///
    /// # Errors
    /// `JobError::NotFound` for unknown ids, `JobError::AlreadyTerminal` for
    /// jobs that already completed or failed.
    #[instrument(level = "debug", skip(self))]
    pub async fn cancel_job(&self, id: &str) -> Result<CancelOutcome, JobError> {
        let id = id.to_string();
        self.request(|reply| Command::Cancel { id, reply }).await?
    }

    /// Current in-memory scheduler counters.
    pub async fn stats(&self) -> Result<QueueStats, JobError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Stop the coordinator and its hygiene timer.
    ///
    /// Executors already running are not interrupted; their jobs stay `running`
    /// in the store and are resumed by the next [`start`](Self::start).
    pub async fn shutdown(&self) {
        if self.request(|reply| Command::Shutdown { reply }).await.is_err() {
            debug!("Job scheduler already stopped");
        }
    }

    /// The underlying job store.
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Whether an executor is registered for `job_type`.
    pub fn supports(&self, job_type: JobType) -> bool {
        self.executors.supports(job_type)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, JobError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .map_err(|_| JobError::QueueClosed)?;
        response.await.map_err(|_| JobError::QueueClosed)
    }
}

struct Coordinator {
    store: JobStore,
    executors: Arc<ExecutorRegistry>,
    config: QueueConfig,
    running: HashSet<String>,
    cancel_requests: HashSet<String>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let mut hygiene = tokio::time::interval(self.config.hygiene_interval);
        hygiene.set_missed_tick_behavior(MissedTickBehavior::Delay);
        hygiene.reset();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                Some(completion) = completions.recv() => self.complete(completion).await,
                _ = hygiene.tick() => self.purge_cancellations().await,
            }
        }

        info!(in_flight = self.running.len(), "Job scheduler stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Create { job, reply } => {
                let created = self.store.create_job(&job).await.map_err(JobError::from);
                if created.is_ok() {
                    self.dispatch().await;
                }
                let _ = reply.send(created);
            }
            Command::Cancel { id, reply } => {
                let outcome = self.cancel(&id).await;
                let _ = reply.send(outcome);
            }
            Command::Stats { reply } => {
                let _ = reply.send(QueueStats {
                    max_concurrent_jobs: self.config.max_concurrent_jobs,
                    running: self.running.len(),
                    cancellation_requests: self.cancel_requests.len(),
                });
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn cancel(&mut self, id: &str) -> Result<CancelOutcome, JobError> {
        let job = self
            .store
            .get_job(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        if job.status.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id: job.id,
                status: job.status,
            });
        }

        if self.running.contains(id) {
            self.cancel_requests.insert(id.to_string());
            info!(job_id = %id, "Cancellation requested for running job");
            return Ok(CancelOutcome::CancellationRequested);
        }

        self.store.update_job_error(id, CANCELLED_BY_USER).await?;
        info!(job_id = %id, "Cancelled job before dispatch");
        Ok(CancelOutcome::Cancelled)
    }

    async fn dispatch(&mut self) {
        if let Err(e) = self.dispatch_pass().await {
            error!(error = %e, running = self.running.len(), "Dispatch pass aborted by job store failure");
        }
    }

    async fn dispatch_pass(&mut self) -> Result<(), StoreError> {
        if self.running.len() >= self.config.max_concurrent_jobs {
            return Ok(());
        }

        let candidates = self.store.get_running_jobs().await?;

        for job in candidates {
            if self.running.len() >= self.config.max_concurrent_jobs {
                break;
            }
            if job.status != JobStatus::Pending || self.running.contains(&job.id) {
                continue;
            }

            if self.cancel_requests.remove(&job.id) {
                self.store.update_job_error(&job.id, CANCELLED_BY_USER).await?;
                info!(job_id = %job.id, "Skipped cancelled job at dispatch");
                continue;
            }

            let Some(executor) = self.executors.get(job.job_type) else {
                let message = format!("No executor registered for job type '{}'", job.job_type);
                warn!(job_id = %job.id, job_type = %job.job_type, "Failing job without executor");
                self.store.update_job_error(&job.id, &message).await?;
                continue;
            };

            self.store
                .update_job_status(&job.id, JobStatus::Running, Some(now_millis()), None)
                .await?;
            self.running.insert(job.id.clone());

            info!(
                job_id = %job.id,
                job_type = %job.job_type,
                running = self.running.len(),
                "Dispatched job"
            );
            self.spawn_execution(job, executor);
        }

        Ok(())
    }

    fn spawn_execution(&self, job: Job, executor: Arc<dyn ToolExecutor>) {
        let completions = self.completions.clone();
        let ctx = JobContext {
            job_id: job.id.clone(),
            job_type: job.job_type,
            store: self.store.clone(),
        };
        let id = job.id;
        let params = job.params;

        tokio::spawn(async move {
            // Inner task so a panicking executor becomes a failed job, not a lost slot.
            let task = tokio::spawn(async move { executor.execute(ctx, params).await });

            let outcome = match task.await {
                Ok(Ok(output)) => Outcome::Output(output),
                Ok(Err(err)) => Outcome::Failed(err),
                Err(join_err) => Outcome::Panicked(describe_join_error(join_err)),
            };

            if completions.send(Completion { id, outcome }).is_err() {
                debug!("Job scheduler stopped before executor finished");
            }
        });
    }

    async fn complete(&mut self, completion: Completion) {
        let Completion { id, outcome } = completion;

        if let Err(e) = self.record_outcome(&id, outcome).await {
            error!(job_id = %id, error = %e, "Failed to record job outcome");
        }

        self.running.remove(&id);
        self.dispatch().await;
    }

    async fn record_outcome(&mut self, id: &str, outcome: Outcome) -> Result<(), StoreError> {
        let cancelled = self.cancel_requests.remove(id);

        match self.store.get_job(id).await? {
            None => {
                warn!(job_id = %id, "Finished job no longer exists");
                return Ok(());
            }
            Some(job) if job.status.is_terminal() => {
                warn!(job_id = %id, status = %job.status, "Finished job was already terminal, keeping recorded outcome");
                return Ok(());
            }
            Some(_) => {}
        }

        if cancelled {
            info!(job_id = %id, "Discarding result of cancelled job");
            return self.store.update_job_error(id, CANCELLED_BY_USER).await;
        }

        match outcome {
            Outcome::Output(output) => match JobResult::from_output(output) {
                Ok(result) => {
                    self.store.update_job_result(id, &result).await?;
                    info!(job_id = %id, outputs = result.outputs.len(), "Job completed");
                }
                Err(reason) => {
                    warn!(job_id = %id, reason = %reason, "Job output not recognized");
                    self.store.update_job_error(id, &reason).await?;
                }
            },
            Outcome::Failed(err) => {
                let message = failure_message(&err);
                if self.config.debug {
                    error!(job_id = %id, error = ?err, "Job failed");
                } else {
                    warn!(job_id = %id, error = %message, "Job failed");
                }
                self.store.update_job_error(id, &message).await?;
            }
            Outcome::Panicked(message) => {
                error!(job_id = %id, error = %message, "Job executor panicked");
                self.store.update_job_error(id, &message).await?;
            }
        }

        Ok(())
    }

    async fn purge_cancellations(&mut self) {
        if self.cancel_requests.is_empty() {
            return;
        }

        let retention = chrono::Duration::from_std(self.config.cancellation_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = now_millis() - retention;

        let ids: Vec<String> = self.cancel_requests.iter().cloned().collect();
        let mut purged = 0usize;
        for id in ids {
            let stale = match self.store.get_job(&id).await {
                Ok(None) => true,
                Ok(Some(job)) => {
                    job.status.is_terminal() && job.completed_at.is_some_and(|done| done <= cutoff)
                }
                Err(e) => {
                    warn!(job_id = %id, error = %e, "Could not inspect cancelled job");
                    false
                }
            };
            if stale {
                self.cancel_requests.remove(&id);
                purged += 1;
            }
        }

        if purged > 0 {
            debug!(purged, remaining = self.cancel_requests.len(), "Purged stale cancellation requests");
        }
    }
}

fn failure_message(err: &anyhow::Error) -> String {
    let message = format!("{:#}", err);
    if message.trim().is_empty() {
        DEFAULT_FAILURE_MESSAGE.to_string()
    } else {
        message
    }
}

fn describe_join_error(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "Executor task was cancelled".to_string();
    }

    let panic = err.into_panic();
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Executor panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixed(fn() -> anyhow::Result<ToolOutput>);

    #[async_trait]
    impl ToolExecutor for Fixed {
        async fn execute(&self, _ctx: JobContext, _params: serde_json::Value) -> anyhow::Result<ToolOutput> {
            (self.0)()
        }
    }

    struct Panics;

    #[async_trait]
    impl ToolExecutor for Panics {
        async fn execute(&self, _ctx: JobContext, _params: serde_json::Value) -> anyhow::Result<ToolOutput> {
            panic!("imagen exploded");
        }
    }

    async fn start_with(job_type: JobType, executor: impl ToolExecutor + 'static) -> JobQueue {
        let store = JobStore::in_memory().await.unwrap();
        let executors = ExecutorRegistry::new().with(job_type, executor);
        JobQueue::start(store, executors, QueueConfig::default()).await.unwrap()
    }

    async fn wait_terminal(queue: &JobQueue, id: &str) -> Job {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(job) = queue.get_job(id).await.unwrap() {
                    if job.status.is_terminal() {
                        return job;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    #[test]
    fn test_failure_message_substitutes_default() {
        assert_eq!(failure_message(&anyhow::anyhow!("")), DEFAULT_FAILURE_MESSAGE);
        assert_eq!(failure_message(&anyhow::anyhow!("   ")), DEFAULT_FAILURE_MESSAGE);
    }

    #[test]
    fn test_failure_message_keeps_context_chain() {
        let err = anyhow::anyhow!("HTTP 429").context("Imagen request failed");
        let message = failure_message(&err);
        assert!(message.contains("Imagen request failed"));
        assert!(message.contains("HTTP 429"));
    }

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.max_concurrent_jobs, DEFAULT_MAX_CONCURRENT_JOBS);
        assert!(!config.debug);
        assert!(config.hygiene_interval < config.cancellation_retention);
    }

    #[tokio::test]
    async fn test_rejects_non_object_params_without_persisting() {
        let queue = start_with(JobType::Generate, Fixed(|| Ok(ToolOutput::png("/a.png")))).await;

        let err = queue.create_job(JobType::Generate, json!("a cat")).await.unwrap_err();
        assert!(matches!(err, JobError::Submission(_)));
        let err = queue.create_job(JobType::Generate, serde_json::Value::Null).await.unwrap_err();
        assert!(matches!(err, JobError::Submission(_)));

        assert!(queue.list_jobs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unregistered_job_type() {
        let queue = start_with(JobType::Generate, Fixed(|| Ok(ToolOutput::png("/a.png")))).await;

        let err = queue.create_job(JobType::Edit, json!({ "prompt": "x" })).await.unwrap_err();
        assert!(err.to_string().contains("edit"));
        assert!(queue.list_jobs(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_executor_error_becomes_failed_job() {
        let queue = start_with(
            JobType::Generate,
            Fixed(|| Err(anyhow::anyhow!("API error for imagen (HTTP 500): boom"))),
        )
        .await;

        let id = queue.create_job(JobType::Generate, json!({ "prompt": "x" })).await.unwrap();
        let job = wait_terminal(&queue, &id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("HTTP 500"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_empty_executor_error_gets_default_message() {
        let queue = start_with(JobType::Generate, Fixed(|| Err(anyhow::anyhow!("")))).await;

        let id = queue.create_job(JobType::Generate, json!({})).await.unwrap();
        let job = wait_terminal(&queue, &id).await;

        assert_eq!(job.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_panicking_executor_fails_job_and_frees_slot() {
        let queue = start_with(JobType::Generate, Panics).await;

        let id = queue.create_job(JobType::Generate, json!({})).await.unwrap();
        let job = wait_terminal(&queue, &id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("imagen exploded"));
        assert_eq!(queue.stats().await.unwrap().running, 0);
    }

    #[tokio::test]
    async fn test_unrecognized_output_fails_job() {
        let queue = start_with(
            JobType::Upscale,
            Fixed(|| {
                Ok(ToolOutput::Resources {
                    locators: vec![],
                    mime_type: "image/png".to_string(),
                })
            }),
        )
        .await;

        let id = queue.create_job(JobType::Upscale, json!({})).await.unwrap();
        let job = wait_terminal(&queue, &id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("no output locators"));
    }

    #[tokio::test]
    async fn test_cancel_unknown_and_terminal_jobs() {
        let queue = start_with(JobType::Generate, Fixed(|| Ok(ToolOutput::png("/a.png")))).await;

        let err = queue.cancel_job("missing").await.unwrap_err();
        assert!(matches!(err, JobError::NotFound(_)));

        let id = queue.create_job(JobType::Generate, json!({})).await.unwrap();
        let job = wait_terminal(&queue, &id).await;
        assert_eq!(job.status, JobStatus::Completed);

        let err = queue.cancel_job(&id).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::AlreadyTerminal { status: JobStatus::Completed, .. }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let queue = start_with(JobType::Generate, Fixed(|| Ok(ToolOutput::png("/a.png")))).await;
        queue.shutdown().await;

        let err = queue.create_job(JobType::Generate, json!({})).await.unwrap_err();
        assert!(matches!(err, JobError::QueueClosed));
        // Reads go straight to the store and keep working.
        assert!(queue.list_jobs(None, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_limit_is_raised_to_one() {
        let store = JobStore::in_memory().await.unwrap();
        let executors = ExecutorRegistry::new().with(JobType::Generate, Fixed(|| Ok(ToolOutput::png("/a.png"))));
        let queue = JobQueue::start(store, executors, QueueConfig::default().with_max_concurrent_jobs(0))
            .await
            .unwrap();

        assert_eq!(queue.stats().await.unwrap().max_concurrent_jobs, 1);
    }

    #[tokio::test]
    async fn test_zero_hygiene_interval_keeps_queue_alive() {
        let store = JobStore::in_memory().await.unwrap();
        let executors = ExecutorRegistry::new().with(JobType::Generate, Fixed(|| Ok(ToolOutput::png("/a.png"))));
        let config = QueueConfig::default().with_hygiene(Duration::ZERO, Duration::ZERO);
        let queue = JobQueue::start(store, executors, config).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = queue.create_job(JobType::Generate, json!({ "prompt": "a fox" })).await.unwrap();
        assert_eq!(wait_terminal(&queue, &id).await.status, JobStatus::Completed);
        assert_eq!(queue.stats().await.unwrap().running, 0);
    }

    #[tokio::test]
    async fn test_unreadable_pending_job_does_not_block_dispatch() {
        let store = JobStore::in_memory().await.unwrap();
        let executors = ExecutorRegistry::new().with(JobType::Generate, Fixed(|| Ok(ToolOutput::png("/a.png"))));
        let queue = JobQueue::start(store.clone(), executors, QueueConfig::default().with_max_concurrent_jobs(1))
            .await
            .unwrap();

        let mut bad = Job::new(JobType::Generate, json!({ "prompt": "placeholder" }));
        bad.id = "bad".to_string();
        store.create_job(&bad).await.unwrap();
        store
            .transaction(|conn| {
                Box::pin(async move {
                    sqlx::query("UPDATE jobs SET params = '{not json' WHERE id = 'bad'")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        let id = queue.create_job(JobType::Generate, json!({ "prompt": "a fox" })).await.unwrap();
        assert_eq!(wait_terminal(&queue, &id).await.status, JobStatus::Completed);

        let stats = store.count_by_status().await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
    }
}
