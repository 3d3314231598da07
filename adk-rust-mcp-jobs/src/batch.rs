//! Batch orchestration on top of the job queue.
//!
//! A batch submits one job per item, polls the store until every job is
//! terminal or the deadline passes, and folds the outcomes into a single
//! [`BatchReport`]. Individual job failures never fail the batch; only a
//! malformed configuration does.

use crate::error::{BatchError, JobError};
use crate::model::{Job, JobStatus, JobType, now_millis};
use crate::queue::JobQueue;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default batch deadline in milliseconds (10 minutes).
pub const DEFAULT_MAX_WAIT_MS: u64 = 600_000;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Job id reported for items whose submission was rejected.
pub const UNSUBMITTED_JOB_ID: &str = "N/A";

/// One entry of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchItem {
    /// Prompt for this item. Must not be blank.
    #[serde(default)]
    pub prompt: String,

    /// Job type to submit. Defaults to `generate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,

    /// Any further tool parameters (e.g. `aspect_ratio`, `number_of_images`).
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl BatchItem {
    /// A `generate` item with no extra parameters.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            job_type: None,
            params: Map::new(),
        }
    }

    /// Set the job type.
    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    /// Add a tool parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A declarative batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchConfig {
    /// Items to run, in report order
    pub items: Vec<BatchItem>,

    /// Directory for outputs of items that do not name their own `output_file`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,

    /// Deadline for the whole batch in milliseconds (default 600000)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,

    /// Parameters applied on top of every item's own parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Map<String, Value>>,
}

impl BatchConfig {
    /// A batch of `items` with default settings.
    pub fn new(items: Vec<BatchItem>) -> Self {
        Self {
            items,
            output_dir: None,
            max_wait_ms: None,
            overrides: None,
        }
    }

    /// Parse a batch from JSON.
    ///
    /// # Errors
    /// Returns `BatchError::InvalidConfig` for malformed JSON or an invalid batch.
    pub fn from_json_str(json: &str) -> Result<Self, BatchError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BatchError::invalid_config(format!("Malformed batch JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a batch file.
    ///
    /// # Errors
    /// Returns `BatchError::Io` if the file cannot be read and
    /// `BatchError::InvalidConfig` if its contents are not a valid batch.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BatchError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| BatchError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json_str(&contents)
    }

    /// Check the batch before anything is submitted.
    ///
    /// # Errors
    /// Returns `BatchError::InvalidConfig` if there are no items or an item has a
    /// blank prompt.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.items.is_empty() {
            return Err(BatchError::invalid_config("Batch must contain at least one item"));
        }
        if let Some(index) = self.items.iter().position(|item| item.prompt.trim().is_empty()) {
            return Err(BatchError::invalid_config(format!(
                "Item {} must have a non-empty prompt",
                index
            )));
        }
        Ok(())
    }

    /// Deadline for the whole batch.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.unwrap_or(DEFAULT_MAX_WAIT_MS))
    }

    /// Params submitted for item `index`.
    ///
    /// Item parameters, then overrides, then the item's prompt. An
    /// `output_file` under `output_dir` is added when the item has none.
    pub fn job_params(&self, index: usize, item: &BatchItem) -> Value {
        let mut params = item.params.clone();
        if let Some(overrides) = &self.overrides {
            params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        params.insert("prompt".to_string(), Value::String(item.prompt.clone()));

        if let Some(dir) = &self.output_dir {
            if !params.contains_key("output_file") {
                let file = Path::new(dir).join(format!("batch_{}.png", index));
                params.insert(
                    "output_file".to_string(),
                    Value::String(file.display().to_string()),
                );
            }
        }

        Value::Object(params)
    }
}

/// Outcome of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemStatus {
    /// The job completed
    Completed,
    /// The job failed, was never submitted, or vanished
    Failed,
    /// The job was still outstanding at the deadline and was cancelled
    Cancelled,
}

/// Report entry for one batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Position of the item in the batch
    pub index: usize,
    /// Job id, or `"N/A"` if submission was rejected
    pub job_id: String,
    /// The item's prompt
    pub prompt: String,
    /// Final outcome
    pub status: BatchItemStatus,
    /// Output locators of a completed job
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Why the item did not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds from job creation to completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl BatchItemResult {
    fn failed(index: usize, job_id: String, prompt: String, error: impl Into<String>) -> Self {
        Self {
            index,
            job_id,
            prompt,
            status: BatchItemStatus::Failed,
            outputs: Vec::new(),
            error: Some(error.into()),
            duration_ms: None,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Number of items
    pub total: usize,
    /// Items that completed
    pub succeeded: usize,
    /// Items that failed or were cancelled
    pub failed: usize,
    /// Per-item results, index-aligned with the input items
    pub results: Vec<BatchItemResult>,
    /// When the batch started
    pub started_at: DateTime<Utc>,
    /// When the batch finished
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration of the batch
    pub total_duration_ms: u64,
}

struct Slot {
    index: usize,
    prompt: String,
    job_id: Option<String>,
    result: Option<BatchItemResult>,
}

impl Slot {
    fn job_id(&self) -> String {
        self.job_id
            .clone()
            .unwrap_or_else(|| UNSUBMITTED_JOB_ID.to_string())
    }

    /// Record the job's state if it is terminal. Returns whether the slot is settled.
    fn observe(&mut self, job: Option<Job>) -> bool {
        let job_id = self.job_id();
        match job {
            None => {
                self.result = Some(BatchItemResult::failed(
                    self.index,
                    job_id,
                    self.prompt.clone(),
                    "Job not found",
                ));
            }
            Some(job) => match job.status {
                JobStatus::Completed => {
                    self.result = Some(BatchItemResult {
                        index: self.index,
                        job_id,
                        prompt: self.prompt.clone(),
                        status: BatchItemStatus::Completed,
                        outputs: job.result.as_ref().map(|r| r.outputs.clone()).unwrap_or_default(),
                        error: None,
                        duration_ms: job.duration_ms(),
                    });
                }
                JobStatus::Failed => {
                    let error = job
                        .error
                        .filter(|e| !e.trim().is_empty())
                        .unwrap_or_else(|| "Job failed".to_string());
                    self.result = Some(BatchItemResult::failed(
                        self.index,
                        job_id,
                        self.prompt.clone(),
                        error,
                    ));
                }
                JobStatus::Pending | JobStatus::Running => {}
            },
        }
        self.result.is_some()
    }
}

/// Runs batches against a [`JobQueue`].
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    queue: JobQueue,
    poll_interval: Duration,
}

impl BatchOrchestrator {
    /// Create an orchestrator polling every 2 seconds.
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Load a batch file and run it.
    pub async fn run_file(&self, path: impl AsRef<Path>) -> Result<BatchReport, BatchError> {
        let config = BatchConfig::from_file(path).await?;
        self.run(&config).await
    }

    /// Submit every item, wait for the jobs, and report.
    ///
    /// Jobs still outstanding at the deadline are cancelled and reported as
    /// `cancelled` with error "Timeout".
    ///
    /// # Errors
    /// Returns `BatchError::InvalidConfig` if the batch fails validation, in
    /// which case nothing is submitted.
    pub async fn run(&self, config: &BatchConfig) -> Result<BatchReport, BatchError> {
        config.validate()?;

        let started_at = now_millis();
        let start = Instant::now();
        let deadline = start + config.timeout();

        info!(
            items = config.items.len(),
            max_wait_ms = config.timeout().as_millis() as u64,
            "Starting batch"
        );

        let mut slots = Vec::with_capacity(config.items.len());
        for (index, item) in config.items.iter().enumerate() {
            let job_type = item.job_type.unwrap_or(JobType::Generate);
            let params = config.job_params(index, item);
            let mut slot = Slot {
                index,
                prompt: item.prompt.clone(),
                job_id: None,
                result: None,
            };

            match self.queue.create_job(job_type, params).await {
                Ok(id) => slot.job_id = Some(id),
                Err(e) => {
                    warn!(index, error = %e, "Batch item submission failed");
                    slot.result = Some(BatchItemResult::failed(
                        index,
                        UNSUBMITTED_JOB_ID.to_string(),
                        item.prompt.clone(),
                        e.to_string(),
                    ));
                }
            }
            slots.push(slot);
        }

        loop {
            self.poll(&mut slots).await;

            if slots.iter().all(|s| s.result.is_some()) {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                self.cancel_outstanding(&mut slots).await;
                break;
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }

        let results: Vec<BatchItemResult> = slots.into_iter().filter_map(|s| s.result).collect();
        let succeeded = results
            .iter()
            .filter(|r| r.status == BatchItemStatus::Completed)
            .count();
        let report = BatchReport {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            started_at,
            finished_at: now_millis(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.total_duration_ms,
            "Batch finished"
        );
        Ok(report)
    }

    async fn poll(&self, slots: &mut [Slot]) {
        for slot in slots.iter_mut().filter(|s| s.result.is_none()) {
            let Some(id) = slot.job_id.clone() else {
                continue;
            };
            match self.queue.get_job(&id).await {
                Ok(job) => {
                    if slot.observe(job) {
                        debug!(index = slot.index, job_id = %id, "Batch item settled");
                    }
                }
                Err(e) => warn!(index = slot.index, job_id = %id, error = %e, "Failed to poll batch job"),
            }
        }
    }

    async fn cancel_outstanding(&self, slots: &mut [Slot]) {
        for slot in slots.iter_mut().filter(|s| s.result.is_none()) {
            let job_id = slot.job_id();

            match self.queue.cancel_job(&job_id).await {
                Ok(outcome) => debug!(job_id = %job_id, ?outcome, "Cancelled timed out batch job"),
                Err(JobError::AlreadyTerminal { .. }) => {
                    // Finished between the last poll and the deadline.
                    if let Ok(job) = self.queue.get_job(&job_id).await {
                        if slot.observe(job) {
                            continue;
                        }
                    }
                }
                Err(e) => warn!(job_id = %job_id, error = %e, "Failed to cancel timed out batch job"),
            }

            slot.result = Some(BatchItemResult {
                index: slot.index,
                job_id,
                prompt: slot.prompt.clone(),
                status: BatchItemStatus::Cancelled,
                outputs: Vec::new(),
                error: Some("Timeout".to_string()),
                duration_ms: None,
            });
        }
    }
}
